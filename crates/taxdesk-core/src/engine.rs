//! The filing lifecycle engine.
//!
//! Every operation is a short, bounded sequence of collaborator calls. The
//! engine holds no state of its own between calls: status and assignment
//! changes go through [`FilingStore::update_fields`], conditioned on the
//! status observed at read time where lost updates matter.

use crate::config::ProjectConfig;
use crate::db::now_us;
use crate::error::{Entity, FilingError};
use crate::lifecycle;
use crate::model::{
    Client, ClientId, Filing, FilingId, FilingStatus, FilingType, NewFiling, Priority, Role,
    StatusChange, TaxYear, UserId,
};
use crate::store::{
    ClientDirectory, FilingFilter, FilingPatch, FilingSort, FilingStore, ProfessionalDirectory,
    StatsScope, StoreError,
};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Tunables for [`FilingEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Re-read and re-validate once after a lost conditional update.
    pub retry_on_race: bool,
    pub default_limit: u32,
    pub max_limit: u32,
    pub deadline_window_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ProjectConfig::default())
    }
}

impl From<&ProjectConfig> for EngineConfig {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            retry_on_race: config.lifecycle.retry_on_race,
            default_limit: config.queries.default_limit,
            max_limit: config.queries.max_limit,
            deadline_window_days: config.queries.deadline_window_days,
        }
    }
}

/// Raw creation request. Required fields are optional here so that missing
/// input surfaces as a validation failure instead of a type error upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateFiling {
    pub client_id: Option<ClientId>,
    pub tax_year: Option<String>,
    pub filing_type: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Mutable non-lifecycle fields of a filing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingDetails {
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub clear_due_date: bool,
    pub income: Option<serde_json::Value>,
    pub deductions: Option<serde_json::Value>,
    pub summary: Option<serde_json::Value>,
}

/// Upcoming-deadline query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadlineQuery {
    /// Window length in days; the configured default when `None`.
    pub days: Option<u32>,
    pub ca_id: Option<UserId>,
    pub client_id: Option<ClientId>,
    pub limit: Option<u32>,
}

/// One page of a filing listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilingPage {
    pub filings: Vec<Filing>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Filing counts per status. Every status is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilingStats {
    pub total: u64,
    pub by_status: BTreeMap<FilingStatus, u64>,
}

/// Coordinates the filing store with the client and professional
/// directories.
#[derive(Debug)]
pub struct FilingEngine<S, C, P> {
    store: S,
    clients: C,
    professionals: P,
    config: EngineConfig,
}

fn validation(message: impl Into<String>) -> FilingError {
    FilingError::Validation(message.into())
}

fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

impl<S, C, P> FilingEngine<S, C, P>
where
    S: FilingStore,
    C: ClientDirectory,
    P: ProfessionalDirectory,
{
    pub const fn new(store: S, clients: C, professionals: P, config: EngineConfig) -> Self {
        Self {
            store,
            clients,
            professionals,
            config,
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a filing in `draft`.
    ///
    /// # Errors
    ///
    /// - [`FilingError::Validation`] for missing or malformed input
    /// - [`FilingError::NotFound`] when the client does not exist
    /// - [`FilingError::Conflict`] when the client already has a filing for
    ///   the same tax year and filing type
    pub fn create_filing(&self, request: CreateFiling) -> Result<Filing, FilingError> {
        let client_id = request
            .client_id
            .ok_or_else(|| validation("client id is required"))?;
        let tax_year: TaxYear = request
            .tax_year
            .as_deref()
            .ok_or_else(|| validation("tax year is required"))?
            .parse()
            .map_err(|err| validation(format!("{err}")))?;
        let filing_type: FilingType = request
            .filing_type
            .as_deref()
            .ok_or_else(|| validation("filing type is required"))?
            .parse()
            .map_err(|err| validation(format!("{err}")))?;
        let priority = match request.priority.as_deref() {
            Some(raw) => raw
                .parse::<Priority>()
                .map_err(|err| validation(format!("{err}")))?,
            None => Priority::default(),
        };

        let client = self
            .clients
            .get_client(client_id)?
            .ok_or(FilingError::not_found(Entity::Client, client_id))?;

        let duplicate_message = || {
            format!("client {client_id} already has a {filing_type} filing for {tax_year}")
        };

        let existing = FilingFilter {
            client_id: Some(client_id),
            tax_year: Some(tax_year),
            filing_type: Some(filing_type),
            limit: Some(1),
            ..FilingFilter::default()
        };
        if self.store.find(&existing)?.1 > 0 {
            return Err(FilingError::duplicate(duplicate_message()));
        }

        let new_filing = NewFiling {
            client_id,
            tax_year,
            filing_type,
            priority,
            assigned_ca_id: self.seed_default_ca(&client)?,
            due_date: request.due_date,
            notes: clean_text(request.notes.as_deref()),
            created_at_us: now_us(),
        };

        let filing = self.store.create(&new_filing).map_err(|err| match err {
            StoreError::Conflict(_) => FilingError::duplicate(duplicate_message()),
            other => FilingError::from(other),
        })?;

        info!(
            filing_id = filing.id,
            client_id,
            tax_year = %tax_year,
            filing_type = %filing_type,
            ca_id = ?filing.assigned_ca_id,
            "created filing"
        );
        Ok(filing)
    }

    fn seed_default_ca(&self, client: &Client) -> Result<Option<UserId>, FilingError> {
        let Some(ca_id) = client.default_ca_id else {
            return Ok(None);
        };

        match self.professionals.get_professional(ca_id)? {
            Some(user) if user.role == Role::Ca => Ok(Some(ca_id)),
            Some(user) => {
                warn!(
                    client_id = client.id,
                    ca_id,
                    role = %user.role,
                    "client default CA does not have the CA role; not seeding"
                );
                Ok(None)
            }
            None => {
                warn!(
                    client_id = client.id,
                    ca_id, "client default CA does not exist; not seeding"
                );
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status lifecycle
    // -----------------------------------------------------------------------

    /// Move a filing to `requested`, appending `note` when given.
    ///
    /// The write only lands if the stored status still equals the status the
    /// move was validated against. On a miss the filing is re-read and the
    /// move re-validated once before giving up.
    ///
    /// # Errors
    ///
    /// - [`FilingError::NotFound`] when the filing does not exist
    /// - [`FilingError::InvalidTransition`] when `requested` is not allowed
    ///   from the current status
    /// - [`FilingError::Conflict`] when concurrent writers keep winning
    pub fn transition(
        &self,
        filing_id: FilingId,
        requested: FilingStatus,
        note: Option<&str>,
    ) -> Result<Filing, FilingError> {
        let note = clean_text(note);
        let attempts = if self.config.retry_on_race { 2 } else { 1 };

        for attempt in 1..=attempts {
            let current = self.require_filing(filing_id)?;
            lifecycle::check_transition(current.status, requested)?;

            let patch = FilingPatch {
                status: Some(requested),
                append_note: note.clone(),
                updated_at_us: now_us(),
                ..FilingPatch::default()
            };
            if self
                .store
                .update_fields(filing_id, &patch, Some(current.status))?
                > 0
            {
                info!(
                    filing_id,
                    from = %current.status,
                    status = %requested,
                    "filing status changed"
                );
                return self.require_filing(filing_id);
            }

            warn!(
                filing_id,
                attempt,
                observed = %current.status,
                requested = %requested,
                "status changed underneath a transition"
            );
        }

        Err(FilingError::lost_race(format!(
            "filing {filing_id} was modified concurrently; transition to {requested} not applied"
        )))
    }

    /// [`Self::transition`] with the target status given as text.
    ///
    /// # Errors
    ///
    /// As [`Self::transition`]. An unrecognized status is an
    /// [`FilingError::InvalidTransition`].
    pub fn transition_named(
        &self,
        filing_id: FilingId,
        requested: &str,
        note: Option<&str>,
    ) -> Result<Filing, FilingError> {
        match requested.parse::<FilingStatus>() {
            Ok(status) => self.transition(filing_id, status, note),
            Err(err) => {
                self.require_filing(filing_id)?;
                Err(FilingError::InvalidTransition(err.to_string()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Assign `ca_id`, replacing any prior assignment.
    ///
    /// # Errors
    ///
    /// - [`FilingError::NotFound`] when the filing or user does not exist
    /// - [`FilingError::InvalidAssignee`] when the user is not an active CA
    pub fn assign_ca(&self, filing_id: FilingId, ca_id: UserId) -> Result<Filing, FilingError> {
        let filing = self.require_filing(filing_id)?;
        let user = self
            .professionals
            .get_professional(ca_id)?
            .ok_or(FilingError::not_found(Entity::User, ca_id))?;

        if let Some(reason) = user.assignment_refusal() {
            return Err(FilingError::InvalidAssignee {
                user_id: ca_id,
                reason,
            });
        }

        let patch = FilingPatch {
            assigned_ca_id: Some(Some(ca_id)),
            updated_at_us: now_us(),
            ..FilingPatch::default()
        };
        if self.store.update_fields(filing_id, &patch, None)? == 0 {
            return Err(FilingError::not_found(Entity::Filing, filing_id));
        }

        info!(
            filing_id,
            ca_id,
            previous_ca_id = ?filing.assigned_ca_id,
            "assigned CA"
        );
        self.require_filing(filing_id)
    }

    /// Clear the filing's CA assignment.
    ///
    /// # Errors
    ///
    /// - [`FilingError::NotFound`] when the filing does not exist
    /// - [`FilingError::NoAssignment`] when nothing is assigned, including
    ///   when a concurrent unassign got there first
    /// - [`FilingError::Conflict`] when the filing was reassigned meanwhile
    pub fn unassign_ca(&self, filing_id: FilingId) -> Result<Filing, FilingError> {
        let filing = self.require_filing(filing_id)?;
        let Some(previous) = filing.assigned_ca_id else {
            return Err(FilingError::NoAssignment(filing_id));
        };

        let patch = FilingPatch {
            assigned_ca_id: Some(None),
            updated_at_us: now_us(),
            expected_ca_id: Some(Some(previous)),
            ..FilingPatch::default()
        };
        if self.store.update_fields(filing_id, &patch, None)? == 0 {
            warn!(
                filing_id,
                previous_ca_id = previous,
                "assignment changed before unassign"
            );
            return match self.store.get(filing_id)? {
                None => Err(FilingError::not_found(Entity::Filing, filing_id)),
                Some(current) => match current.assigned_ca_id {
                    None => Err(FilingError::NoAssignment(filing_id)),
                    Some(ca_id) => Err(FilingError::lost_race(format!(
                        "filing {filing_id} was reassigned to {ca_id} concurrently; not unassigned"
                    ))),
                },
            };
        }

        info!(filing_id, previous_ca_id = previous, "unassigned CA");
        self.require_filing(filing_id)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Delete a draft filing.
    ///
    /// # Errors
    ///
    /// - [`FilingError::NotFound`] when the filing does not exist
    /// - [`FilingError::IllegalState`] when it is not in `draft`, checked
    ///   both before and at write time
    pub fn delete_filing(&self, filing_id: FilingId) -> Result<(), FilingError> {
        let filing = self.require_filing(filing_id)?;
        if !lifecycle::is_deletable(filing.status) {
            return Err(not_deletable(&filing));
        }

        if self
            .store
            .delete(filing_id, Some(lifecycle::INITIAL_STATUS))?
            == 0
        {
            warn!(filing_id, "filing changed before delete; re-resolving");
            return match self.store.get(filing_id)? {
                Some(filing) => Err(not_deletable(&filing)),
                None => Err(FilingError::not_found(Entity::Filing, filing_id)),
            };
        }

        info!(filing_id, "deleted filing");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Details and notes
    // -----------------------------------------------------------------------

    /// Update priority, due date and payloads. Status and assignment are
    /// never touched here.
    ///
    /// # Errors
    ///
    /// - [`FilingError::Validation`] when nothing would change
    /// - [`FilingError::NotFound`] when the filing does not exist
    pub fn update_details(
        &self,
        filing_id: FilingId,
        details: FilingDetails,
    ) -> Result<Filing, FilingError> {
        if details.clear_due_date && details.due_date.is_some() {
            return Err(validation("cannot set and clear the due date together"));
        }

        let due_date = if details.clear_due_date {
            Some(None)
        } else {
            details.due_date.map(Some)
        };
        let patch = FilingPatch {
            priority: details.priority,
            due_date,
            income: details.income,
            deductions: details.deductions,
            summary: details.summary,
            updated_at_us: now_us(),
            ..FilingPatch::default()
        };
        if patch.is_empty() {
            return Err(validation("no filing details to update"));
        }

        if self.store.update_fields(filing_id, &patch, None)? == 0 {
            return Err(FilingError::not_found(Entity::Filing, filing_id));
        }

        info!(filing_id, "updated filing details");
        self.require_filing(filing_id)
    }

    /// Append a note on its own line.
    ///
    /// # Errors
    ///
    /// - [`FilingError::Validation`] when the note is blank
    /// - [`FilingError::NotFound`] when the filing does not exist
    pub fn add_note(&self, filing_id: FilingId, note: &str) -> Result<Filing, FilingError> {
        let note = clean_text(Some(note)).ok_or_else(|| validation("note must not be blank"))?;
        let patch = FilingPatch {
            append_note: Some(note),
            updated_at_us: now_us(),
            ..FilingPatch::default()
        };
        if self.store.update_fields(filing_id, &patch, None)? == 0 {
            return Err(FilingError::not_found(Entity::Filing, filing_id));
        }

        info!(filing_id, "appended filing note");
        self.require_filing(filing_id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`FilingError::NotFound`] when the filing does not exist.
    pub fn get_filing(&self, filing_id: FilingId) -> Result<Filing, FilingError> {
        self.require_filing(filing_id)
    }

    /// Recorded status changes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FilingError::NotFound`] when the filing does not exist.
    pub fn status_history(&self, filing_id: FilingId) -> Result<Vec<StatusChange>, FilingError> {
        self.require_filing(filing_id)?;
        Ok(self.store.history(filing_id)?)
    }

    /// One page of filings matching `filter`, with the total match count.
    ///
    /// A missing limit uses the configured default; larger limits are capped
    /// at the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`FilingError::Validation`] for a zero limit or an inverted
    /// due-date range.
    pub fn list_filings(&self, filter: FilingFilter) -> Result<FilingPage, FilingError> {
        if let (Some(from), Some(to)) = (filter.due_from, filter.due_to)
            && from > to
        {
            return Err(validation(format!(
                "due date range is inverted: {from} is after {to}"
            )));
        }

        let limit = self.effective_limit(filter.limit)?;
        let offset = filter.offset.unwrap_or(0);
        let filter = FilingFilter {
            limit: Some(limit),
            offset: Some(offset),
            ..filter
        };

        let (filings, total) = self.store.find(&filter)?;
        debug!(
            returned = filings.len(),
            total,
            limit,
            offset,
            "listed filings"
        );
        Ok(FilingPage {
            filings,
            total,
            limit,
            offset,
        })
    }

    /// Filing counts per status within `scope`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn statistics(&self, scope: StatsScope) -> Result<FilingStats, FilingError> {
        let mut by_status: BTreeMap<FilingStatus, u64> =
            FilingStatus::ALL.iter().map(|&status| (status, 0)).collect();
        for (status, count) in self.store.status_counts(&scope)? {
            *by_status.entry(status).or_insert(0) += count;
        }
        let total: u64 = by_status.values().sum();

        debug!(total, "computed filing statistics");
        Ok(FilingStats { total, by_status })
    }

    /// Non-completed filings due between today and `days` from today,
    /// earliest first.
    ///
    /// # Errors
    ///
    /// See [`Self::upcoming_deadlines_at`].
    pub fn upcoming_deadlines(&self, query: DeadlineQuery) -> Result<FilingPage, FilingError> {
        self.upcoming_deadlines_at(query, chrono::Local::now().date_naive())
    }

    /// [`Self::upcoming_deadlines`] relative to an explicit `today`.
    ///
    /// # Errors
    ///
    /// Returns [`FilingError::Validation`] for a zero limit or a window that
    /// overflows the calendar.
    pub fn upcoming_deadlines_at(
        &self,
        query: DeadlineQuery,
        today: NaiveDate,
    ) -> Result<FilingPage, FilingError> {
        let days = query.days.unwrap_or(self.config.deadline_window_days);
        let until = today
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| validation(format!("deadline window of {days} days is too large")))?;

        let open_statuses = FilingStatus::ALL
            .into_iter()
            .filter(|status| *status != FilingStatus::Completed)
            .collect();
        let filter = FilingFilter {
            client_id: query.client_id,
            ca_id: query.ca_id,
            statuses: open_statuses,
            due_from: Some(today),
            due_to: Some(until),
            sort: FilingSort::DueAsc,
            limit: query.limit,
            ..FilingFilter::default()
        };
        self.list_filings(filter)
    }

    fn effective_limit(&self, requested: Option<u32>) -> Result<u32, FilingError> {
        match requested {
            Some(0) => Err(validation("limit must be at least 1")),
            Some(limit) => Ok(limit.min(self.config.max_limit)),
            None => Ok(self.config.default_limit.min(self.config.max_limit)),
        }
    }

    fn require_filing(&self, filing_id: FilingId) -> Result<Filing, FilingError> {
        self.store
            .get(filing_id)?
            .ok_or(FilingError::not_found(Entity::Filing, filing_id))
    }
}

fn not_deletable(filing: &Filing) -> FilingError {
    FilingError::IllegalState {
        filing_id: filing.id,
        status: filing.status,
        message: "only draft filings can be deleted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::Professional;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open store");
        for (id, role, is_active) in [
            (9, Role::Ca, true),
            (11, Role::Ca, true),
            (12, Role::Ca, false),
            (20, Role::Customer, true),
            (30, Role::Admin, true),
        ] {
            store
                .upsert_professional(
                    &Professional {
                        id,
                        name: format!("user {id}"),
                        role,
                        is_active,
                    },
                    0,
                )
                .expect("seed user");
        }
        for (id, default_ca_id) in [(5, None), (6, Some(9)), (7, Some(30)), (8, Some(12))] {
            store
                .upsert_client(
                    &Client {
                        id,
                        name: format!("client {id}"),
                        default_ca_id,
                    },
                    0,
                )
                .expect("seed client");
        }
        store
    }

    fn engine(store: &SqliteStore) -> FilingEngine<&SqliteStore, &SqliteStore, &SqliteStore> {
        FilingEngine::new(store, store, store, EngineConfig::default())
    }

    fn request(client_id: ClientId, tax_year: &str, filing_type: &str) -> CreateFiling {
        CreateFiling {
            client_id: Some(client_id),
            tax_year: Some(tax_year.to_string()),
            filing_type: Some(filing_type.to_string()),
            ..CreateFiling::default()
        }
    }

    fn draft(store: &SqliteStore) -> Filing {
        engine(store)
            .create_filing(request(5, "2023-2024", "individual"))
            .expect("create")
    }

    #[test]
    fn create_starts_in_draft_with_medium_priority() {
        let store = seeded_store();
        let filing = draft(&store);
        assert_eq!(filing.status, FilingStatus::Draft);
        assert_eq!(filing.priority, Priority::Medium);
        assert_eq!(filing.assigned_ca_id, None);
    }

    #[test]
    fn create_validates_required_fields() {
        let store = seeded_store();
        let engine = engine(&store);

        for bad in [
            CreateFiling {
                client_id: None,
                ..request(5, "2023-2024", "individual")
            },
            CreateFiling {
                tax_year: None,
                ..request(5, "2023-2024", "individual")
            },
            CreateFiling {
                filing_type: None,
                ..request(5, "2023-2024", "individual")
            },
            request(5, "2023-2025", "individual"),
            request(5, "2023", "individual"),
            request(5, "2023-2024", "payroll"),
            CreateFiling {
                priority: Some("critical".into()),
                ..request(5, "2023-2024", "individual")
            },
        ] {
            let err = engine.create_filing(bad.clone()).expect_err("must fail");
            assert!(
                matches!(err, FilingError::Validation(_)),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn create_unknown_client_is_not_found() {
        let store = seeded_store();
        let err = engine(&store)
            .create_filing(request(404, "2023-2024", "individual"))
            .expect_err("unknown client");
        assert!(matches!(
            err,
            FilingError::NotFound {
                entity: Entity::Client,
                id: 404
            }
        ));
    }

    #[test]
    fn create_duplicate_is_conflict() {
        let store = seeded_store();
        draft(&store);
        let err = engine(&store)
            .create_filing(request(5, "2023-2024", "individual"))
            .expect_err("duplicate");
        assert!(matches!(
            err,
            FilingError::Conflict {
                duplicate: true,
                ..
            }
        ));
    }

    #[test]
    fn create_seeds_default_ca_only_for_ca_role() {
        let store = seeded_store();
        let engine = engine(&store);

        let seeded = engine
            .create_filing(request(6, "2023-2024", "individual"))
            .expect("create");
        assert_eq!(seeded.assigned_ca_id, Some(9));

        let admin_default = engine
            .create_filing(request(7, "2023-2024", "individual"))
            .expect("create");
        assert_eq!(admin_default.assigned_ca_id, None);

        let inactive_default = engine
            .create_filing(request(8, "2023-2024", "individual"))
            .expect("create");
        assert_eq!(inactive_default.assigned_ca_id, Some(12));
    }

    #[test]
    fn create_keeps_priority_due_date_and_trimmed_notes() {
        let store = seeded_store();
        let filing = engine(&store)
            .create_filing(CreateFiling {
                priority: Some("urgent".into()),
                due_date: NaiveDate::from_ymd_opt(2024, 7, 31),
                notes: Some("  awaiting Form-16  ".into()),
                ..request(5, "2023-2024", "capital-gains")
            })
            .expect("create");
        assert_eq!(filing.priority, Priority::Urgent);
        assert_eq!(filing.filing_type, FilingType::CapitalGains);
        assert_eq!(filing.notes.as_deref(), Some("awaiting Form-16"));
    }

    #[test]
    fn transition_follows_table_and_records_history() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        let moved = engine
            .transition(filing.id, FilingStatus::InProgress, Some("picked up"))
            .expect("draft -> in_progress");
        assert_eq!(moved.status, FilingStatus::InProgress);
        assert_eq!(moved.notes.as_deref(), Some("picked up"));

        let err = engine
            .transition(filing.id, FilingStatus::Completed, None)
            .expect_err("skip review");
        assert!(matches!(err, FilingError::InvalidTransition(_)));

        let history = engine.status_history(filing.id).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_status, FilingStatus::InProgress);
    }

    #[test]
    fn completed_is_terminal() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);
        for status in [
            FilingStatus::InProgress,
            FilingStatus::UnderReview,
            FilingStatus::Completed,
        ] {
            engine.transition(filing.id, status, None).expect("walk");
        }

        for status in FilingStatus::ALL {
            let err = engine
                .transition(filing.id, status, None)
                .expect_err("terminal");
            assert!(matches!(err, FilingError::InvalidTransition(_)));
        }
    }

    #[test]
    fn transition_named_rejects_unknown_status() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        let err = engine
            .transition_named(filing.id, "archived", None)
            .expect_err("unknown");
        assert!(matches!(err, FilingError::InvalidTransition(_)));

        let err = engine
            .transition_named(404, "archived", None)
            .expect_err("missing filing");
        assert!(matches!(err, FilingError::NotFound { .. }));

        let moved = engine
            .transition_named(filing.id, "in-progress", None)
            .expect("alias");
        assert_eq!(moved.status, FilingStatus::InProgress);
    }

    /// Store wrapper that lets a competing writer move the filing to the
    /// next queued status right before each conditional update.
    struct RacingStore<'a> {
        inner: &'a SqliteStore,
        competing: RefCell<VecDeque<FilingStatus>>,
    }

    impl FilingStore for RacingStore<'_> {
        fn get(&self, id: FilingId) -> Result<Option<Filing>, StoreError> {
            self.inner.get(id)
        }

        fn find(&self, filter: &FilingFilter) -> Result<(Vec<Filing>, u64), StoreError> {
            self.inner.find(filter)
        }

        fn create(&self, filing: &NewFiling) -> Result<Filing, StoreError> {
            self.inner.create(filing)
        }

        fn update_fields(
            &self,
            id: FilingId,
            patch: &FilingPatch,
            expected_status: Option<FilingStatus>,
        ) -> Result<usize, StoreError> {
            let next = if expected_status.is_some() {
                self.competing.borrow_mut().pop_front()
            } else {
                None
            };
            if let Some(status) = next {
                let competing = FilingPatch {
                    status: Some(status),
                    updated_at_us: patch.updated_at_us,
                    ..FilingPatch::default()
                };
                self.inner.update_fields(id, &competing, None)?;
            }
            self.inner.update_fields(id, patch, expected_status)
        }

        fn delete(
            &self,
            id: FilingId,
            expected_status: Option<FilingStatus>,
        ) -> Result<usize, StoreError> {
            self.inner.delete(id, expected_status)
        }

        fn status_counts(
            &self,
            scope: &StatsScope,
        ) -> Result<Vec<(FilingStatus, u64)>, StoreError> {
            self.inner.status_counts(scope)
        }

        fn history(&self, id: FilingId) -> Result<Vec<StatusChange>, StoreError> {
            self.inner.history(id)
        }
    }

    fn racing_engine<'a>(
        store: &'a SqliteStore,
        competing: &[FilingStatus],
        retry_on_race: bool,
    ) -> FilingEngine<RacingStore<'a>, &'a SqliteStore, &'a SqliteStore> {
        FilingEngine::new(
            RacingStore {
                inner: store,
                competing: RefCell::new(competing.iter().copied().collect()),
            },
            store,
            store,
            EngineConfig {
                retry_on_race,
                ..EngineConfig::default()
            },
        )
    }

    #[test]
    fn lost_race_is_retried_against_fresh_status() {
        let store = seeded_store();
        let filing = draft(&store);

        let engine = racing_engine(&store, &[FilingStatus::Rejected], true);
        let moved = engine
            .transition(filing.id, FilingStatus::InProgress, None)
            .expect("rejected -> in_progress is allowed on retry");
        assert_eq!(moved.status, FilingStatus::InProgress);

        let walk: Vec<_> = store
            .history(filing.id)
            .expect("history")
            .into_iter()
            .map(|change| (change.from_status, change.to_status))
            .collect();
        assert_eq!(
            walk,
            vec![
                (FilingStatus::Draft, FilingStatus::Rejected),
                (FilingStatus::Rejected, FilingStatus::InProgress),
            ]
        );
    }

    #[test]
    fn retry_revalidates_and_refuses_stale_move() {
        let store = seeded_store();
        let filing = draft(&store);
        engine(&store)
            .transition(filing.id, FilingStatus::InProgress, None)
            .expect("start");

        let engine = racing_engine(&store, &[FilingStatus::UnderReview], true);
        let err = engine
            .transition(filing.id, FilingStatus::UnderReview, None)
            .expect_err("already under review after re-read");
        assert!(matches!(err, FilingError::InvalidTransition(_)));
    }

    #[test]
    fn second_lost_race_is_conflict() {
        let store = seeded_store();
        let filing = draft(&store);

        let engine = racing_engine(&store, &[FilingStatus::Rejected, FilingStatus::Draft], true);
        let err = engine
            .transition(filing.id, FilingStatus::InProgress, None)
            .expect_err("lost twice");
        assert!(matches!(
            err,
            FilingError::Conflict {
                duplicate: false,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn disabled_retry_fails_on_first_miss() {
        let store = seeded_store();
        let filing = draft(&store);

        let engine = racing_engine(&store, &[FilingStatus::Rejected], false);
        let err = engine
            .transition(filing.id, FilingStatus::InProgress, None)
            .expect_err("no retry");
        assert!(matches!(err, FilingError::Conflict { .. }));
    }

    #[test]
    fn assignment_rules() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        let assigned = engine.assign_ca(filing.id, 9).expect("assign");
        assert_eq!(assigned.assigned_ca_id, Some(9));

        let reassigned = engine.assign_ca(filing.id, 11).expect("reassign");
        assert_eq!(reassigned.assigned_ca_id, Some(11));

        for (user_id, reason) in [(12, "inactive"), (20, "customer"), (30, "admin")] {
            let err = engine.assign_ca(filing.id, user_id).expect_err(reason);
            assert!(
                matches!(err, FilingError::InvalidAssignee { .. }),
                "{reason}: {err:?}"
            );
        }
        assert_eq!(
            engine.get_filing(filing.id).expect("get").assigned_ca_id,
            Some(11)
        );

        let err = engine.assign_ca(filing.id, 404).expect_err("unknown user");
        assert!(matches!(
            err,
            FilingError::NotFound {
                entity: Entity::User,
                ..
            }
        ));
        let err = engine.assign_ca(404, 9).expect_err("unknown filing");
        assert!(matches!(
            err,
            FilingError::NotFound {
                entity: Entity::Filing,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_allowed_in_any_status() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);
        for status in [
            FilingStatus::InProgress,
            FilingStatus::UnderReview,
            FilingStatus::Completed,
        ] {
            engine.transition(filing.id, status, None).expect("walk");
        }
        let assigned = engine.assign_ca(filing.id, 9).expect("assign completed");
        assert_eq!(assigned.assigned_ca_id, Some(9));
    }

    #[test]
    fn unassign_requires_an_assignment() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        let err = engine.unassign_ca(filing.id).expect_err("nothing assigned");
        assert!(matches!(err, FilingError::NoAssignment(id) if id == filing.id));

        engine.assign_ca(filing.id, 9).expect("assign");
        let cleared = engine.unassign_ca(filing.id).expect("unassign");
        assert_eq!(cleared.assigned_ca_id, None);
    }

    #[test]
    fn delete_only_in_draft() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);
        let other = engine
            .create_filing(request(5, "2023-2024", "business"))
            .expect("create");

        engine
            .transition(other.id, FilingStatus::InProgress, None)
            .expect("start");
        let err = engine.delete_filing(other.id).expect_err("not draft");
        assert!(matches!(
            err,
            FilingError::IllegalState {
                status: FilingStatus::InProgress,
                ..
            }
        ));

        engine.delete_filing(filing.id).expect("delete draft");
        let err = engine.delete_filing(filing.id).expect_err("gone");
        assert!(matches!(err, FilingError::NotFound { .. }));
    }

    #[test]
    fn rejected_filing_is_not_deletable_but_draft_again_is() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        engine
            .transition(filing.id, FilingStatus::Rejected, Some("missing PAN"))
            .expect("reject");
        assert!(engine.delete_filing(filing.id).is_err());

        engine
            .transition(filing.id, FilingStatus::Draft, None)
            .expect("reopen");
        engine.delete_filing(filing.id).expect("delete");
    }

    #[test]
    fn details_update_leaves_status_and_assignment() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);
        engine.assign_ca(filing.id, 9).expect("assign");

        let updated = engine
            .update_details(
                filing.id,
                FilingDetails {
                    priority: Some(Priority::High),
                    due_date: NaiveDate::from_ymd_opt(2024, 7, 31),
                    income: Some(serde_json::json!({"salary": 900_000})),
                    ..FilingDetails::default()
                },
            )
            .expect("update");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.status, FilingStatus::Draft);
        assert_eq!(updated.assigned_ca_id, Some(9));

        let cleared = engine
            .update_details(
                filing.id,
                FilingDetails {
                    clear_due_date: true,
                    ..FilingDetails::default()
                },
            )
            .expect("clear");
        assert_eq!(cleared.due_date, None);

        let err = engine
            .update_details(filing.id, FilingDetails::default())
            .expect_err("nothing to do");
        assert!(matches!(err, FilingError::Validation(_)));

        let err = engine
            .update_details(
                404,
                FilingDetails {
                    priority: Some(Priority::Low),
                    ..FilingDetails::default()
                },
            )
            .expect_err("missing");
        assert!(matches!(err, FilingError::NotFound { .. }));
    }

    #[test]
    fn notes_append_and_reject_blank() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);

        engine.add_note(filing.id, "called client").expect("note");
        let noted = engine.add_note(filing.id, "docs in").expect("note");
        assert_eq!(noted.notes.as_deref(), Some("called client\ndocs in"));

        assert!(matches!(
            engine.add_note(filing.id, "   "),
            Err(FilingError::Validation(_))
        ));
        assert!(matches!(
            engine.add_note(404, "hello"),
            Err(FilingError::NotFound { .. })
        ));
    }

    #[test]
    fn listing_clamps_limits() {
        let store = seeded_store();
        let engine = FilingEngine::new(
            &store,
            &store,
            &store,
            EngineConfig {
                default_limit: 2,
                max_limit: 3,
                ..EngineConfig::default()
            },
        );
        for year in ["2019-2020", "2020-2021", "2021-2022", "2022-2023"] {
            engine
                .create_filing(request(5, year, "individual"))
                .expect("create");
        }

        let page = engine.list_filings(FilingFilter::default()).expect("list");
        assert_eq!((page.filings.len(), page.total, page.limit), (2, 4, 2));

        let page = engine
            .list_filings(FilingFilter {
                limit: Some(50),
                ..FilingFilter::default()
            })
            .expect("list");
        assert_eq!((page.filings.len(), page.limit), (3, 3));

        let err = engine
            .list_filings(FilingFilter {
                limit: Some(0),
                ..FilingFilter::default()
            })
            .expect_err("zero limit");
        assert!(matches!(err, FilingError::Validation(_)));
    }

    #[test]
    fn statistics_are_zero_filled() {
        let store = seeded_store();
        let engine = engine(&store);
        let filing = draft(&store);
        engine
            .create_filing(request(6, "2023-2024", "business"))
            .expect("create");
        engine
            .transition(filing.id, FilingStatus::InProgress, None)
            .expect("start");

        let stats = engine.statistics(StatsScope::default()).expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.len(), FilingStatus::ALL.len());
        assert_eq!(stats.by_status[&FilingStatus::Draft], 1);
        assert_eq!(stats.by_status[&FilingStatus::InProgress], 1);
        assert_eq!(stats.by_status[&FilingStatus::Completed], 0);

        let scoped = engine
            .statistics(StatsScope {
                ca_id: Some(9),
                ..StatsScope::default()
            })
            .expect("stats");
        assert_eq!(scoped.total, 1);
    }

    #[test]
    fn deadlines_window_excludes_completed_and_past() {
        let store = seeded_store();
        let engine = engine(&store);
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).expect("date");

        let mut ids = Vec::new();
        for (year, due) in [
            ("2019-2020", "2024-06-30"),
            ("2020-2021", "2024-07-01"),
            ("2021-2022", "2024-07-31"),
            ("2022-2023", "2024-08-01"),
            ("2023-2024", "2024-07-15"),
        ] {
            let filing = engine
                .create_filing(CreateFiling {
                    due_date: Some(due.parse().expect("date")),
                    ..request(5, year, "individual")
                })
                .expect("create");
            ids.push(filing.id);
        }
        for status in [
            FilingStatus::InProgress,
            FilingStatus::UnderReview,
            FilingStatus::Completed,
        ] {
            engine.transition(ids[4], status, None).expect("walk");
        }

        let page = engine
            .upcoming_deadlines_at(DeadlineQuery::default(), today)
            .expect("deadlines");
        let due: Vec<_> = page.filings.iter().map(|f| f.id).collect();
        assert_eq!(due, vec![ids[1], ids[2]]);

        let wide = engine
            .upcoming_deadlines_at(
                DeadlineQuery {
                    days: Some(31),
                    ..DeadlineQuery::default()
                },
                today,
            )
            .expect("deadlines");
        assert_eq!(wide.total, 3);

        let scoped = engine
            .upcoming_deadlines_at(
                DeadlineQuery {
                    client_id: Some(6),
                    ..DeadlineQuery::default()
                },
                today,
            )
            .expect("deadlines");
        assert_eq!(scoped.total, 0);
    }
}
