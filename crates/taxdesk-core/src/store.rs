//! Collaborator contracts consumed by the filing engine.
//!
//! The engine only talks to durable state through these three traits. The
//! SQLite implementations live in [`crate::db`].

use crate::model::{
    Client, ClientId, Filing, FilingId, FilingStatus, FilingType, NewFiling, Priority,
    Professional, StatusChange, TaxYear, UserId,
};
use anyhow::bail;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Failures surfaced by store and directory implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("uniqueness violation: {0}")]
    Conflict(String),

    /// The store is busy, locked, timed out or otherwise unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Anything else.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Sort order for filing listings. Ties always break on filing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilingSort {
    /// Most recently created first.
    #[default]
    CreatedDesc,
    /// Oldest first.
    CreatedAsc,
    /// Most recently updated first.
    UpdatedDesc,
    /// Earliest due date first; filings without a due date last.
    DueAsc,
    /// urgent > high > medium > low, then newest first.
    Priority,
}

impl fmt::Display for FilingSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedDesc => f.write_str("created_desc"),
            Self::CreatedAsc => f.write_str("created_asc"),
            Self::UpdatedDesc => f.write_str("updated_desc"),
            Self::DueAsc => f.write_str("due_asc"),
            Self::Priority => f.write_str("priority"),
        }
    }
}

impl FromStr for FilingSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_desc" | "created-desc" | "newest" => Ok(Self::CreatedDesc),
            "created_asc" | "created-asc" | "oldest" => Ok(Self::CreatedAsc),
            "updated_desc" | "updated-desc" | "recent" => Ok(Self::UpdatedDesc),
            "due_asc" | "due-asc" | "due" => Ok(Self::DueAsc),
            "priority" => Ok(Self::Priority),
            other => bail!(
                "unknown sort order '{other}': expected one of created_desc, created_asc, updated_desc, due_asc, priority"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter criteria for filing listings.
///
/// All fields are optional and combined with AND semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilingFilter {
    pub client_id: Option<ClientId>,
    /// Filings assigned to this CA.
    pub ca_id: Option<UserId>,
    /// Any of these statuses; empty means every status.
    pub statuses: Vec<FilingStatus>,
    pub filing_type: Option<FilingType>,
    pub priority: Option<Priority>,
    pub tax_year: Option<TaxYear>,
    /// Case-insensitive substring match over notes and tax year.
    pub search: Option<String>,
    /// Inclusive lower bound on the due date.
    pub due_from: Option<NaiveDate>,
    /// Inclusive upper bound on the due date.
    pub due_to: Option<NaiveDate>,
    pub sort: FilingSort,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

/// Scope for status statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsScope {
    pub client_id: Option<ClientId>,
    pub ca_id: Option<UserId>,
    pub tax_year: Option<TaxYear>,
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// A partial update of a filing's mutable fields.
///
/// `None` leaves a field untouched. Nullable fields use a nested `Option`
/// where `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingPatch {
    pub status: Option<FilingStatus>,
    pub assigned_ca_id: Option<Option<UserId>>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub income: Option<serde_json::Value>,
    pub deductions: Option<serde_json::Value>,
    pub summary: Option<serde_json::Value>,
    /// Text appended to the notes on its own line.
    pub append_note: Option<String>,
    pub updated_at_us: i64,
    /// Precondition: apply only while the stored assignment equals this.
    pub expected_ca_id: Option<Option<UserId>>,
}

impl FilingPatch {
    /// Whether applying the patch would change anything besides the timestamp.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_ca_id.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.income.is_none()
            && self.deductions.is_none()
            && self.summary.is_none()
            && self.append_note.is_none()
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Durable filing storage keyed by filing id.
pub trait FilingStore {
    /// Look up one filing.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the lookup itself fails.
    fn get(&self, id: FilingId) -> Result<Option<Filing>, StoreError>;

    /// One page of filings matching `filter`, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the query fails.
    fn find(&self, filter: &FilingFilter) -> Result<(Vec<Filing>, u64), StoreError>;

    /// Insert a new filing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a filing already exists for the
    /// same client, tax year and filing type.
    fn create(&self, filing: &NewFiling) -> Result<Filing, StoreError>;

    /// Apply `patch` to the filing, only if its stored status still equals
    /// `expected_status` when one is given, and its stored assignment still
    /// equals `patch.expected_ca_id` when that is set. A status change also
    /// records a history row in the same write.
    ///
    /// Returns the number of updated rows (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the write fails.
    fn update_fields(
        &self,
        id: FilingId,
        patch: &FilingPatch,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError>;

    /// Delete the filing, only if its stored status equals `expected_status`
    /// when one is given. Returns the number of deleted rows (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the write fails.
    fn delete(
        &self,
        id: FilingId,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError>;

    /// Filing counts per status within `scope`. Statuses with no filings may
    /// be omitted.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the query fails.
    fn status_counts(&self, scope: &StatsScope) -> Result<Vec<(FilingStatus, u64)>, StoreError>;

    /// Recorded status changes of a filing, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the query fails.
    fn history(&self, id: FilingId) -> Result<Vec<StatusChange>, StoreError>;
}

/// Resolves client ids to client profiles.
pub trait ClientDirectory {
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the lookup fails.
    fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;
}

/// Resolves user ids to role and activity status.
pub trait ProfessionalDirectory {
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the lookup fails.
    fn get_professional(&self, id: UserId) -> Result<Option<Professional>, StoreError>;
}

impl<T: FilingStore + ?Sized> FilingStore for &T {
    fn get(&self, id: FilingId) -> Result<Option<Filing>, StoreError> {
        (**self).get(id)
    }

    fn find(&self, filter: &FilingFilter) -> Result<(Vec<Filing>, u64), StoreError> {
        (**self).find(filter)
    }

    fn create(&self, filing: &NewFiling) -> Result<Filing, StoreError> {
        (**self).create(filing)
    }

    fn update_fields(
        &self,
        id: FilingId,
        patch: &FilingPatch,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError> {
        (**self).update_fields(id, patch, expected_status)
    }

    fn delete(
        &self,
        id: FilingId,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError> {
        (**self).delete(id, expected_status)
    }

    fn status_counts(&self, scope: &StatsScope) -> Result<Vec<(FilingStatus, u64)>, StoreError> {
        (**self).status_counts(scope)
    }

    fn history(&self, id: FilingId) -> Result<Vec<StatusChange>, StoreError> {
        (**self).history(id)
    }
}

impl<T: ClientDirectory + ?Sized> ClientDirectory for &T {
    fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        (**self).get_client(id)
    }
}

impl<T: ProfessionalDirectory + ?Sized> ProfessionalDirectory for &T {
    fn get_professional(&self, id: UserId) -> Result<Option<Professional>, StoreError> {
        (**self).get_professional(id)
    }
}
