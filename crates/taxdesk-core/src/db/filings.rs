//! [`FilingStore`] over the `filings` and `filing_status_history` tables.

use super::{SqliteStore, map_sqlite_error};
use crate::model::{Filing, FilingId, FilingStatus, NewFiling, StatusChange, UserId};
use crate::store::{FilingFilter, FilingPatch, FilingSort, FilingStore, StatsScope, StoreError};
use anyhow::anyhow;
use chrono::NaiveDate;
use rusqlite::types::{ToSql, Type};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params,
    params_from_iter,
};
use std::error::Error as StdError;
use std::str::FromStr;

const FILING_COLUMNS: &str = "f.filing_id, f.client_id, f.tax_year, f.filing_type, f.status, \
     f.priority, f.assigned_ca_id, f.due_date, f.income_json, f.deductions_json, \
     f.summary_json, f.notes, f.created_at_us, f.updated_at_us";

const DATE_FORMAT: &str = "%Y-%m-%d";

impl FilingSort {
    const fn sql_clause(self) -> &'static str {
        match self {
            Self::CreatedDesc => "ORDER BY f.created_at_us DESC, f.filing_id DESC",
            Self::CreatedAsc => "ORDER BY f.created_at_us ASC, f.filing_id ASC",
            Self::UpdatedDesc => "ORDER BY f.updated_at_us DESC, f.filing_id DESC",
            Self::DueAsc => "ORDER BY f.due_date IS NULL, f.due_date ASC, f.filing_id ASC",
            Self::Priority => {
                "ORDER BY CASE f.priority \
                 WHEN 'urgent' THEN 0 \
                 WHEN 'high' THEN 1 \
                 WHEN 'medium' THEN 2 \
                 WHEN 'low' THEN 3 \
                 END ASC, f.created_at_us DESC, f.filing_id DESC"
            }
        }
    }
}

/// SQL `WHERE` clause and positional parameters for a filter.
struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    fn params_ref(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(AsRef::as_ref).collect()
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn build_where(filter: &FilingFilter) -> WhereClause {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(client_id) = filter.client_id {
        params.push(Box::new(client_id));
        conditions.push(format!("f.client_id = ?{}", params.len()));
    }

    if let Some(ca_id) = filter.ca_id {
        params.push(Box::new(ca_id));
        conditions.push(format!("f.assigned_ca_id = ?{}", params.len()));
    }

    if !filter.statuses.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.statuses.len());
        for status in &filter.statuses {
            params.push(Box::new(status.as_str()));
            placeholders.push(format!("?{}", params.len()));
        }
        conditions.push(format!("f.status IN ({})", placeholders.join(", ")));
    }

    if let Some(filing_type) = filter.filing_type {
        params.push(Box::new(filing_type.as_str()));
        conditions.push(format!("f.filing_type = ?{}", params.len()));
    }

    if let Some(priority) = filter.priority {
        params.push(Box::new(priority.as_str()));
        conditions.push(format!("f.priority = ?{}", params.len()));
    }

    if let Some(tax_year) = filter.tax_year {
        params.push(Box::new(tax_year.to_string()));
        conditions.push(format!("f.tax_year = ?{}", params.len()));
    }

    if let Some(search) = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        params.push(Box::new(format!(
            "%{}%",
            escape_like(&search.to_lowercase())
        )));
        let n = params.len();
        conditions.push(format!(
            "(lower(COALESCE(f.notes, '')) LIKE ?{n} ESCAPE '\\' OR f.tax_year LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if let Some(from) = filter.due_from {
        params.push(Box::new(from.format(DATE_FORMAT).to_string()));
        conditions.push(format!("f.due_date >= ?{}", params.len()));
    }

    if let Some(to) = filter.due_to {
        params.push(Box::new(to.format(DATE_FORMAT).to_string()));
        conditions.push(format!("f.due_date <= ?{}", params.len()));
    }

    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    WhereClause { sql, params }
}

fn limit_clause(limit: Option<u32>, offset: Option<u32>) -> String {
    match (limit, offset) {
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        (None, None) => String::new(),
    }
}

fn conversion_error(
    idx: usize,
    err: impl StdError + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|err| conversion_error(idx, err))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| serde_json::from_str(&text).map_err(|err| conversion_error(idx, err)))
        .transpose()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|err| conversion_error(idx, err))
    })
    .transpose()
}

fn row_to_filing(row: &Row<'_>) -> rusqlite::Result<Filing> {
    Ok(Filing {
        id: row.get(0)?,
        client_id: row.get(1)?,
        tax_year: parse_column(row, 2)?,
        filing_type: parse_column(row, 3)?,
        status: parse_column(row, 4)?,
        priority: parse_column(row, 5)?,
        assigned_ca_id: row.get(6)?,
        due_date: date_column(row, 7)?,
        income: json_column(row, 8)?,
        deductions: json_column(row, 9)?,
        summary: json_column(row, 10)?,
        notes: row.get(11)?,
        created_at_us: row.get(12)?,
        updated_at_us: row.get(13)?,
    })
}

fn to_json_text(value: &serde_json::Value) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Internal(anyhow!(err).context("serialize filing payload")))
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

fn get_filing(conn: &Connection, id: FilingId) -> rusqlite::Result<Option<Filing>> {
    let sql = format!("SELECT {FILING_COLUMNS} FROM filings f WHERE f.filing_id = ?1");
    conn.query_row(&sql, params![id], row_to_filing).optional()
}

fn apply_patch(
    tx: &Transaction<'_>,
    id: FilingId,
    patch: &FilingPatch,
    expected_status: Option<FilingStatus>,
) -> Result<usize, StoreError> {
    let stored: Option<(String, Option<UserId>)> = tx
        .query_row(
            "SELECT status, assigned_ca_id FROM filings WHERE filing_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| map_sqlite_error(err, "read filing status"))?;

    let Some((current, current_ca)) = stored else {
        return Ok(0);
    };
    let current = FilingStatus::from_str(&current)
        .map_err(|err| StoreError::Internal(anyhow!(err).context("stored status")))?;
    if expected_status.is_some_and(|expected| expected != current) {
        return Ok(0);
    }
    if patch
        .expected_ca_id
        .is_some_and(|expected| expected != current_ca)
    {
        return Ok(0);
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = patch.status {
        values.push(Box::new(status.as_str()));
        sets.push(format!("status = ?{}", values.len()));
    }
    if let Some(ca) = patch.assigned_ca_id {
        values.push(Box::new(ca));
        sets.push(format!("assigned_ca_id = ?{}", values.len()));
    }
    if let Some(priority) = patch.priority {
        values.push(Box::new(priority.as_str()));
        sets.push(format!("priority = ?{}", values.len()));
    }
    if let Some(due) = patch.due_date {
        values.push(Box::new(
            due.map(|date| date.format(DATE_FORMAT).to_string()),
        ));
        sets.push(format!("due_date = ?{}", values.len()));
    }
    for (column, payload) in [
        ("income_json", &patch.income),
        ("deductions_json", &patch.deductions),
        ("summary_json", &patch.summary),
    ] {
        if let Some(value) = payload {
            values.push(Box::new(to_json_text(value)?));
            sets.push(format!("{column} = ?{}", values.len()));
        }
    }
    if let Some(note) = &patch.append_note {
        values.push(Box::new(note.clone()));
        let n = values.len();
        sets.push(format!(
            "notes = CASE WHEN notes IS NULL OR notes = '' THEN ?{n} \
             ELSE notes || char(10) || ?{n} END"
        ));
    }
    values.push(Box::new(patch.updated_at_us));
    sets.push(format!("updated_at_us = ?{}", values.len()));

    values.push(Box::new(id));
    let id_param = values.len();
    values.push(Box::new(current.as_str()));
    let status_param = values.len();

    values.push(Box::new(current_ca));
    let ca_param = values.len();

    let sql = format!(
        "UPDATE filings SET {} \
         WHERE filing_id = ?{id_param} AND status = ?{status_param} \
         AND assigned_ca_id IS ?{ca_param}",
        sets.join(", ")
    );
    let params_ref: Vec<&dyn ToSql> = values.iter().map(AsRef::as_ref).collect();
    let updated = tx
        .execute(&sql, params_from_iter(params_ref))
        .map_err(|err| map_sqlite_error(err, "update filing"))?;

    if updated > 0
        && let Some(status) = patch.status
    {
        tx.execute(
            "INSERT INTO filing_status_history (filing_id, from_status, to_status, note, changed_at_us) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                current.as_str(),
                status.as_str(),
                patch.append_note,
                patch.updated_at_us
            ],
        )
        .map_err(|err| map_sqlite_error(err, "record status change"))?;
    }

    Ok(updated)
}

impl FilingStore for SqliteStore {
    fn get(&self, id: FilingId) -> Result<Option<Filing>, StoreError> {
        get_filing(&self.conn, id).map_err(|err| map_sqlite_error(err, "get filing"))
    }

    fn find(&self, filter: &FilingFilter) -> Result<(Vec<Filing>, u64), StoreError> {
        let clause = build_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM filings f{}", clause.sql);
        let total: i64 = self
            .conn
            .query_row(&count_sql, params_from_iter(clause.params_ref()), |row| {
                row.get(0)
            })
            .map_err(|err| map_sqlite_error(err, "count filings"))?;

        let sql = format!(
            "SELECT {FILING_COLUMNS} FROM filings f{} {}{}",
            clause.sql,
            filter.sort.sql_clause(),
            limit_clause(filter.limit, filter.offset)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| map_sqlite_error(err, "prepare filing listing"))?;
        let rows = stmt
            .query_map(params_from_iter(clause.params_ref()), row_to_filing)
            .map_err(|err| map_sqlite_error(err, "list filings"))?;

        let mut filings = Vec::new();
        for row in rows {
            filings.push(row.map_err(|err| map_sqlite_error(err, "read filing row"))?);
        }

        tracing::debug!(
            returned = filings.len(),
            total,
            sort = %filter.sort,
            "listed filings"
        );
        Ok((filings, count_to_u64(total)))
    }

    fn create(&self, filing: &NewFiling) -> Result<Filing, StoreError> {
        self.conn
            .execute(
                "INSERT INTO filings (client_id, tax_year, filing_type, status, priority, \
                 assigned_ca_id, due_date, notes, created_at_us, updated_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    filing.client_id,
                    filing.tax_year.to_string(),
                    filing.filing_type.as_str(),
                    crate::lifecycle::INITIAL_STATUS.as_str(),
                    filing.priority.as_str(),
                    filing.assigned_ca_id,
                    filing
                        .due_date
                        .map(|date| date.format(DATE_FORMAT).to_string()),
                    filing.notes,
                    filing.created_at_us,
                ],
            )
            .map_err(|err| map_sqlite_error(err, "insert filing"))?;

        let id = self.conn.last_insert_rowid();
        get_filing(&self.conn, id)
            .map_err(|err| map_sqlite_error(err, "read created filing"))?
            .ok_or_else(|| StoreError::Internal(anyhow!("filing {id} vanished after insert")))
    }

    fn update_fields(
        &self,
        id: FilingId,
        patch: &FilingPatch,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(|err| map_sqlite_error(err, "begin filing update"))?;
        let updated = apply_patch(&tx, id, patch, expected_status)?;
        tx.commit()
            .map_err(|err| map_sqlite_error(err, "commit filing update"))?;
        Ok(updated)
    }

    fn delete(
        &self,
        id: FilingId,
        expected_status: Option<FilingStatus>,
    ) -> Result<usize, StoreError> {
        let deleted = match expected_status {
            Some(status) => self.conn.execute(
                "DELETE FROM filings WHERE filing_id = ?1 AND status = ?2",
                params![id, status.as_str()],
            ),
            None => self
                .conn
                .execute("DELETE FROM filings WHERE filing_id = ?1", params![id]),
        }
        .map_err(|err| map_sqlite_error(err, "delete filing"))?;
        Ok(deleted)
    }

    fn status_counts(&self, scope: &StatsScope) -> Result<Vec<(FilingStatus, u64)>, StoreError> {
        let filter = FilingFilter {
            client_id: scope.client_id,
            ca_id: scope.ca_id,
            tax_year: scope.tax_year,
            ..FilingFilter::default()
        };
        let clause = build_where(&filter);
        let sql = format!(
            "SELECT f.status, COUNT(*) FROM filings f{} GROUP BY f.status",
            clause.sql
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| map_sqlite_error(err, "prepare status counts"))?;
        let rows = stmt
            .query_map(params_from_iter(clause.params_ref()), |row| {
                let status: FilingStatus = parse_column(row, 0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count_to_u64(count)))
            })
            .map_err(|err| map_sqlite_error(err, "count filings by status"))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.map_err(|err| map_sqlite_error(err, "read status count"))?);
        }
        Ok(counts)
    }

    fn history(&self, id: FilingId) -> Result<Vec<StatusChange>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT filing_id, from_status, to_status, note, changed_at_us \
                 FROM filing_status_history WHERE filing_id = ?1 \
                 ORDER BY history_id ASC",
            )
            .map_err(|err| map_sqlite_error(err, "prepare status history"))?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(StatusChange {
                    filing_id: row.get(0)?,
                    from_status: parse_column(row, 1)?,
                    to_status: parse_column(row, 2)?,
                    note: row.get(3)?,
                    changed_at_us: row.get(4)?,
                })
            })
            .map_err(|err| map_sqlite_error(err, "read status history"))?;

        let mut changes = Vec::new();
        for row in rows {
            changes.push(row.map_err(|err| map_sqlite_error(err, "read status change"))?);
        }
        Ok(changes)
    }
}
