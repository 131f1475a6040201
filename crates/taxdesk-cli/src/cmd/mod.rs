//! One module per `td` subcommand, plus the state they share.

pub mod assign;
pub mod create;
pub mod deadlines;
pub mod delete;
pub mod directory;
pub mod history;
pub mod init;
pub mod list;
pub mod note;
pub mod show;
pub mod stats;
pub mod status;
pub mod update;

use crate::output::{
    CliError, OutputMode, format_timestamp, pretty_kv, pretty_section, render_error,
};
use anyhow::Context as _;
use std::io::{self, Write};
use std::path::PathBuf;
use taxdesk_core::config::{EffectiveConfig, PROJECT_DIR};
use taxdesk_core::model::Filing;
use taxdesk_core::{EngineConfig, ErrorCode, FilingEngine, FilingError, SqliteStore};

/// The engine as every command uses it: one store serving all three roles.
pub type Engine<'a> = FilingEngine<&'a SqliteStore, &'a SqliteStore, &'a SqliteStore>;

/// Resolved invocation state handed to every command.
#[derive(Debug)]
pub struct Context {
    pub project_root: PathBuf,
    pub config: EffectiveConfig,
    pub output: OutputMode,
}

impl Context {
    /// Open the project database, refusing to create one outside `td init`.
    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        let path = &self.config.db_path;
        if !path.exists() {
            render_error(
                self.output,
                &CliError {
                    code: ErrorCode::StoreUnavailable.code().to_string(),
                    kind: "unavailable".to_string(),
                    message: format!("no filing database at {}", path.display()),
                    hint: Some("run `td init` first, or point TAXDESK_DB at a database".into()),
                },
            )?;
            return Err(anyhow::Error::new(FilingError::Unavailable(format!(
                "no filing database at {}",
                path.display()
            ))));
        }

        SqliteStore::open_with_timeout(path, self.config.project.store.busy_timeout())
            .with_context(|| format!("open filing database {}", path.display()))
    }

    pub fn engine<'a>(&self, store: &'a SqliteStore) -> Engine<'a> {
        FilingEngine::new(
            store,
            store,
            store,
            EngineConfig::from(&self.config.project),
        )
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(PROJECT_DIR)
    }
}

/// Unwrap an engine result, rendering the failure first.
pub fn check<T>(output: OutputMode, result: Result<T, FilingError>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::debug!(code = %err.code(), kind = err.kind(), "engine operation failed");
            render_error(output, &CliError::from(&err))?;
            Err(anyhow::Error::new(err))
        }
    }
}

/// Report malformed command-line input with the validation error code.
pub fn invalid_input(output: OutputMode, message: impl Into<String>) -> anyhow::Error {
    let err = FilingError::Validation(message.into());
    if let Err(render_failure) = render_error(output, &CliError::from(&err)) {
        return render_failure;
    }
    anyhow::Error::new(err)
}

/// Whether `err` was already written to stderr by [`check`] or its siblings.
pub fn already_reported(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FilingError>().is_some()
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// One tab-separated row per filing.
pub fn write_filing_row(w: &mut dyn Write, filing: &Filing) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        filing.id,
        filing.status,
        filing.priority,
        filing.tax_year,
        filing.filing_type,
        filing.client_id,
        or_dash(filing.assigned_ca_id.map(|id| id.to_string())),
        or_dash(filing.due_date.map(|d| d.to_string())),
    )
}

pub const FILING_ROW_HEADER: &str = "id\tstatus\tpriority\ttax_year\ttype\tclient\tca\tdue";

/// Full human view of one filing.
pub fn write_filing_pretty(w: &mut dyn Write, filing: &Filing) -> io::Result<()> {
    pretty_section(
        w,
        &format!(
            "Filing #{}  {} {}",
            filing.id, filing.tax_year, filing.filing_type
        ),
    )?;
    pretty_kv(w, "Status", filing.status.as_str())?;
    pretty_kv(w, "Priority", filing.priority.as_str())?;
    pretty_kv(w, "Client", filing.client_id.to_string())?;
    pretty_kv(
        w,
        "CA",
        filing
            .assigned_ca_id
            .map_or_else(|| "(unassigned)".to_string(), |id| id.to_string()),
    )?;
    pretty_kv(w, "Due", or_dash(filing.due_date.map(|d| d.to_string())))?;
    pretty_kv(w, "Created", format_timestamp(filing.created_at_us))?;
    pretty_kv(w, "Updated", format_timestamp(filing.updated_at_us))?;

    for (label, payload) in [
        ("Income", &filing.income),
        ("Deductions", &filing.deductions),
        ("Summary", &filing.summary),
    ] {
        if let Some(value) = payload {
            pretty_kv(w, label, value.to_string())?;
        }
    }

    if let Some(notes) = &filing.notes {
        writeln!(w, "Notes:")?;
        for line in notes.lines() {
            writeln!(w, "  {line}")?;
        }
    }
    Ok(())
}

/// Pretty or text rendering of a single filing.
pub fn write_filing(w: &mut dyn Write, filing: &Filing, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Pretty => write_filing_pretty(w, filing),
        OutputMode::Text | OutputMode::Json => write_filing_row(w, filing),
    }
}
