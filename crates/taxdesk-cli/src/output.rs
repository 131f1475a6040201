//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! Precedence for the output mode (highest wins):
//! 1. `--json`
//! 2. `FORMAT` env var, `pretty` | `text` | `json`
//! 3. `output` in the user config
//! 4. Pretty if stdout is a TTY, text if piped

use serde::Serialize;
use std::io::{self, Write};
use taxdesk_core::FilingError;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned fields).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Map a mode name resolved by the config layer.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// A structured error with machine code, kind and optional hint.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Stable `E####` code.
    pub code: String,
    /// Snake-case failure kind, e.g. `invalid_transition`.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&FilingError> for CliError {
    fn from(err: &FilingError) -> Self {
        let code = err.code();
        Self {
            code: code.code().to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            hint: code.hint().map(str::to_string),
        }
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// JSON mode serializes `value`; pretty and text modes call `human_fn`,
/// which receives the mode so it can choose between the two layouts.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, OutputMode, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, mode, &mut out)?;
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.code, error.message)?;
            if let Some(ref hint) = error.hint {
                writeln!(out, "  hint: {hint}")?;
            }
        }
    }
    Ok(())
}

/// Format a microsecond timestamp as RFC 3339, or the raw value if out of range.
pub fn format_timestamp(us: i64) -> String {
    chrono::DateTime::from_timestamp_micros(us).map_or_else(
        || us.to_string(),
        |ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxdesk_core::Entity;

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_resolved("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_resolved("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_resolved("pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::from_resolved("anything"), OutputMode::Pretty);
    }

    #[test]
    fn cli_error_carries_code_kind_and_hint() {
        let err = FilingError::NotFound {
            entity: Entity::Filing,
            id: 7,
        };
        let cli = CliError::from(&err);
        assert_eq!(cli.code, "E2001");
        assert_eq!(cli.kind, "not_found");
        assert_eq!(cli.message, "filing 7 not found");
        assert!(cli.hint.is_none());

        let json = serde_json::to_value(&cli).expect("serialize");
        assert!(json.get("hint").is_none());
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "Status", "draft").expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "Status:      draft\n"
        );
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
    }
}
