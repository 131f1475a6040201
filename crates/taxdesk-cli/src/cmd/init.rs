use super::{Context, invalid_input};
use crate::output::{pretty_kv, render};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use taxdesk_core::SqliteStore;
use taxdesk_core::db::migrations;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `config.toml` even if `.taxdesk/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[store]\n\
    busy_timeout_ms = 5000\n\
    file = \"taxdesk.sqlite3\"\n\
    \n\
    [lifecycle]\n\
    retry_on_race = true\n\
    \n\
    [queries]\n\
    default_limit = 20\n\
    max_limit = 100\n\
    deadline_window_days = 30\n";

const GITIGNORE: &str = "*.sqlite3\n*.sqlite3-wal\n*.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    state_dir: String,
    database: String,
    schema_version: u32,
}

/// Execute `td init`. Creates the project skeleton:
///
/// ```text
/// .taxdesk/
///   config.toml      (default project config)
///   .gitignore       (database files)
///   taxdesk.sqlite3  (migrated store, unless TAXDESK_DB points elsewhere)
/// ```
///
/// # Errors
///
/// Returns an error if `.taxdesk/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let state_dir = ctx.state_dir();
    if state_dir.exists() && !args.force {
        return Err(invalid_input(
            ctx.output,
            ".taxdesk/ already exists. Use `td init --force` to reinitialize.",
        ));
    }

    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let config_path = state_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let gitignore_path = state_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;

    let store = SqliteStore::open_with_timeout(
        &ctx.config.db_path,
        ctx.config.project.store.busy_timeout(),
    )?;
    let schema_version = migrations::current_schema_version(store.connection())
        .context("read schema version")?;

    tracing::info!(
        path = %ctx.config.db_path.display(),
        schema_version,
        "initialized filing store"
    );

    let payload = InitOutput {
        ok: true,
        state_dir: state_dir.display().to_string(),
        database: ctx.config.db_path.display().to_string(),
        schema_version,
    };
    render(ctx.output, &payload, |p, _, w| {
        writeln!(w, "Initialized taxdesk project in {}", p.state_dir)?;
        pretty_kv(w, "Database", &p.database)?;
        pretty_kv(w, "Schema", p.schema_version.to_string())
    })
}
