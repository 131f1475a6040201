#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::process::ExitCode;
use taxdesk_core::ErrorCode;
use taxdesk_core::config::resolve_config;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "td: tax filing lifecycle desk",
    long_about = None
)]
struct Cli {
    /// Enable debug logging for taxdesk crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a taxdesk project",
        long_about = "Create .taxdesk/ with a default config and a migrated filing database.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    td init\n\n    # Rewrite the default config\n    td init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage client profiles",
        after_help = "EXAMPLES:\n    # Add a client whose filings start with CA 9 assigned\n    td client add 5 --name \"Meera Iyer\" --default-ca 9"
    )]
    Client {
        #[command(subcommand)]
        command: cmd::directory::ClientCommand,
    },

    #[command(
        next_help_heading = "Setup",
        about = "Manage staff and customer profiles",
        after_help = "EXAMPLES:\n    # Add an active CA\n    td user add 9 --name Asha\n\n    # Add an inactive CA\n    td user add 13 --name Ravi --inactive"
    )]
    User {
        #[command(subcommand)]
        command: cmd::directory::UserCommand,
    },

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a draft filing",
        long_about = "Create a draft filing for a client. The client's default CA is assigned when eligible.",
        after_help = "EXAMPLES:\n    # Create an individual return\n    td create --client 5 --year 2023-2024 --type individual\n\n    # With priority and due date\n    td create --client 5 --year 2023-2024 --type business --priority high --due 2024-07-31"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Move a filing to another status",
        long_about = "Transition a filing along the lifecycle table, optionally recording a note.",
        after_help = "EXAMPLES:\n    # Start work\n    td status 1 in_progress -m \"documents collected\"\n\n    # Send for review\n    td status 1 under_review"
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Assign a CA to a filing",
        after_help = "EXAMPLES:\n    # Assign CA 9\n    td assign 1 9"
    )]
    Assign(cmd::assign::AssignArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Remove the assigned CA",
        after_help = "EXAMPLES:\n    td unassign 1"
    )]
    Unassign(cmd::assign::UnassignArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Delete a draft filing",
        after_help = "EXAMPLES:\n    td delete 1"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Edit priority, due date or payloads",
        after_help = "EXAMPLES:\n    # Raise priority and set a due date\n    td update 1 --priority urgent --due 2024-07-31\n\n    # Attach an income payload\n    td update 1 --income '{\"salary\": 1200000}'"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Append a note to a filing",
        after_help = "EXAMPLES:\n    td note 1 \"client sent Form 16\""
    )]
    Note(cmd::note::NoteArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one filing",
        after_help = "EXAMPLES:\n    td show 1\n    td show 1 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "List filings",
        long_about = "List filings with filters, sorting and pagination.",
        after_help = "EXAMPLES:\n    # Open work for CA 9, most urgent first\n    td list --ca 9 --status draft,in_progress --sort priority\n\n    # Search notes\n    td list --search \"form 16\"\n\n    # Second page\n    td list --limit 20 --offset 20"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a filing's status history",
        after_help = "EXAMPLES:\n    td history 1"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Count filings by status",
        after_help = "EXAMPLES:\n    td stats\n    td stats --ca 9 --year 2023-2024"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Read",
        about = "List open filings due soon",
        after_help = "EXAMPLES:\n    # Default window from config\n    td deadlines\n\n    # Next week for CA 9\n    td deadlines --days 7 --ca 9"
    )]
    Deadlines(cmd::deadlines::DeadlinesArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TAXDESK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "taxdesk=debug,info"
        } else {
            "taxdesk=info,warn"
        })
    });

    let format = env::var("TAXDESK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output only.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(command: &Commands, ctx: &cmd::Context) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cmd::init::run_init(args, ctx),
        Commands::Client { command } => cmd::directory::run_client(command, ctx),
        Commands::User { command } => cmd::directory::run_user(command, ctx),
        Commands::Create(args) => cmd::create::run_create(args, ctx),
        Commands::Status(args) => cmd::status::run_status(args, ctx),
        Commands::Assign(args) => cmd::assign::run_assign(args, ctx),
        Commands::Unassign(args) => cmd::assign::run_unassign(args, ctx),
        Commands::Delete(args) => cmd::delete::run_delete(args, ctx),
        Commands::Update(args) => cmd::update::run_update(args, ctx),
        Commands::Note(args) => cmd::note::run_note(args, ctx),
        Commands::Show(args) => cmd::show::run_show(args, ctx),
        Commands::List(args) => cmd::list::run_list(args, ctx),
        Commands::History(args) => cmd::history::run_history(args, ctx),
        Commands::Stats(args) => cmd::stats::run_stats(args, ctx),
        Commands::Deadlines(args) => cmd::deadlines::run_deadlines(args, ctx),
    }
}

fn report(output: OutputMode, code: ErrorCode, kind: &str, err: &anyhow::Error) -> ExitCode {
    let cli_error = CliError {
        code: code.code().to_string(),
        kind: kind.to_string(),
        message: format!("{err:#}"),
        hint: code.hint().map(str::to_string),
    };
    if render_error(output, &cli_error).is_err() {
        eprintln!("error: {err:#}");
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let fallback_output = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Pretty
    };

    let project_root = match env::current_dir() {
        Ok(root) => root,
        Err(err) => {
            return report(
                fallback_output,
                ErrorCode::InternalUnexpected,
                "internal",
                &err.into(),
            );
        }
    };

    let config = match resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            return report(
                fallback_output,
                ErrorCode::ConfigParseError,
                "config_error",
                &err,
            );
        }
    };
    let output = OutputMode::from_resolved(&config.resolved_output);
    debug!(db = %config.db_path.display(), output = %config.resolved_output, "resolved config");

    let ctx = cmd::Context {
        project_root,
        config,
        output,
    };

    match dispatch(&cli.command, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if cmd::already_reported(&err) => {
            debug!(error = %err, "command failed");
            ExitCode::FAILURE
        }
        Err(err) => report(output, ErrorCode::InternalUnexpected, "internal", &err),
    }
}
