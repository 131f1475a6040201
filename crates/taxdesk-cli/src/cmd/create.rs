use super::{Context, check, write_filing};
use crate::output::{OutputMode, render};
use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use taxdesk_core::CreateFiling;
use taxdesk_core::model::ClientId;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Client the filing belongs to.
    #[arg(long)]
    pub client: Option<ClientId>,

    /// Tax year, e.g. 2023-2024.
    #[arg(long = "year", value_name = "YYYY-YYYY")]
    pub tax_year: Option<String>,

    /// Filing type: individual, business or capital_gains.
    #[arg(long = "type", value_name = "TYPE")]
    pub filing_type: Option<String>,

    /// Priority: low, medium, high or urgent. Defaults to medium.
    #[arg(long)]
    pub priority: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    pub due: Option<NaiveDate>,

    /// Initial notes.
    #[arg(long)]
    pub notes: Option<String>,
}

/// Execute `td create`.
///
/// Required fields are optional at the argument level so that the engine
/// reports what is missing with its own validation error.
pub fn run_create(args: &CreateArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let engine = ctx.engine(&store);

    let request = CreateFiling {
        client_id: args.client,
        tax_year: args.tax_year.clone(),
        filing_type: args.filing_type.clone(),
        priority: args.priority.clone(),
        due_date: args.due,
        notes: args.notes.clone(),
    };
    let filing = check(ctx.output, engine.create_filing(request))?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            writeln!(w, "Created filing #{}", filing.id)?;
        }
        write_filing(w, filing, mode)
    })
}
