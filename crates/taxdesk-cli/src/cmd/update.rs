use super::{Context, check, invalid_input, write_filing};
use crate::output::{OutputMode, render};
use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use taxdesk_core::FilingDetails;
use taxdesk_core::model::{FilingId, Priority};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Filing id.
    pub id: FilingId,

    /// New priority.
    #[arg(long)]
    pub priority: Option<Priority>,

    /// New due date (YYYY-MM-DD).
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,

    /// Remove the due date.
    #[arg(long)]
    pub clear_due: bool,

    /// Income payload as JSON.
    #[arg(long, value_name = "JSON")]
    pub income: Option<String>,

    /// Deductions payload as JSON.
    #[arg(long, value_name = "JSON")]
    pub deductions: Option<String>,

    /// Summary payload as JSON.
    #[arg(long, value_name = "JSON")]
    pub summary: Option<String>,
}

fn parse_payload(
    ctx: &Context,
    field: &str,
    raw: Option<&str>,
) -> Result<Option<serde_json::Value>> {
    raw.map(|text| {
        serde_json::from_str(text)
            .map_err(|err| invalid_input(ctx.output, format!("--{field} is not valid JSON: {err}")))
    })
    .transpose()
}

/// Execute `td update`. Status and assignment have their own commands.
pub fn run_update(args: &UpdateArgs, ctx: &Context) -> Result<()> {
    let details = FilingDetails {
        priority: args.priority,
        due_date: args.due,
        clear_due_date: args.clear_due,
        income: parse_payload(ctx, "income", args.income.as_deref())?,
        deductions: parse_payload(ctx, "deductions", args.deductions.as_deref())?,
        summary: parse_payload(ctx, "summary", args.summary.as_deref())?,
    };

    let store = ctx.open_store()?;
    let filing = check(
        ctx.output,
        ctx.engine(&store).update_details(args.id, details),
    )?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            writeln!(w, "Updated filing #{}", filing.id)?;
        }
        write_filing(w, filing, mode)
    })
}
