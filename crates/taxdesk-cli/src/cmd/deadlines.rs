use super::Context;
use super::check;
use super::list::write_page;
use crate::output::render;
use anyhow::Result;
use clap::Args;
use taxdesk_core::DeadlineQuery;
use taxdesk_core::model::{ClientId, UserId};

#[derive(Args, Debug)]
pub struct DeadlinesArgs {
    /// Window length in days from today. Defaults to the configured window.
    #[arg(long)]
    pub days: Option<u32>,

    /// Only filings assigned to this CA.
    #[arg(long)]
    pub ca: Option<UserId>,

    /// Only this client's filings.
    #[arg(long)]
    pub client: Option<ClientId>,

    /// Maximum number of results.
    #[arg(long)]
    pub limit: Option<u32>,
}

/// Execute `td deadlines`: open filings due between today and the end of
/// the window, earliest first.
pub fn run_deadlines(args: &DeadlinesArgs, ctx: &Context) -> Result<()> {
    let query = DeadlineQuery {
        days: args.days,
        ca_id: args.ca,
        client_id: args.client,
        limit: args.limit,
    };
    let store = ctx.open_store()?;
    let page = check(ctx.output, ctx.engine(&store).upcoming_deadlines(query))?;

    let days = args
        .days
        .unwrap_or(ctx.config.project.queries.deadline_window_days);
    render(ctx.output, &page, |page, mode, w| {
        write_page(w, page, mode, &format!("Due within {days} days"))
    })
}
