use super::{Context, check};
use crate::output::{OutputMode, pretty_kv, pretty_section, render};
use anyhow::Result;
use clap::Args;
use taxdesk_core::StatsScope;
use taxdesk_core::model::{ClientId, TaxYear, UserId};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Only this client's filings.
    #[arg(long)]
    pub client: Option<ClientId>,

    /// Only filings assigned to this CA.
    #[arg(long)]
    pub ca: Option<UserId>,

    /// Only this tax year.
    #[arg(long = "year", value_name = "YYYY-YYYY")]
    pub tax_year: Option<TaxYear>,
}

pub fn run_stats(args: &StatsArgs, ctx: &Context) -> Result<()> {
    let scope = StatsScope {
        client_id: args.client,
        ca_id: args.ca,
        tax_year: args.tax_year,
    };
    let store = ctx.open_store()?;
    let stats = check(ctx.output, ctx.engine(&store).statistics(scope))?;

    render(ctx.output, &stats, |stats, mode, w| {
        if mode == OutputMode::Pretty {
            pretty_section(w, "Filings by status")?;
            for (status, count) in &stats.by_status {
                pretty_kv(w, status.as_str(), count.to_string())?;
            }
            return pretty_kv(w, "total", stats.total.to_string());
        }
        for (status, count) in &stats.by_status {
            writeln!(w, "{status}\t{count}")?;
        }
        writeln!(w, "total\t{}", stats.total)
    })
}
