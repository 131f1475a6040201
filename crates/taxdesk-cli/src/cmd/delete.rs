use super::{Context, check};
use crate::output::render;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use taxdesk_core::model::FilingId;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Filing id. Only draft filings can be deleted.
    pub id: FilingId,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    ok: bool,
    filing_id: FilingId,
}

pub fn run_delete(args: &DeleteArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    check(ctx.output, ctx.engine(&store).delete_filing(args.id))?;

    let payload = DeleteOutput {
        ok: true,
        filing_id: args.id,
    };
    render(ctx.output, &payload, |p, _, w| {
        writeln!(w, "Deleted filing #{}", p.filing_id)
    })
}
