use super::{Context, check, write_filing};
use crate::output::render;
use anyhow::Result;
use clap::Args;
use taxdesk_core::model::FilingId;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Filing id.
    pub id: FilingId,
}

pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let filing = check(ctx.output, ctx.engine(&store).get_filing(args.id))?;
    render(ctx.output, &filing, |filing, mode, w| {
        write_filing(w, filing, mode)
    })
}
