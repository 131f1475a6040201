use super::{Context, check, write_filing};
use crate::output::{OutputMode, render};
use anyhow::Result;
use clap::Args;
use taxdesk_core::model::FilingId;

#[derive(Args, Debug)]
pub struct NoteArgs {
    /// Filing id.
    pub id: FilingId,

    /// Note text, appended on its own line.
    pub text: String,
}

pub fn run_note(args: &NoteArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let filing = check(ctx.output, ctx.engine(&store).add_note(args.id, &args.text))?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            return writeln!(w, "Added note to filing #{}", filing.id);
        }
        write_filing(w, filing, mode)
    })
}
