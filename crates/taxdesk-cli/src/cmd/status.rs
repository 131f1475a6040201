//! `td status <id> <status>`: move a filing through its lifecycle.
//!
//! Allowed moves:
//!
//! ```text
//! draft        -> in_progress, rejected
//! in_progress  -> under_review, draft, rejected
//! under_review -> completed, in_progress, rejected
//! completed    -> (terminal)
//! rejected     -> draft, in_progress
//! ```

use super::{Context, check, write_filing};
use crate::output::{OutputMode, render};
use anyhow::Result;
use clap::Args;
use taxdesk_core::model::FilingId;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filing id.
    pub id: FilingId,

    /// Target status.
    pub status: String,

    /// Note appended to the filing and recorded with the change.
    #[arg(long, short = 'm')]
    pub note: Option<String>,
}

pub fn run_status(args: &StatusArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let engine = ctx.engine(&store);
    let filing = check(
        ctx.output,
        engine.transition_named(args.id, &args.status, args.note.as_deref()),
    )?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            writeln!(w, "Filing #{} is now {}", filing.id, filing.status)?;
            return Ok(());
        }
        write_filing(w, filing, mode)
    })
}
