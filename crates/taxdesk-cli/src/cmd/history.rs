use super::{Context, check};
use crate::output::{OutputMode, format_timestamp, pretty_section, render};
use anyhow::Result;
use clap::Args;
use taxdesk_core::model::FilingId;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Filing id.
    pub id: FilingId,
}

pub fn run_history(args: &HistoryArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let changes = check(ctx.output, ctx.engine(&store).status_history(args.id))?;

    render(ctx.output, &changes, |changes, mode, w| {
        if mode == OutputMode::Pretty {
            pretty_section(w, &format!("Status history for filing #{}", args.id))?;
            if changes.is_empty() {
                writeln!(w, "(no status changes)")?;
            }
        }
        for change in changes {
            let when = format_timestamp(change.changed_at_us);
            let note = change.note.as_deref().unwrap_or("");
            if mode == OutputMode::Pretty {
                writeln!(
                    w,
                    "{when}  {} -> {}  {note}",
                    change.from_status, change.to_status
                )?;
            } else {
                writeln!(
                    w,
                    "{when}\t{}\t{}\t{note}",
                    change.from_status, change.to_status
                )?;
            }
        }
        Ok(())
    })
}
