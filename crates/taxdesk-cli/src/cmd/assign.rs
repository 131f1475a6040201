//! `td assign <id> <ca>` / `td unassign <id>`.
//!
//! Assignment always replaces the previous CA. Only active users with the
//! CA role are accepted.

use super::{Context, check, write_filing};
use crate::output::{OutputMode, render};
use anyhow::Result;
use clap::Args;
use taxdesk_core::model::{FilingId, UserId};

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Filing id.
    pub id: FilingId,

    /// User id of the CA to assign.
    #[arg(value_name = "CA_ID")]
    pub ca: UserId,
}

#[derive(Args, Debug)]
pub struct UnassignArgs {
    /// Filing id.
    pub id: FilingId,
}

pub fn run_assign(args: &AssignArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let filing = check(ctx.output, ctx.engine(&store).assign_ca(args.id, args.ca))?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            return writeln!(w, "Assigned CA {} to filing #{}", args.ca, filing.id);
        }
        write_filing(w, filing, mode)
    })
}

pub fn run_unassign(args: &UnassignArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let filing = check(ctx.output, ctx.engine(&store).unassign_ca(args.id))?;

    render(ctx.output, &filing, |filing, mode, w| {
        if mode == OutputMode::Pretty {
            return writeln!(w, "Filing #{} has no assigned CA", filing.id);
        }
        write_filing(w, filing, mode)
    })
}
