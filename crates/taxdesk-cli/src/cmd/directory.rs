//! `td client add` / `td user add`: seed the read-only directories the
//! engine consults.

use super::{Context, invalid_input};
use crate::output::render;
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use taxdesk_core::db::now_us;
use taxdesk_core::model::{Client, ClientId, Professional, Role, UserId};

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Add or replace a client profile.
    Add(ClientAddArgs),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Add or replace a user profile.
    Add(UserAddArgs),
}

#[derive(Args, Debug)]
pub struct ClientAddArgs {
    /// Client id.
    pub id: ClientId,

    /// Display name.
    #[arg(long)]
    pub name: String,

    /// CA seeded onto every new filing for this client.
    #[arg(long = "default-ca", value_name = "USER_ID")]
    pub default_ca: Option<UserId>,
}

#[derive(Args, Debug)]
pub struct UserAddArgs {
    /// User id.
    pub id: UserId,

    /// Display name.
    #[arg(long)]
    pub name: String,

    /// Role: customer, ca or admin.
    #[arg(long, default_value = "ca")]
    pub role: Role,

    /// Record the user as inactive.
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Debug, Serialize)]
struct SeedOutput<T: Serialize> {
    ok: bool,
    #[serde(flatten)]
    record: T,
}

pub fn run_client(command: &ClientCommand, ctx: &Context) -> Result<()> {
    let ClientCommand::Add(args) = command;
    let name = args.name.trim();
    if name.is_empty() {
        return Err(invalid_input(ctx.output, "client name must not be blank"));
    }

    let client = Client {
        id: args.id,
        name: name.to_string(),
        default_ca_id: args.default_ca,
    };
    let store = ctx.open_store()?;
    if let Err(err) = store.upsert_client(&client, now_us()) {
        return Err(invalid_input(
            ctx.output,
            format!("cannot save client {}: {err}", client.id),
        ));
    }

    let payload = SeedOutput {
        ok: true,
        record: client,
    };
    render(ctx.output, &payload, |out, _, w| {
        writeln!(w, "Saved client {} ({})", out.record.id, out.record.name)
    })
}

pub fn run_user(command: &UserCommand, ctx: &Context) -> Result<()> {
    let UserCommand::Add(args) = command;
    let name = args.name.trim();
    if name.is_empty() {
        return Err(invalid_input(ctx.output, "user name must not be blank"));
    }

    let user = Professional {
        id: args.id,
        name: name.to_string(),
        role: args.role,
        is_active: !args.inactive,
    };
    let store = ctx.open_store()?;
    store.upsert_professional(&user, now_us())?;

    let payload = SeedOutput {
        ok: true,
        record: user,
    };
    render(ctx.output, &payload, |out, _, w| {
        writeln!(
            w,
            "Saved user {} ({}, {}{})",
            out.record.id,
            out.record.name,
            out.record.role,
            if out.record.is_active { "" } else { ", inactive" }
        )
    })
}
