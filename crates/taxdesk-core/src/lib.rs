//! taxdesk-core: filing lifecycle and CA assignment engine.
//!
//! # Conventions
//!
//! - **Errors**: engine operations return [`FilingError`]; infrastructure
//!   (config, database opening, migrations) returns `anyhow::Result`.
//! - **Logging**: `tracing` macros with structured `filing_id`, `status`
//!   and `ca_id` fields.
//! - **Time**: timestamps are `i64` microseconds since the Unix epoch.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod store;

pub use db::SqliteStore;
pub use engine::{
    CreateFiling, DeadlineQuery, EngineConfig, FilingDetails, FilingEngine, FilingPage,
    FilingStats,
};
pub use error::{Entity, ErrorCode, FilingError};
pub use store::{FilingFilter, FilingSort, StatsScope, StoreError};
