//! Recipe parameter persistence and validation for the Aura Matic coffee
//! machine.
//!
//! The machine keeps its recipes in a sqlite file. This crate opens that
//! file, serves per-recipe task views, validates edits to quantities and
//! allowed ranges, and switches to a different database file on request.

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ipc;
pub mod logging;
pub mod model;
pub mod range;
pub mod service;
pub mod state;
pub mod stats;
pub mod store;
pub mod time;
pub mod util;

pub use error::{AppError, AppResult};
pub use events::ServiceEvent;
pub use ipc::channel::{ChannelError, RequestChannel};
pub use ipc::{Reply, Request, Response};
pub use logging::init_logging;
pub use service::{ImportOutcome, ImportReport, RecipeError, RecipeService, SelectOutcome};
pub use store::{Store, StoreError};

/// Commit the binary was built from, or `unknown`.
pub const GIT_HASH: &str = env!("AURAMATIC_GIT_HASH");
