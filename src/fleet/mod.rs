//! Fleet simulation engine.
//!
//! Owns the simulated inventory, synthesizes telemetry, advances task and
//! alert lifecycles on each tick, and answers read queries from snapshots.

mod aggregate;
mod catalog;
mod history;
mod lifecycle;
mod metrics;
mod models;
mod query;
mod store;

pub use aggregate::*;
pub use catalog::*;
pub use history::*;
pub use lifecycle::*;
pub use metrics::*;
pub use models::*;
pub use query::*;
pub use store::*;

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("generation failed: {0}")]
    TransientGeneration(String),
}

impl FleetError {
    pub fn server_not_found(id: &str) -> Self {
        FleetError::NotFound {
            kind: "server",
            id: id.to_string(),
        }
    }

    pub fn task_not_found(id: &str) -> Self {
        FleetError::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }
}
