//! Typed errors for orchestrator construction and admin lookups.
//!
//! Nothing raised while the orchestrator is active surfaces through this
//! type: collaborator failures are logged and degraded at their call site.

use thiserror::Error;

/// Errors the orchestrator can return to its owner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// A required collaborator was not supplied to the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Two strategies were registered under the same name.
    #[error("strategy already registered: {name}")]
    DuplicateStrategy { name: String },

    /// An admin call referenced a strategy that is not registered.
    #[error("strategy not found: {name}")]
    StrategyNotFound { name: String },

    /// Construction-time configuration that cannot be clamped into range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
