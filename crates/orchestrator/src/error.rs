use thiserror::Error;

/// Errors surfaced by the orchestrator's control surface.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The builder was given an incomplete or inconsistent configuration.
    #[error("builder error: {0}")]
    Builder(String),

    /// The named integration is not registered.
    #[error("unknown integration: {0}")]
    UnknownIntegration(String),

    /// The named integration is registered but has no running task.
    #[error("integration not running: {0}")]
    NotRunning(String),

    /// `start` was called more than once.
    #[error("orchestrator already started")]
    AlreadyStarted,
}
