use thiserror::Error;

/// Main error type for the node
#[derive(Error, Debug)]
pub enum AenError {
    // Configuration errors (fatal, fail construction)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Shared-state / collaborator I/O errors (recoverable)
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("Timeout after {elapsed_ms}ms in {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    // Optimistic-concurrency errors
    #[error("Version conflict on {node_id}: expected {expected}, current {current}")]
    Conflict {
        node_id: String,
        expected: u64,
        current: u64,
    },

    #[error("Publish skipped after {attempts} conflicting retries")]
    PublishSkipped { attempts: u32 },

    // Cycle escalation
    #[error("Fatal cycle error: {consecutive} consecutive cycle failures (last: {last})")]
    FatalCycle { consecutive: u32, last: String },

    // State machine errors
    #[error("Invalid phase transition: from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AenError
pub type Result<T> = std::result::Result<T, AenError>;

impl AenError {
    /// Whether the orchestrator may absorb this error and continue cycling.
    ///
    /// Fatal escalation and construction-time config problems are the only
    /// errors that terminate the node; everything else degrades or retries.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AenError::FatalCycle { .. } | AenError::Config(_) | AenError::InvalidConfig(_)
        )
    }
}
