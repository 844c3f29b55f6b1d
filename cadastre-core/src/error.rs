//! Error types for the Cadastre system.

/// Result type alias for Cadastre operations.
pub type Result<T> = std::result::Result<T, CadastreError>;

/// Main error type for the Cadastre system.
#[derive(Debug, thiserror::Error)]
pub enum CadastreError {
    /// Registry invariant violations (duplicate id, empty field,
    /// foundation-name mismatch). Always raised before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The named mutex could not be acquired within the timeout
    #[error("Lock '{name}' is held by {holder}; try again in a moment")]
    LockTimeout { name: String, holder: String },

    /// A stale precondition token was supplied to a guarded write
    #[error("Precondition failed: current dataVersion is {current}")]
    PreconditionFailed { current: u64 },

    /// Not found errors
    #[error("Not found: {resource} '{id}'")]
    NotFound { resource: String, id: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CadastreError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new lock timeout error
    pub fn lock_timeout(name: impl Into<String>, holder: impl Into<String>) -> Self {
        Self::LockTimeout {
            name: name.into(),
            holder: holder.into(),
        }
    }

    /// Create a new precondition failure carrying the live version
    pub fn precondition_failed(current: u64) -> Self {
        Self::PreconditionFailed { current }
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a precondition failure
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// Check if this is a lock timeout
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
