/// Convenience result type used across frameplan.
pub type FrameplanResult<T> = Result<T, FrameplanError>;

/// Top-level error taxonomy used by scheduling APIs.
#[derive(thiserror::Error, Debug)]
pub enum FrameplanError {
    /// Invalid configuration, table, or id supplied by the embedding application.
    #[error("validation error: {0}")]
    Validation(String),

    /// A cycle overflowed and the recovery callback did not bring it back under budget.
    #[error("overflow error: {0}")]
    Overflow(String),

    /// Errors raised while dispatching a consolidated phase.
    #[error("execution error: {0}")]
    Execution(String),

    /// Errors when serializing or deserializing configuration.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrameplanError {
    /// Build a [`FrameplanError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FrameplanError::Overflow`] value.
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    /// Build a [`FrameplanError::Execution`] value.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Build a [`FrameplanError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for FrameplanError {
    fn from(err: serde_json::Error) -> Self {
        Self::serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
