use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration, including a missing tenant on a
    /// retrieval call. Never recovered locally.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store lacks a capability (e.g. no full-text index). Strategies
    /// answer this with their own scan-based fallback.
    #[error("Unsupported by store: {0}")]
    Unsupported(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl Error {
    /// Short machine-friendly tag used in retrieval diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::NotFound(_) => "not_found",
            Error::Operation(_) => "operation",
            Error::EmbeddingUnavailable(_) => "embedding_unavailable",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Unsupported(_) => "unsupported",
            Error::Timeout(_) => "timeout",
            Error::MalformedInput(_) => "malformed_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = Error::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn timeout_display() {
        let err = Error::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timed out after 250ms");
    }
}
