use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Invalid consent event: {0}")]
    Validation(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Chain adapter failed: {0}")]
    Adapter(String),

    #[error("Chain adapter timed out after {0} ms")]
    Timeout(u64),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AnchorError {
    /// Whether repeating the call that produced this error can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnchorError::Adapter(_) | AnchorError::Timeout(_) | AnchorError::Persistence(_)
        )
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(e: serde_json::Error) -> Self {
        AnchorError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AnchorError::Adapter("offline".into()).is_retryable());
        assert!(AnchorError::Timeout(500).is_retryable());
        assert!(AnchorError::Persistence("disk full".into()).is_retryable());
        assert!(!AnchorError::Validation("missing url".into()).is_retryable());
        assert!(!AnchorError::Integrity("root mismatch".into()).is_retryable());
    }
}
