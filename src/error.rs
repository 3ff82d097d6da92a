//! Error types for Wiggum
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Wiggum
#[derive(Debug, Error)]
pub enum WiggumError {
    /// The agent process could not be started
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// The agent process misbehaved after it started
    #[error("Process error: {0}")]
    Process(String),

    /// A stream line could not be decoded into a protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session log persistence error
    #[error("Session log error: {0}")]
    SessionLog(String),

    /// A backpressure check could not be executed
    #[error("Backpressure error: {0}")]
    Backpressure(String),

    /// Prompt template error
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The on-disk .wiggum workspace is missing or malformed
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// The task plan violates its invariants
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Wiggum operations
pub type Result<T> = std::result::Result<T, WiggumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error() {
        let err = WiggumError::Spawn("claude: not found".to_string());
        assert_eq!(err.to_string(), "Spawn error: claude: not found");
    }

    #[test]
    fn test_protocol_error() {
        let err = WiggumError::Protocol("unknown message type: bogus".to_string());
        assert_eq!(err.to_string(), "Protocol error: unknown message type: bogus");
    }

    #[test]
    fn test_invalid_plan_error() {
        let err = WiggumError::InvalidPlan("dependency cycle: a -> b -> a".to_string());
        assert_eq!(err.to_string(), "Invalid plan: dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WiggumError = io_err.into();
        assert!(matches!(err, WiggumError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: WiggumError = json_err.into();
        assert!(matches!(err, WiggumError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: a list}").unwrap_err();
        let err: WiggumError = yaml_err.into();
        assert!(matches!(err, WiggumError::Yaml(_)));
    }
}
