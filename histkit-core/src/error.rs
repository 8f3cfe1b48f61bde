//! Workflow error taxonomy

use crate::engine::EngineError;
use crate::fs::FsError;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors surfaced by [`crate::GitHistory`]
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// A required collaborator or identity is missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote operation was requested but no URL is configured
    #[error("No remote server configured for remote '{0}'")]
    NoRemoteConfigured(String),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to load configuration: {0}")]
    ConfigFile(String),
}

impl HistoryError {
    /// Configuration problems, including a missing remote
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HistoryError::Configuration(_)
                | HistoryError::NoRemoteConfigured(_)
                | HistoryError::ConfigFile(_)
        )
    }

    /// Whether the error ultimately signals a missing path or ref
    pub fn is_not_found(&self) -> bool {
        match self {
            HistoryError::Fs(e) => e.is_not_found(),
            HistoryError::Storage(StorageError::NotFound(_)) => true,
            HistoryError::Engine(EngineError::NotFound(_)) => true,
            HistoryError::Engine(EngineError::Fs(e)) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether the error was raised for an operation the storage cannot express
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            HistoryError::Fs(FsError::Unsupported { .. })
                | HistoryError::Engine(EngineError::Fs(FsError::Unsupported { .. }))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_remote_is_configuration_error() {
        let err = HistoryError::NoRemoteConfigured("origin".into());
        assert!(err.is_configuration());
        assert!(HistoryError::Configuration("engine".into()).is_configuration());
        assert!(!HistoryError::Fs(FsError::NotFound("/x".into())).is_configuration());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(HistoryError::Fs(FsError::NotFound("/x".into())).is_not_found());
        assert!(HistoryError::Engine(EngineError::Fs(FsError::NotFound("/x".into()))).is_not_found());
        assert!(HistoryError::Engine(EngineError::NotFound("refs/heads/x".into())).is_not_found());
        assert!(!HistoryError::Configuration("x".into()).is_not_found());
    }

    #[test]
    fn test_unsupported_classification() {
        let err = HistoryError::from(FsError::Unsupported {
            op: "readlink",
            path: "/a".into(),
        });
        assert!(err.is_unsupported());
    }
}
