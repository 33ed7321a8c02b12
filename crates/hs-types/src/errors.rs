use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure ranks when several evaluations fail at the same time.
///
/// Every [`SearchError`] maps to exactly one severity. Callers pass an ordered
/// list of severities (most important first) to decide which failure to
/// propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// A real error: evaluation, persistence, protocol, configuration.
    Domain,
    /// The scheduler or a worker died; the whole search aborts.
    Hard,
    /// A clean stop request (user, timeout, iteration cap).
    Soft,
}

/// Main error type for the search system.
///
/// The type is `Clone` because a single failure stored in a future is handed
/// to every waiter.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("Search soft interrupted: {reason}")]
    SoftInterrupted { reason: String },

    #[error("Search hard interrupted: {reason}")]
    HardInterrupted { reason: String },

    #[error("Worker failure: {message}")]
    WorkerFailure { message: String },

    #[error("Evaluation failed on split {split_id}: {message}")]
    Evaluation { split_id: usize, message: String },

    #[error("Persistence error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Search space produced no candidate")]
    EmptySearchSpace,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    pub fn soft(reason: impl Into<String>) -> Self {
        Self::SoftInterrupted {
            reason: reason.into(),
        }
    }

    pub fn hard(reason: impl Into<String>) -> Self {
        Self::HardInterrupted {
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SoftInterrupted { .. } => Severity::Soft,
            Self::HardInterrupted { .. } | Self::WorkerFailure { .. } => Severity::Hard,
            Self::Evaluation { .. }
            | Self::Persistence { .. }
            | Self::Serialization(_)
            | Self::Protocol(_)
            | Self::EmptySearchSpace
            | Self::Config(_)
            | Self::Internal(_) => Severity::Domain,
        }
    }

    pub fn is_soft_interruption(&self) -> bool {
        self.severity() == Severity::Soft
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SearchError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::SearchError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SearchError::Evaluation {
            split_id: 3,
            message: "singular matrix".to_string(),
        };

        assert!(error.to_string().contains("split 3"));
        assert!(error.to_string().contains("singular matrix"));

        let error = SearchError::persistence(
            "/tmp/run/grid_search_done.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("grid_search_done.json"));
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(SearchError::soft("timeout").severity(), Severity::Soft);
        assert_eq!(SearchError::hard("shutdown").severity(), Severity::Hard);
        assert_eq!(
            SearchError::WorkerFailure {
                message: "lost".into()
            }
            .severity(),
            Severity::Hard
        );
        assert_eq!(SearchError::Protocol("x".into()).severity(), Severity::Domain);
        assert_eq!(SearchError::EmptySearchSpace.severity(), Severity::Domain);
        assert!(SearchError::soft("user").is_soft_interruption());
        assert!(!SearchError::hard("user").is_soft_interruption());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: SearchError = json_err.into();

        match err {
            SearchError::Serialization(_) => (),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("Missing required field: {}", "metric");
        assert!(matches!(config_err, SearchError::Config(_)));
        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, SearchError::Internal(_)));
    }
}
