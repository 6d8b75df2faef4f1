//! Algorithm service client
//!
//! The reconciler talks to the algorithm service through [`SuggestionClient`] so the
//! transport can be swapped out in tests. [`GrpcSuggestionClient`] is the production
//! implementation over tonic.

mod grpc;
pub mod proto;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::crd::{AlgorithmSetting, Experiment, Suggestion, Trial, TrialAssignment};

pub use grpc::{GrpcSuggestionClient, DEFAULT_DB_MANAGER_ADDRESS};

/// Failure of a call to the algorithm service
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// The service could not be reached or returned a transient error
    #[error("algorithm service unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within its deadline
    #[error("algorithm service call timed out after {0:?}")]
    Timeout(Duration),

    /// The service rejected the request; retrying the same input will not help
    #[error("algorithm service rejected request ({reason}): {message}")]
    Rejected {
        /// Short machine-readable reason
        reason: String,
        /// Message from the service
        message: String,
    },
}

/// Rejection reason used when the early-stopping service refused its settings
pub const EARLY_STOPPING_REJECTED: &str = "EarlyStoppingSettingsRejected";

impl ClientError {
    /// Whether retrying the same request is pointless
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    /// Attribute a rejection to the early-stopping service
    pub fn attributed_to_early_stopping(self) -> Self {
        match self {
            ClientError::Rejected { message, .. } => ClientError::Rejected {
                reason: EARLY_STOPPING_REJECTED.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Whether the early-stopping service refused its settings
    pub fn is_early_stopping_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { reason, .. } if reason == EARLY_STOPPING_REJECTED)
    }
}

/// Result of a successful assignment sync
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncReply {
    /// Newly produced assignments
    pub assignments: Vec<TrialAssignment>,
    /// Algorithm settings as reported back by the service; empty means unchanged
    pub algorithm_settings: Vec<AlgorithmSetting>,
}

/// Calls made by the reconciler to a Suggestion's algorithm service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SuggestionClient: Send + Sync {
    /// Ask the service whether the Suggestion's algorithm (and early-stopping)
    /// settings are acceptable for this Experiment
    async fn validate_algorithm_settings(
        &self,
        suggestion: &Suggestion,
        experiment: &Experiment,
    ) -> Result<(), ClientError>;

    /// Request `spec.requests - status.suggestionCount` new assignments
    async fn sync_assignments(
        &self,
        suggestion: &Suggestion,
        experiment: &Experiment,
        trials: &[Trial],
    ) -> Result<SyncReply, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn story_only_rejections_are_terminal() {
        assert!(ClientError::Rejected {
            reason: "InvalidArgument".to_string(),
            message: "unknown setting".to_string(),
        }
        .is_terminal());
        assert!(!ClientError::Unavailable("connection refused".to_string()).is_terminal());
        assert!(!ClientError::Timeout(Duration::from_secs(60)).is_terminal());
    }

    #[test]
    fn story_early_stopping_rejections_keep_their_message() {
        let err = ClientError::Rejected {
            reason: "InvalidArgument".to_string(),
            message: "min_trials_required must be positive".to_string(),
        }
        .attributed_to_early_stopping();
        assert!(err.is_early_stopping_rejection());
        assert!(err.to_string().contains("min_trials_required"));

        let timeout = ClientError::Timeout(Duration::from_secs(1)).attributed_to_early_stopping();
        assert!(!timeout.is_early_stopping_rejection());
    }

    #[test]
    fn story_errors_describe_their_cause() {
        let err = ClientError::Rejected {
            reason: "InvalidArgument".to_string(),
            message: "max_trial_count too low".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "algorithm service rejected request (InvalidArgument): max_trial_count too low"
        );
    }
}
