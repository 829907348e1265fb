//! Error taxonomy crossing the sniping task boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal error of a sniping task. Every failure is converted into one of these
/// before it reaches the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TaskError {
    #[error("Sniping criteria not met: {0}")]
    CriteriaNotMet(String),

    #[error("Sniping criteria not satisfied within {timeout_sec}s")]
    CriteriaMonitorTimeout { timeout_sec: u64 },

    #[error("Rug pull detected, creator {creator}")]
    RugpullDetected { creator: String },

    #[error("Buy transaction {signature} failed: {details}")]
    BuyTransactionFailure { signature: String, details: String },

    #[error("All attempts of {identifier} failed")]
    AllAttemptsFailed { identifier: String },

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl TaskError {
    /// Criteria failures are informational, the task never committed capital.
    pub fn is_criteria_failure(&self) -> bool {
        matches!(
            self,
            TaskError::CriteriaNotMet(_)
                | TaskError::CriteriaMonitorTimeout { .. }
                | TaskError::RugpullDetected { .. }
        )
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        TaskError::Runtime(message.into())
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TaskError>() {
            Ok(task_error) => task_error,
            Err(other) => TaskError::Runtime(format!("{other:#}")),
        }
    }
}
