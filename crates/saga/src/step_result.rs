//! Outcome of a single step action or compensation attempt.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant of a [`SagaStepResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepResultStatus {
    Success,
    Failure,
    Timeout,
}

impl StepResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResultStatus::Success => "SUCCESS",
            StepResultStatus::Failure => "FAILURE",
            StepResultStatus::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for StepResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a step action or compensation produced.
///
/// Successful results may carry data, which the orchestrator merges into
/// the saga context under keys namespaced by the step name. Failures and
/// timeouts always carry an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStepResult {
    Success { data: HashMap<String, Value> },
    Failure { error: String },
    Timeout { error: String },
}

impl SagaStepResult {
    /// A successful result without data.
    pub fn success() -> Self {
        SagaStepResult::Success {
            data: HashMap::new(),
        }
    }

    /// A successful result carrying data for later steps.
    pub fn success_with<K, V, I>(data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        SagaStepResult::Success {
            data: data
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        SagaStepResult::Failure {
            error: error.into(),
        }
    }

    /// A timed-out result.
    pub fn timeout(error: impl Into<String>) -> Self {
        SagaStepResult::Timeout {
            error: error.into(),
        }
    }

    pub fn status(&self) -> StepResultStatus {
        match self {
            SagaStepResult::Success { .. } => StepResultStatus::Success,
            SagaStepResult::Failure { .. } => StepResultStatus::Failure,
            SagaStepResult::Timeout { .. } => StepResultStatus::Timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SagaStepResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SagaStepResult::Failure { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SagaStepResult::Timeout { .. })
    }

    /// Data carried by a successful result; `None` for failures and timeouts.
    pub fn data(&self) -> Option<&HashMap<String, Value>> {
        match self {
            SagaStepResult::Success { data } => Some(data),
            _ => None,
        }
    }

    /// Error message of a failure or timeout; `None` on success.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            SagaStepResult::Success { .. } => None,
            SagaStepResult::Failure { error } | SagaStepResult::Timeout { error } => Some(error),
        }
    }
}

impl std::fmt::Display for SagaStepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.error_message() {
            Some(error) => write!(f, "{}: {}", self.status(), error),
            None => write!(f, "{}", self.status()),
        }
    }
}
