//! Saga and step lifecycle states.

use serde::{Deserialize, Serialize};

/// The state of a saga execution in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──► InProgress ──┬──► Completed
///                          ├──► Failed
///                          └──► Compensating ──┬──► Compensated
///                                              └──► TimedOut
/// ```
///
/// The orchestrator only ever reports one of the four terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Saga accepted, no step has run yet.
    #[default]
    Started,

    /// Forward steps are being executed.
    InProgress,

    /// A step failed and compensations are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// A step failed and completed steps were rolled back (terminal state).
    Compensated,

    /// A step failed before anything needed rolling back (terminal state).
    Failed,

    /// A step or the saga deadline timed out (terminal state).
    TimedOut,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed
                | SagaStatus::Compensated
                | SagaStatus::Failed
                | SagaStatus::TimedOut
        )
    }

    /// Returns true while the saga is still doing work.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true only for a fully successful saga.
    pub fn is_successful(&self) -> bool {
        matches!(self, SagaStatus::Completed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a single step within one saga run.
///
/// ```text
/// Pending ──┬──► Completed ──► Compensated
///           ├──► Failed
///           └──► Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Not executed yet.
    #[default]
    Pending,

    /// The action succeeded.
    Completed,

    /// The action failed after exhausting its retries.
    Failed,

    /// The saga aborted before this step ran.
    Skipped,

    /// The compensation for a completed step ran.
    Compensated,
}

impl StepStatus {
    /// Only a completed step has effects that may need undoing.
    pub fn needs_compensation(&self) -> bool {
        matches!(self, StepStatus::Completed)
    }

    /// Returns true for every state except `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
