//! Terminal outcome of one saga execution.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::state::{SagaStatus, StepStatus};

/// Failure reason reported for every timed-out saga.
pub const SAGA_TIMED_OUT_REASON: &str = "Saga timed out";

/// A compensation that ran but did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationFailure {
    /// The step whose compensation failed.
    pub step_name: String,
    /// Error message from the compensation.
    pub error: String,
}

/// Final record of a saga execution.
///
/// Built exactly once, through one of the four constructors matching the
/// four terminal statuses. `completed_at` is stamped by the constructor and
/// never precedes `started_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaOrchestratorResult {
    saga_id: SagaId,
    saga_name: String,
    status: SagaStatus,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    steps_completed: usize,
    steps_compensated: usize,
    failed_at_step: Option<String>,
    failure_reason: Option<String>,
    step_statuses: Vec<(String, StepStatus)>,
    compensation_failures: Vec<CompensationFailure>,
}

impl SagaOrchestratorResult {
    fn new(
        saga_id: SagaId,
        saga_name: impl Into<String>,
        status: SagaStatus,
        started_at: DateTime<Utc>,
        steps_completed: usize,
        steps_compensated: usize,
    ) -> Self {
        Self {
            saga_id,
            saga_name: saga_name.into(),
            status,
            started_at,
            completed_at: Utc::now().max(started_at),
            steps_completed,
            steps_compensated,
            failed_at_step: None,
            failure_reason: None,
            step_statuses: Vec::new(),
            compensation_failures: Vec::new(),
        }
    }

    fn with_failure(mut self, failed_at_step: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failed_at_step = Some(failed_at_step.into());
        self.failure_reason = Some(reason.into());
        self
    }

    /// Every step completed.
    pub fn success(
        saga_id: SagaId,
        saga_name: impl Into<String>,
        started_at: DateTime<Utc>,
        steps_completed: usize,
    ) -> Self {
        Self::new(
            saga_id,
            saga_name,
            SagaStatus::Completed,
            started_at,
            steps_completed,
            0,
        )
    }

    /// A step failed and the completed steps before it were rolled back.
    pub fn compensated(
        saga_id: SagaId,
        saga_name: impl Into<String>,
        started_at: DateTime<Utc>,
        failed_at_step: impl Into<String>,
        failure_reason: impl Into<String>,
        steps_completed: usize,
        steps_compensated: usize,
    ) -> Self {
        Self::new(
            saga_id,
            saga_name,
            SagaStatus::Compensated,
            started_at,
            steps_completed,
            steps_compensated,
        )
        .with_failure(failed_at_step, failure_reason)
    }

    /// A step failed with nothing to roll back.
    pub fn failed(
        saga_id: SagaId,
        saga_name: impl Into<String>,
        started_at: DateTime<Utc>,
        failed_at_step: impl Into<String>,
        failure_reason: impl Into<String>,
        steps_completed: usize,
    ) -> Self {
        Self::new(
            saga_id,
            saga_name,
            SagaStatus::Failed,
            started_at,
            steps_completed,
            0,
        )
        .with_failure(failed_at_step, failure_reason)
    }

    /// A step, or the saga deadline, timed out.
    pub fn timed_out(
        saga_id: SagaId,
        saga_name: impl Into<String>,
        started_at: DateTime<Utc>,
        failed_at_step: impl Into<String>,
        steps_completed: usize,
        steps_compensated: usize,
    ) -> Self {
        Self::new(
            saga_id,
            saga_name,
            SagaStatus::TimedOut,
            started_at,
            steps_completed,
            steps_compensated,
        )
        .with_failure(failed_at_step, SAGA_TIMED_OUT_REASON)
    }

    pub(crate) fn with_step_statuses(mut self, step_statuses: Vec<(String, StepStatus)>) -> Self {
        self.step_statuses = step_statuses;
        self
    }

    pub(crate) fn with_compensation_failures(
        mut self,
        compensation_failures: Vec<CompensationFailure>,
    ) -> Self {
        self.compensation_failures = compensation_failures;
        self
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Wall-clock time between start and completion; never negative.
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn steps_compensated(&self) -> usize {
        self.steps_compensated
    }

    /// Name of the step that failed; `None` on success.
    pub fn failed_at_step(&self) -> Option<&str> {
        self.failed_at_step.as_deref()
    }

    /// Why the saga did not complete; `None` on success.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Final status of the named step in this execution.
    pub fn step_status(&self, step_name: &str) -> Option<StepStatus> {
        self.step_statuses
            .iter()
            .find(|(name, _)| name == step_name)
            .map(|(_, status)| *status)
    }

    /// Final status of every step, in definition order.
    pub fn step_statuses(&self) -> &[(String, StepStatus)] {
        &self.step_statuses
    }

    /// Compensations that ran but reported failure or timeout.
    pub fn compensation_failures(&self) -> &[CompensationFailure] {
        &self.compensation_failures
    }

    pub fn is_successful(&self) -> bool {
        self.status == SagaStatus::Completed
    }

    pub fn is_compensated(&self) -> bool {
        self.status == SagaStatus::Compensated
    }

    pub fn is_failed(&self) -> bool {
        self.status == SagaStatus::Failed
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == SagaStatus::TimedOut
    }
}

impl fmt::Display for SagaOrchestratorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saga {} [{}] {}: completed={} compensated={}",
            self.saga_name, self.saga_id, self.status, self.steps_completed, self.steps_compensated
        )?;
        if let (Some(step), Some(reason)) = (&self.failed_at_step, &self.failure_reason) {
            write!(f, " failed_at={step} reason={reason}")?;
        }
        Ok(())
    }
}
