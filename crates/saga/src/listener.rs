//! Observer hooks for saga executions.

use common::SagaId;

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::result::SagaOrchestratorResult;
use crate::step_result::SagaStepResult;

/// Receives a callback at every orchestrator transition.
///
/// Every method defaults to a no-op, so implementors override only the
/// hooks they care about. Callbacks run inline on the orchestrator's task:
/// a slow listener delays the saga.
#[allow(unused_variables)]
pub trait SagaOrchestratorListener: Send + Sync {
    fn on_saga_started(&self, saga_id: SagaId, definition: &SagaDefinition, context: &SagaContext) {
    }

    fn on_step_started(&self, saga_id: SagaId, step_name: &str, step_index: usize) {}

    /// Called once per step with its final forward result, success or not.
    fn on_step_completed(&self, saga_id: SagaId, step_name: &str, result: &SagaStepResult) {}

    /// Called for every completed step visited during rollback, even ones without a compensation.
    fn on_compensation_started(&self, saga_id: SagaId, step_name: &str, step_index: usize) {}

    fn on_compensation_step_completed(
        &self,
        saga_id: SagaId,
        step_name: &str,
        result: &SagaStepResult,
    ) {
    }

    fn on_saga_completed(&self, saga_id: SagaId, result: &SagaOrchestratorResult) {}
}

/// Listener that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SagaOrchestratorListener for NoopListener {}
