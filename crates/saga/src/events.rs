//! Saga transition events and a listener that records them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::listener::SagaOrchestratorListener;
use crate::result::SagaOrchestratorResult;
use crate::state::SagaStatus;
use crate::step_result::SagaStepResult;

/// One observed orchestrator transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A forward step started.
    StepStarted(StepStartedData),

    /// A forward step reached its final result.
    StepCompleted(StepCompletedData),

    /// Rollback visited a completed step.
    CompensationStarted(StepStartedData),

    /// A compensation reached its final result.
    CompensationStepCompleted(StepCompletedData),

    /// Saga reached a terminal status.
    SagaCompleted(SagaCompletedData),
}

impl SagaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
        }
    }

    pub fn saga_id(&self) -> SagaId {
        match self {
            SagaEvent::SagaStarted(data) => data.saga_id,
            SagaEvent::StepStarted(data) | SagaEvent::CompensationStarted(data) => data.saga_id,
            SagaEvent::StepCompleted(data) | SagaEvent::CompensationStepCompleted(data) => {
                data.saga_id
            }
            SagaEvent::SagaCompleted(data) => data.saga_id,
        }
    }

    /// Step name for step-level events.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            SagaEvent::StepStarted(data) | SagaEvent::CompensationStarted(data) => {
                Some(&data.step_name)
            }
            SagaEvent::StepCompleted(data) | SagaEvent::CompensationStepCompleted(data) => {
                Some(&data.step_name)
            }
            SagaEvent::SagaStarted(_) | SagaEvent::SagaCompleted(_) => None,
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: SagaId,
    pub saga_name: String,
    pub step_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Data for StepStarted and CompensationStarted events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStartedData {
    pub saga_id: SagaId,
    pub step_name: String,
    pub step_index: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Data for StepCompleted and CompensationStepCompleted events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub saga_id: SagaId,
    pub step_name: String,
    pub result: SagaStepResult,
    pub occurred_at: DateTime<Utc>,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    pub failed_at_step: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Listener that keeps every callback as a [`SagaEvent`], in order.
///
/// Useful as an audit trail and in tests asserting on ordering.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SagaEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<SagaEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(SagaEvent::event_type)
            .collect()
    }

    /// Step names of every event of the given type, in order.
    pub fn steps_for(&self, event_type: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .filter_map(|event| event.step_name().map(str::to_string))
            .collect()
    }

    fn record(&self, event: SagaEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SagaOrchestratorListener for RecordingListener {
    fn on_saga_started(&self, saga_id: SagaId, definition: &SagaDefinition, _: &SagaContext) {
        self.record(SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            saga_name: definition.name().to_string(),
            step_count: definition.step_count(),
            started_at: Utc::now(),
        }));
    }

    fn on_step_started(&self, saga_id: SagaId, step_name: &str, step_index: usize) {
        self.record(SagaEvent::StepStarted(StepStartedData {
            saga_id,
            step_name: step_name.to_string(),
            step_index,
            occurred_at: Utc::now(),
        }));
    }

    fn on_step_completed(&self, saga_id: SagaId, step_name: &str, result: &SagaStepResult) {
        self.record(SagaEvent::StepCompleted(StepCompletedData {
            saga_id,
            step_name: step_name.to_string(),
            result: result.clone(),
            occurred_at: Utc::now(),
        }));
    }

    fn on_compensation_started(&self, saga_id: SagaId, step_name: &str, step_index: usize) {
        self.record(SagaEvent::CompensationStarted(StepStartedData {
            saga_id,
            step_name: step_name.to_string(),
            step_index,
            occurred_at: Utc::now(),
        }));
    }

    fn on_compensation_step_completed(
        &self,
        saga_id: SagaId,
        step_name: &str,
        result: &SagaStepResult,
    ) {
        self.record(SagaEvent::CompensationStepCompleted(StepCompletedData {
            saga_id,
            step_name: step_name.to_string(),
            result: result.clone(),
            occurred_at: Utc::now(),
        }));
    }

    fn on_saga_completed(&self, saga_id: SagaId, result: &SagaOrchestratorResult) {
        self.record(SagaEvent::SagaCompleted(SagaCompletedData {
            saga_id,
            status: result.status(),
            failed_at_step: result.failed_at_step().map(str::to_string),
            failure_reason: result.failure_reason().map(str::to_string),
            completed_at: result.completed_at(),
        }));
    }
}
