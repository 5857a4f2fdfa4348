//! Saga orchestrator: sequential forward execution with reverse-order compensation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use common::SagaId;
use futures_util::FutureExt;
use tokio::time::Instant;

use crate::config::OrchestratorConfig;
use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::listener::{NoopListener, SagaOrchestratorListener};
use crate::result::{CompensationFailure, SagaOrchestratorResult};
use crate::state::StepStatus;
use crate::step::{SagaStep, StepHandler};
use crate::step_result::SagaStepResult;

/// Drives saga executions.
///
/// Steps of one execution run strictly one after another. Each attempt is
/// raced against the step timeout and retried with a fixed delay while
/// retries remain. When a step fails for good, the steps completed before
/// it are compensated in reverse order, best effort: a failing compensation
/// does not stop the rollback of earlier steps.
///
/// The orchestrator holds no per-execution state, so one instance can run
/// any number of sagas concurrently.
#[derive(Debug, Clone, Default)]
pub struct SagaOrchestrator {
    config: OrchestratorConfig,
}

/// Outcome of the rollback phase.
struct Rollback {
    compensated: usize,
    failures: Vec<CompensationFailure>,
}

impl SagaOrchestrator {
    /// Creates an orchestrator with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Executes `definition` without a listener.
    pub async fn execute(
        &self,
        saga_id: SagaId,
        definition: &SagaDefinition,
        context: &mut SagaContext,
    ) -> SagaOrchestratorResult {
        self.execute_with_listener(saga_id, definition, context, &NoopListener)
            .await
    }

    /// Executes `definition` until it reaches a terminal status.
    ///
    /// Step failures are reported through the returned result, never as an
    /// error. Data returned by successful steps is merged into `context`
    /// under [`SagaContext::step_key`] names.
    #[tracing::instrument(skip_all, fields(saga_id = %saga_id, saga = definition.name()))]
    pub async fn execute_with_listener(
        &self,
        saga_id: SagaId,
        definition: &SagaDefinition,
        context: &mut SagaContext,
        listener: &dyn SagaOrchestratorListener,
    ) -> SagaOrchestratorResult {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let deadline = definition
            .saga_timeout()
            .or(self.config.default_saga_timeout)
            .map(|timeout| Instant::now() + timeout);

        self.increment("saga_executions_total", definition.name());
        tracing::info!(steps = definition.step_count(), "saga started");
        listener.on_saga_started(saga_id, definition, context);

        let steps = definition.steps();
        let mut statuses = vec![StepStatus::Pending; steps.len()];

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(step = step.name(), index, "saga step started");
            listener.on_step_started(saga_id, step.name(), index);

            let outcome = self
                .run_attempts(definition, step, step.action(), context, deadline)
                .await;

            if let SagaStepResult::Success { data } = &outcome {
                statuses[index] = StepStatus::Completed;
                listener.on_step_completed(saga_id, step.name(), &outcome);
                if !data.is_empty() {
                    context.merge_step_data(step.name(), data);
                    tracing::debug!(step = step.name(), keys = data.len(), "step data merged");
                }
                tracing::info!(step = step.name(), "saga step completed");
                continue;
            }

            statuses[index] = StepStatus::Failed;
            for status in &mut statuses[index + 1..] {
                *status = StepStatus::Skipped;
            }
            let reason = outcome.error_message().unwrap_or_default().to_string();
            tracing::warn!(step = step.name(), %reason, outcome = %outcome.status(), "saga step failed");
            listener.on_step_completed(saga_id, step.name(), &outcome);

            let rollback = self
                .compensate(saga_id, definition, context, listener, &mut statuses, index)
                .await;

            let result = if outcome.is_timeout() {
                SagaOrchestratorResult::timed_out(
                    saga_id,
                    definition.name(),
                    started_at,
                    step.name(),
                    index,
                    rollback.compensated,
                )
            } else if index == 0 {
                SagaOrchestratorResult::failed(
                    saga_id,
                    definition.name(),
                    started_at,
                    step.name(),
                    reason,
                    0,
                )
            } else {
                SagaOrchestratorResult::compensated(
                    saga_id,
                    definition.name(),
                    started_at,
                    step.name(),
                    reason,
                    index,
                    rollback.compensated,
                )
            };
            let result = result
                .with_step_statuses(step_statuses(definition, &statuses))
                .with_compensation_failures(rollback.failures);
            return self.finish(saga_id, definition, listener, result, clock);
        }

        let result =
            SagaOrchestratorResult::success(saga_id, definition.name(), started_at, steps.len())
                .with_step_statuses(step_statuses(definition, &statuses));
        self.finish(saga_id, definition, listener, result, clock)
    }

    /// Rolls back the completed steps before `failed_index`, newest first.
    async fn compensate(
        &self,
        saga_id: SagaId,
        definition: &SagaDefinition,
        context: &mut SagaContext,
        listener: &dyn SagaOrchestratorListener,
        statuses: &mut [StepStatus],
        failed_index: usize,
    ) -> Rollback {
        let mut rollback = Rollback {
            compensated: 0,
            failures: Vec::new(),
        };

        for (index, step) in definition.steps()[..failed_index].iter().enumerate().rev() {
            if !statuses[index].needs_compensation() {
                continue;
            }
            listener.on_compensation_started(saga_id, step.name(), index);

            let Some(compensation) = step.compensation() else {
                tracing::info!(step = step.name(), "step has no compensation, left as completed");
                continue;
            };

            tracing::info!(step = step.name(), index, "compensating step");
            // Compensations are not bounded by the saga deadline.
            let outcome = self.run_attempts(definition, step, compensation, context, None).await;
            statuses[index] = StepStatus::Compensated;
            rollback.compensated += 1;

            if let Some(error) = outcome.error_message() {
                tracing::warn!(step = step.name(), %error, "compensation failed, continuing rollback");
                self.increment("saga_compensation_failures_total", definition.name());
                rollback.failures.push(CompensationFailure {
                    step_name: step.name().to_string(),
                    error: error.to_string(),
                });
            }
            listener.on_compensation_step_completed(saga_id, step.name(), &outcome);
        }

        rollback
    }

    /// Runs `handler` until it succeeds or the step's retry budget is spent.
    ///
    /// With a saga deadline, a retry that could not start before it is not
    /// attempted and the step ends as a timeout.
    async fn run_attempts(
        &self,
        definition: &SagaDefinition,
        step: &SagaStep,
        handler: &Arc<dyn StepHandler>,
        context: &mut SagaContext,
        deadline: Option<Instant>,
    ) -> SagaStepResult {
        let mut remaining = step.max_retries();
        let mut attempt: u32 = 1;

        loop {
            let outcome = self.attempt(step, handler, context, deadline).await;
            if outcome.is_success() || remaining == 0 {
                return outcome;
            }

            let next_attempt = Instant::now() + step.retry_delay();
            if deadline.is_some_and(|deadline| next_attempt >= deadline) {
                tracing::warn!(
                    step = step.name(),
                    attempt,
                    remaining,
                    error = outcome.error_message().unwrap_or_default(),
                    "saga deadline leaves no room for a retry"
                );
                if outcome.is_timeout() {
                    return outcome;
                }
                return SagaStepResult::timeout(format!(
                    "Saga deadline reached during step '{}'",
                    step.name()
                ));
            }

            tracing::warn!(
                step = step.name(),
                attempt,
                remaining,
                error = outcome.error_message().unwrap_or_default(),
                "step attempt failed, retrying"
            );
            if self.config.emit_metrics {
                metrics::counter!(
                    "saga_step_retries_total",
                    "saga" => definition.name().to_string(),
                    "step" => step.name().to_string()
                )
                .increment(1);
            }
            tokio::time::sleep(step.retry_delay()).await;
            remaining -= 1;
            attempt += 1;
        }
    }

    /// One attempt, raced against the step timeout or the saga deadline, whichever is sooner.
    ///
    /// On timeout the attempt future is dropped and its result, if any, is lost.
    async fn attempt(
        &self,
        step: &SagaStep,
        handler: &Arc<dyn StepHandler>,
        context: &mut SagaContext,
        deadline: Option<Instant>,
    ) -> SagaStepResult {
        let mut budget = step.timeout();
        let mut bounded_by_saga = false;
        if let Some(deadline) = deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            if left < budget {
                budget = left;
                bounded_by_saga = true;
            }
        }
        if budget.is_zero() {
            return SagaStepResult::timeout(format!(
                "Saga deadline reached before step '{}' could run",
                step.name()
            ));
        }

        let call = AssertUnwindSafe(handler.call(context)).catch_unwind();
        match tokio::time::timeout(budget, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let message = panic_message(&*panic);
                tracing::error!(step = step.name(), %message, "step panicked");
                SagaStepResult::failure(format!("Step '{}' panicked: {message}", step.name()))
            }
            Err(_) if bounded_by_saga => {
                tracing::warn!(step = step.name(), "saga deadline reached during step");
                SagaStepResult::timeout(format!(
                    "Saga deadline reached during step '{}'",
                    step.name()
                ))
            }
            Err(_) => {
                tracing::warn!(step = step.name(), timeout = ?budget, "step attempt timed out");
                SagaStepResult::timeout(format!(
                    "Step '{}' timed out after {budget:?}",
                    step.name()
                ))
            }
        }
    }

    fn finish(
        &self,
        saga_id: SagaId,
        definition: &SagaDefinition,
        listener: &dyn SagaOrchestratorListener,
        result: SagaOrchestratorResult,
        clock: std::time::Instant,
    ) -> SagaOrchestratorResult {
        let duration = clock.elapsed().as_secs_f64();
        if self.config.emit_metrics {
            metrics::histogram!(
                "saga_duration_seconds",
                "saga" => definition.name().to_string(),
                "status" => result.status().as_str()
            )
            .record(duration);
        }

        if result.is_successful() {
            self.increment("saga_completed_total", definition.name());
            tracing::info!(duration, "saga completed successfully");
        } else {
            let counter = if result.is_compensated() {
                "saga_compensated_total"
            } else if result.is_timed_out() {
                "saga_timed_out_total"
            } else {
                "saga_failed_total"
            };
            self.increment(counter, definition.name());
            tracing::warn!(
                status = %result.status(),
                failed_at = result.failed_at_step().unwrap_or_default(),
                reason = result.failure_reason().unwrap_or_default(),
                compensated = result.steps_compensated(),
                duration,
                "saga did not complete"
            );
        }

        listener.on_saga_completed(saga_id, &result);
        result
    }

    fn increment(&self, name: &'static str, label: &str) {
        if self.config.emit_metrics {
            metrics::counter!(name, "saga" => label.to_string()).increment(1);
        }
    }
}

fn step_statuses(definition: &SagaDefinition, statuses: &[StepStatus]) -> Vec<(String, StepStatus)> {
    definition
        .steps()
        .iter()
        .map(|step| step.name().to_string())
        .zip(statuses.iter().copied())
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingListener;
    use crate::state::SagaStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Handler that logs every call and replays scripted results; the last one repeats.
    struct Scripted {
        label: String,
        log: CallLog,
        results: Mutex<VecDeque<SagaStepResult>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(label: &str, log: &CallLog, results: Vec<SagaStepResult>) -> Self {
            Self {
                label: label.to_string(),
                log: log.clone(),
                results: Mutex::new(results.into()),
                delay: None,
            }
        }

        fn ok(label: &str, log: &CallLog) -> Self {
            Self::new(label, log, vec![SagaStepResult::success()])
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl StepHandler for Scripted {
        async fn call(&self, _: &mut SagaContext) -> SagaStepResult {
            self.log.lock().unwrap().push(self.label.clone());
            let result = {
                let mut results = self.results.lock().unwrap();
                if results.len() > 1 {
                    results.pop_front().unwrap()
                } else {
                    results.front().cloned().unwrap()
                }
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("ThreeSteps")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::ok("B", &log))
            .add()
            .unwrap()
            .step("C")
            .unwrap()
            .action_handler(Scripted::ok("C", &log))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let mut context = SagaContext::new();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut context)
            .await;

        assert_eq!(result.status(), SagaStatus::Completed);
        assert_eq!(result.steps_completed(), 3);
        assert_eq!(result.steps_compensated(), 0);
        assert!(result.failed_at_step().is_none());
        assert!(result.failure_reason().is_none());
        assert_eq!(calls(&log), ["A", "B", "C"]);
        assert_eq!(result.step_status("C"), Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn test_step_data_is_visible_to_later_steps() {
        let definition = SagaDefinition::builder()
            .name("DataFlow")
            .unwrap()
            .step("Reserve")
            .unwrap()
            .action(|_| {
                Box::pin(async { SagaStepResult::success_with([("reservation_id", "RES-1")]) })
            })
            .add()
            .unwrap()
            .step("Confirm")
            .unwrap()
            .action(|ctx| {
                Box::pin(async move {
                    match ctx.get("Reserve.reservation_id") {
                        Some(id) if id == "RES-1" => SagaStepResult::success(),
                        _ => SagaStepResult::failure("reservation missing"),
                    }
                })
            })
            .add()
            .unwrap()
            .build()
            .unwrap();

        let mut context = SagaContext::new();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut context)
            .await;

        assert!(result.is_successful());
        assert_eq!(context.get("Reserve.reservation_id"), Some(&json!("RES-1")));
    }

    #[tokio::test]
    async fn test_compensates_in_reverse_order() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Rollback")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::ok("undo A", &log))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::ok("B", &log))
            .compensation_handler(Scripted::ok("undo B", &log))
            .add()
            .unwrap()
            .step("C")
            .unwrap()
            .action_handler(Scripted::new(
                "C",
                &log,
                vec![SagaStepResult::failure("boom")],
            ))
            .compensation_handler(Scripted::ok("undo C", &log))
            .add()
            .unwrap()
            .step("D")
            .unwrap()
            .action_handler(Scripted::ok("D", &log))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let mut context = SagaContext::new();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut context)
            .await;

        assert_eq!(calls(&log), ["A", "B", "C", "undo B", "undo A"]);
        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(result.steps_completed(), 2);
        assert_eq!(result.steps_compensated(), 2);
        assert_eq!(result.failed_at_step(), Some("C"));
        assert_eq!(result.failure_reason(), Some("boom"));
        assert_eq!(result.step_status("A"), Some(StepStatus::Compensated));
        assert_eq!(result.step_status("C"), Some(StepStatus::Failed));
        assert_eq!(result.step_status("D"), Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_first_step_failure_is_failed_not_compensated() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("EarlyFailure")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::new(
                "A",
                &log,
                vec![SagaStepResult::failure("out of stock")],
            ))
            .compensation_handler(Scripted::ok("undo A", &log))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::ok("B", &log))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::Failed);
        assert_eq!(result.steps_completed(), 0);
        assert_eq!(result.steps_compensated(), 0);
        assert_eq!(result.failed_at_step(), Some("A"));
        assert_eq!(result.failure_reason(), Some("out of stock"));
        assert_eq!(calls(&log), ["A"]);
    }

    #[tokio::test]
    async fn test_step_without_compensation_is_left_completed() {
        let log = CallLog::default();
        let listener = RecordingListener::new();
        let definition = SagaDefinition::builder()
            .name("Irreversible")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::ok("undo A", &log))
            .add()
            .unwrap()
            .step("SendEmail")
            .unwrap()
            .action_handler(Scripted::ok("SendEmail", &log))
            .add()
            .unwrap()
            .step("C")
            .unwrap()
            .action_handler(Scripted::new("C", &log, vec![SagaStepResult::failure("no")]))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute_with_listener(
                SagaId::new(),
                &definition,
                &mut SagaContext::new(),
                &listener,
            )
            .await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(result.steps_completed(), 2);
        assert_eq!(result.steps_compensated(), 1);
        assert_eq!(result.step_status("SendEmail"), Some(StepStatus::Completed));
        assert_eq!(result.step_status("A"), Some(StepStatus::Compensated));
        assert_eq!(calls(&log), ["A", "SendEmail", "C", "undo A"]);
        assert_eq!(
            listener.steps_for("CompensationStarted"),
            ["SendEmail", "A"]
        );
        assert_eq!(listener.steps_for("CompensationStepCompleted"), ["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Flaky")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::new(
                "A",
                &log,
                vec![
                    SagaStepResult::failure("transient"),
                    SagaStepResult::failure("transient"),
                    SagaStepResult::success(),
                ],
            ))
            .compensation_handler(Scripted::ok("undo A", &log))
            .max_retries(2)
            .retry_delay(Duration::from_millis(200))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let start = Instant::now();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert!(result.is_successful());
        assert_eq!(calls(&log), ["A", "A", "A"]);
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert_eq!(result.step_status("A"), Some(StepStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_retries_reports_timed_out() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Slow")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::ok("undo A", &log))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::ok("B", &log).delayed(Duration::from_secs(10)))
            .timeout(Duration::from_millis(100))
            .unwrap()
            .max_retries(1)
            .retry_delay(Duration::from_millis(50))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::TimedOut);
        assert_eq!(result.failed_at_step(), Some("B"));
        assert_eq!(result.failure_reason(), Some("Saga timed out"));
        assert_eq!(result.steps_completed(), 1);
        assert_eq!(result.steps_compensated(), 1);
        assert_eq!(calls(&log), ["A", "B", "B", "undo A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saga_deadline_stops_retries() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Bounded")
            .unwrap()
            .saga_timeout(Duration::from_millis(250))
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log).delayed(Duration::from_secs(1)))
            .timeout(Duration::from_secs(5))
            .unwrap()
            .max_retries(5)
            .add()
            .unwrap()
            .build()
            .unwrap();

        let start = Instant::now();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert!(result.is_timed_out());
        assert_eq!(result.failed_at_step(), Some("A"));
        assert_eq!(calls(&log), ["A"]);
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_default_saga_timeout_applies() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Configured")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log).delayed(Duration::from_secs(1)))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let orchestrator = SagaOrchestrator::with_config(
            OrchestratorConfig::default().with_default_saga_timeout(Duration::from_millis(100)),
        );
        let result = orchestrator
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert!(result.is_timed_out());
    }

    #[tokio::test]
    async fn test_compensation_failure_does_not_stop_rollback() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("LeakyRollback")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::ok("undo A", &log))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::ok("B", &log))
            .compensation_handler(Scripted::new(
                "undo B",
                &log,
                vec![SagaStepResult::failure("refund rejected")],
            ))
            .add()
            .unwrap()
            .step("C")
            .unwrap()
            .action_handler(Scripted::new("C", &log, vec![SagaStepResult::failure("boom")]))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(result.steps_compensated(), 2);
        assert_eq!(calls(&log), ["A", "B", "C", "undo B", "undo A"]);
        assert_eq!(
            result.compensation_failures(),
            [CompensationFailure {
                step_name: "B".to_string(),
                error: "refund rejected".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_panicking_action_is_a_failure() {
        struct Explodes;

        #[async_trait]
        impl StepHandler for Explodes {
            async fn call(&self, _: &mut SagaContext) -> SagaStepResult {
                panic!("kaboom")
            }
        }

        let definition = SagaDefinition::builder()
            .name("Panics")
            .unwrap()
            .step("Explode")
            .unwrap()
            .action_handler(Explodes)
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert!(result.is_failed());
        assert!(result.failure_reason().unwrap().contains("kaboom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_past_saga_deadline_is_not_waited() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Impatient")
            .unwrap()
            .saga_timeout(Duration::from_millis(250))
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::new(
                "A",
                &log,
                vec![SagaStepResult::failure("transient")],
            ))
            .max_retries(3)
            .retry_delay(Duration::from_secs(10))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let start = Instant::now();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert!(result.is_timed_out());
        assert_eq!(result.failure_reason(), Some("Saga timed out"));
        assert_eq!(calls(&log), ["A"]);
        assert!(start.elapsed() <= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_at_saga_deadline_with_retries_left_is_timed_out() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("Deadline")
            .unwrap()
            .saga_timeout(Duration::from_millis(100))
            .unwrap()
            .step("P")
            .unwrap()
            .action_handler(Scripted::ok("P", &log))
            .compensation_handler(Scripted::ok("undo P", &log))
            .add()
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(
                Scripted::new("A", &log, vec![SagaStepResult::failure("flaky")])
                    .delayed(Duration::from_millis(100)),
            )
            .max_retries(3)
            .add()
            .unwrap()
            .build()
            .unwrap();

        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::TimedOut);
        assert_eq!(result.failed_at_step(), Some("A"));
        assert_eq!(result.steps_compensated(), 1);
        assert_eq!(calls(&log), ["P", "A", "undo P"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compensation_is_retried_with_step_policy() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("StubbornRollback")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::new(
                "undo A",
                &log,
                vec![
                    SagaStepResult::failure("locked"),
                    SagaStepResult::failure("locked"),
                    SagaStepResult::success(),
                ],
            ))
            .max_retries(2)
            .retry_delay(Duration::from_millis(50))
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::new("B", &log, vec![SagaStepResult::failure("boom")]))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let start = Instant::now();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(calls(&log), ["A", "B", "undo A", "undo A", "undo A"]);
        assert!(result.compensation_failures().is_empty());
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_compensation_is_cut_off_at_step_timeout() {
        let log = CallLog::default();
        let definition = SagaDefinition::builder()
            .name("SlowRollback")
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::ok("A", &log))
            .compensation_handler(Scripted::ok("undo A", &log).delayed(Duration::from_secs(5)))
            .timeout(Duration::from_millis(100))
            .unwrap()
            .add()
            .unwrap()
            .step("B")
            .unwrap()
            .action_handler(Scripted::new("B", &log, vec![SagaStepResult::failure("boom")]))
            .add()
            .unwrap()
            .build()
            .unwrap();

        let start = Instant::now();
        let result = SagaOrchestrator::new()
            .execute(SagaId::new(), &definition, &mut SagaContext::new())
            .await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(result.steps_compensated(), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        let failures = result.compensation_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step_name, "A");
        assert!(failures[0].error.contains("timed out"));
    }

    fn retried_once(name: &str) -> SagaDefinition {
        let log = CallLog::default();
        SagaDefinition::builder()
            .name(name)
            .unwrap()
            .step("A")
            .unwrap()
            .action_handler(Scripted::new(
                "A",
                &log,
                vec![SagaStepResult::failure("transient"), SagaStepResult::success()],
            ))
            .max_retries(1)
            .retry_delay(Duration::from_millis(10))
            .add()
            .unwrap()
            .build()
            .unwrap()
    }

    fn render_metrics(orchestrator: &SagaOrchestrator, definition: &SagaDefinition) -> String {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let result = metrics::with_local_recorder(&recorder, || {
            runtime.block_on(orchestrator.execute(
                SagaId::new(),
                definition,
                &mut SagaContext::new(),
            ))
        });
        assert!(result.is_successful());
        handle.render()
    }

    #[test]
    fn test_metrics_are_labelled_with_saga_name() {
        let rendered = render_metrics(&SagaOrchestrator::new(), &retried_once("Metered"));

        assert!(rendered.contains(r#"saga_executions_total{saga="Metered"} 1"#));
        assert!(rendered.contains(r#"saga_completed_total{saga="Metered"} 1"#));
        let retries = rendered
            .lines()
            .find(|line| line.starts_with("saga_step_retries_total{"))
            .unwrap();
        assert!(retries.contains(r#"saga="Metered""#));
        assert!(retries.contains(r#"step="A""#));
        assert!(retries.ends_with(" 1"));
    }

    #[test]
    fn test_disabled_metrics_emit_nothing() {
        let orchestrator =
            SagaOrchestrator::with_config(OrchestratorConfig::default().with_metrics(false));

        let rendered = render_metrics(&orchestrator, &retried_once("Silent"));

        assert!(!rendered.contains("saga_executions_total"));
        assert!(!rendered.contains("saga_step_retries_total"));
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
