//! Ordered, reusable saga definitions.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::step::{SagaStep, SagaStepBuilder, StepHandler};
use crate::step_result::SagaStepResult;

/// A named, ordered list of steps.
///
/// Step order is both execution order and, reversed, compensation order.
/// A definition carries no execution state, so one instance can be shared
/// by any number of concurrent executions.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<SagaStep>,
    saga_timeout: Option<Duration>,
}

impl SagaDefinition {
    pub fn builder() -> SagaDefinitionBuilder {
        SagaDefinitionBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&SagaStep> {
        self.steps.get(index)
    }

    pub fn step_by_name(&self, name: &str) -> Option<&SagaStep> {
        self.steps.iter().find(|step| step.name() == name)
    }

    /// Upper bound on the whole forward phase, if one was configured.
    pub fn saga_timeout(&self) -> Option<Duration> {
        self.saga_timeout
    }

    /// Sum of all step timeouts, ignoring retries.
    pub fn total_step_timeout(&self) -> Duration {
        self.steps.iter().map(SagaStep::timeout).sum()
    }
}

impl fmt::Display for SagaDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (steps={})", self.name, self.steps.len())
    }
}

/// Builder for [`SagaDefinition`].
///
/// ```ignore
/// let definition = SagaDefinition::builder()
///     .name("OrderFulfillment")?
///     .step("ReserveStock")?
///         .action(reserve)
///         .compensation(release)
///         .add()?
///     .step("ProcessPayment")?
///         .action(charge)
///         .add()?
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct SagaDefinitionBuilder {
    name: Option<String>,
    steps: Vec<SagaStep>,
    saga_timeout: Option<Duration>,
}

impl SagaDefinitionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SagaError::BlankSagaName);
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Bounds the forward phase of every execution. Zero is rejected.
    pub fn saga_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(SagaError::InvalidSagaTimeout(timeout));
        }
        self.saga_timeout = Some(timeout);
        Ok(self)
    }

    /// Starts a step scoped to this definition; finish it with [`DefinitionStepBuilder::add`].
    pub fn step(self, name: impl Into<String>) -> Result<DefinitionStepBuilder> {
        Ok(DefinitionStepBuilder {
            parent: self,
            step: SagaStep::builder(name)?,
        })
    }

    /// Appends an already built step.
    pub fn add_step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<SagaDefinition> {
        let name = self.name.ok_or(SagaError::MissingSagaName)?;
        if self.steps.is_empty() {
            return Err(SagaError::EmptyDefinition(name));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(SagaError::DuplicateStepName {
                    saga: name,
                    step: step.name().to_string(),
                });
            }
        }

        Ok(SagaDefinition {
            name,
            steps: self.steps,
            saga_timeout: self.saga_timeout,
        })
    }
}

/// Step builder nested inside a [`SagaDefinitionBuilder`].
pub struct DefinitionStepBuilder {
    parent: SagaDefinitionBuilder,
    step: SagaStepBuilder,
}

impl DefinitionStepBuilder {
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, SagaStepResult>
            + Send
            + Sync
            + 'static,
    {
        self.step = self.step.action(action);
        self
    }

    pub fn action_handler(mut self, handler: impl StepHandler + 'static) -> Self {
        self.step = self.step.action_handler(handler);
        self
    }

    pub fn compensation<F>(mut self, compensation: F) -> Self
    where
        F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, SagaStepResult>
            + Send
            + Sync
            + 'static,
    {
        self.step = self.step.compensation(compensation);
        self
    }

    pub fn compensation_handler(mut self, handler: impl StepHandler + 'static) -> Self {
        self.step = self.step.compensation_handler(handler);
        self
    }

    pub fn no_compensation(mut self) -> Self {
        self.step = self.step.no_compensation();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        self.step = self.step.timeout(timeout)?;
        Ok(self)
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.step = self.step.max_retries(max_retries);
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.step = self.step.retry_delay(retry_delay);
        self
    }

    /// Builds the step and returns to the definition builder.
    pub fn add(self) -> Result<SagaDefinitionBuilder> {
        let step = self.step.build()?;
        Ok(self.parent.add_step(step))
    }
}
