//! Immutable step definitions and their builder.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::step_result::SagaStepResult;

/// Default time one attempt may take before it counts as a timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after a failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default wait between two attempts of the same step.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Something a step can run: its forward action or its compensation.
///
/// Implementations are opaque to the orchestrator. They may call remote
/// services, publish messages or only touch the context. An attempt that
/// outlives the step timeout is dropped, so implementations must be safe
/// to abandon.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> StepHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, SagaStepResult> + Send + Sync,
{
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        (self.0)(context).await
    }
}

/// One unit of work in a saga.
///
/// Steps are built once, when the owning definition is built, and are
/// shared read-only by every execution of that definition. Equality and
/// hashing only look at the name.
#[derive(Clone)]
pub struct SagaStep {
    name: String,
    action: Arc<dyn StepHandler>,
    compensation: Option<Arc<dyn StepHandler>>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl SagaStep {
    /// Starts building a step. Fails if `name` is blank.
    pub fn builder(name: impl Into<String>) -> Result<SagaStepBuilder> {
        SagaStepBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Arc<dyn StepHandler> {
        &self.action
    }

    pub fn compensation(&self) -> Option<&Arc<dyn StepHandler>> {
        self.compensation.as_ref()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl PartialEq for SagaStep {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SagaStep {}

impl Hash for SagaStep {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("has_compensation", &self.has_compensation())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

/// Builder for [`SagaStep`].
///
/// Invalid values are rejected by the setter that receives them; `build`
/// only checks that an action was supplied.
pub struct SagaStepBuilder {
    name: String,
    action: Option<Arc<dyn StepHandler>>,
    compensation: Option<Arc<dyn StepHandler>>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl SagaStepBuilder {
    fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SagaError::BlankStepName);
        }
        Ok(Self {
            name,
            action: None,
            compensation: None,
            timeout: DEFAULT_STEP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Sets the forward action from a closure.
    ///
    /// ```ignore
    /// builder.action(|ctx| Box::pin(async move {
    ///     ctx.insert("reserved", true);
    ///     SagaStepResult::success()
    /// }))
    /// ```
    pub fn action<F>(self, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, SagaStepResult>
            + Send
            + Sync
            + 'static,
    {
        self.action_handler(FnHandler(action))
    }

    /// Sets the forward action from a [`StepHandler`] implementation.
    pub fn action_handler(mut self, handler: impl StepHandler + 'static) -> Self {
        self.action = Some(Arc::new(handler));
        self
    }

    /// Sets the compensation from a closure.
    pub fn compensation<F>(self, compensation: F) -> Self
    where
        F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, SagaStepResult>
            + Send
            + Sync
            + 'static,
    {
        self.compensation_handler(FnHandler(compensation))
    }

    /// Sets the compensation from a [`StepHandler`] implementation.
    pub fn compensation_handler(mut self, handler: impl StepHandler + 'static) -> Self {
        self.compensation = Some(Arc::new(handler));
        self
    }

    /// Marks the step as irreversible, clearing any compensation set earlier.
    pub fn no_compensation(mut self) -> Self {
        self.compensation = None;
        self
    }

    /// Sets the per-attempt timeout. Zero is rejected.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(SagaError::InvalidStepTimeout(timeout));
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn build(self) -> Result<SagaStep> {
        let action = self
            .action
            .ok_or_else(|| SagaError::MissingAction(self.name.clone()))?;
        Ok(SagaStep {
            name: self.name,
            action,
            compensation: self.compensation,
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        })
    }
}
