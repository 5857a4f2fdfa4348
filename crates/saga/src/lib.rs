//! Saga orchestration engine.
//!
//! A saga coordinates a multi-step workflow across services that cannot
//! share a transaction. This crate runs the steps of a [`SagaDefinition`]
//! in order, enforcing per-step timeouts and bounded retries. When a step
//! fails for good, every step completed before it is compensated in
//! reverse order.
//!
//! ```ignore
//! let definition = SagaDefinition::builder()
//!     .name("OrderFulfillment")?
//!     .step("ReserveStock")?
//!         .action(reserve_stock)
//!         .compensation(release_stock)
//!         .add()?
//!     .step("ProcessPayment")?
//!         .action(process_payment)
//!         .max_retries(2)
//!         .add()?
//!     .build()?;
//!
//! let result = SagaOrchestrator::new()
//!     .execute(SagaId::new(), &definition, &mut SagaContext::new())
//!     .await;
//! ```

pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod listener;
pub mod orchestrator;
pub mod result;
pub mod state;
pub mod step;
pub mod step_result;

pub use common::SagaId;
pub use config::OrchestratorConfig;
pub use context::SagaContext;
pub use definition::{DefinitionStepBuilder, SagaDefinition, SagaDefinitionBuilder};
pub use error::{Result, SagaError};
pub use events::{RecordingListener, SagaEvent};
pub use futures_util::future::BoxFuture;
pub use listener::{NoopListener, SagaOrchestratorListener};
pub use orchestrator::SagaOrchestrator;
pub use result::{CompensationFailure, SAGA_TIMED_OUT_REASON, SagaOrchestratorResult};
pub use state::{SagaStatus, StepStatus};
pub use step::{SagaStep, SagaStepBuilder, StepHandler};
pub use step_result::{SagaStepResult, StepResultStatus};
