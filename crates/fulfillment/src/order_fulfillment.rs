//! The order fulfillment saga.
//!
//! Reserves inventory, charges the customer, then creates a shipment. If
//! payment or shipping fails, the orchestrator refunds and releases what
//! the earlier steps acquired, reading their identifiers back out of the
//! saga context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saga::{SagaContext, SagaDefinition, SagaStepResult, StepHandler};
use serde::{Deserialize, Serialize};

use crate::error::{FulfillmentError, Result};
use crate::services::{InventoryService, PaymentService, ReservationItem, ShippingService};

pub const SAGA_NAME: &str = "OrderFulfillment";

pub const STEP_RESERVE_INVENTORY: &str = "ReserveInventory";
pub const STEP_PROCESS_PAYMENT: &str = "ProcessPayment";
pub const STEP_CREATE_SHIPMENT: &str = "CreateShipment";

/// Context key holding the serialized [`OrderRequest`].
pub const ORDER_KEY: &str = "order";

pub const RESERVATION_ID: &str = "reservation_id";
pub const PAYMENT_ID: &str = "payment_id";
pub const TRACKING_NUMBER: &str = "tracking_number";

/// The order a fulfillment saga works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<ReservationItem>,
    pub amount_cents: u64,
}

impl OrderRequest {
    /// Builds the initial saga context for this order.
    pub fn into_context(self) -> Result<SagaContext> {
        let mut context = SagaContext::new();
        context.insert_serialized(ORDER_KEY, &self)?;
        Ok(context)
    }

    pub fn from_context(context: &SagaContext) -> Result<Self> {
        context
            .get_as(ORDER_KEY)?
            .ok_or_else(|| FulfillmentError::MissingContext(ORDER_KEY.to_string()))
    }
}

/// The services the fulfillment steps call.
#[derive(Clone)]
pub struct FulfillmentServices {
    pub inventory: Arc<dyn InventoryService>,
    pub payment: Arc<dyn PaymentService>,
    pub shipping: Arc<dyn ShippingService>,
}

impl FulfillmentServices {
    pub fn new(
        inventory: impl InventoryService + 'static,
        payment: impl PaymentService + 'static,
        shipping: impl ShippingService + 'static,
    ) -> Self {
        Self {
            inventory: Arc::new(inventory),
            payment: Arc::new(payment),
            shipping: Arc::new(shipping),
        }
    }
}

/// Per-step policy for the fulfillment saga.
#[derive(Debug, Clone)]
pub struct FulfillmentPolicy {
    pub saga_timeout: Duration,
    pub step_timeout: Duration,
    pub payment_retries: u32,
    pub payment_retry_delay: Duration,
}

impl Default for FulfillmentPolicy {
    fn default() -> Self {
        Self {
            saga_timeout: Duration::from_secs(60),
            step_timeout: Duration::from_secs(10),
            payment_retries: 2,
            payment_retry_delay: Duration::from_millis(200),
        }
    }
}

/// Builds the order fulfillment saga definition over `services`.
pub fn definition(
    services: &FulfillmentServices,
    policy: &FulfillmentPolicy,
) -> Result<SagaDefinition> {
    let definition = SagaDefinition::builder()
        .name(SAGA_NAME)?
        .saga_timeout(policy.saga_timeout)?
        .step(STEP_RESERVE_INVENTORY)?
        .action_handler(ReserveInventory(services.inventory.clone()))
        .compensation_handler(ReleaseInventory(services.inventory.clone()))
        .timeout(policy.step_timeout)?
        .add()?
        .step(STEP_PROCESS_PAYMENT)?
        .action_handler(ChargePayment(services.payment.clone()))
        .compensation_handler(RefundPayment(services.payment.clone()))
        .timeout(policy.step_timeout)?
        .max_retries(policy.payment_retries)
        .retry_delay(policy.payment_retry_delay)
        .add()?
        .step(STEP_CREATE_SHIPMENT)?
        .action_handler(CreateShipment(services.shipping.clone()))
        .compensation_handler(CancelShipment(services.shipping.clone()))
        .timeout(policy.step_timeout)?
        .add()?
        .build()?;
    Ok(definition)
}

fn step_value(context: &SagaContext, step: &str, key: &str) -> Result<String> {
    let key = SagaContext::step_key(step, key);
    context
        .get_as(&key)?
        .ok_or(FulfillmentError::MissingContext(key))
}

fn into_step_result<T>(
    result: Result<T>,
    on_success: impl FnOnce(T) -> SagaStepResult,
) -> SagaStepResult {
    match result {
        Ok(value) => on_success(value),
        Err(e) => SagaStepResult::failure(e.to_string()),
    }
}

struct ReserveInventory(Arc<dyn InventoryService>);

#[async_trait]
impl StepHandler for ReserveInventory {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let order = OrderRequest::from_context(context)?;
            self.0.reserve(&order.order_id, &order.items).await
        }
        .await;
        into_step_result(result, |r| {
            SagaStepResult::success_with([(RESERVATION_ID, r.reservation_id)])
        })
    }
}

struct ReleaseInventory(Arc<dyn InventoryService>);

#[async_trait]
impl StepHandler for ReleaseInventory {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let reservation_id = step_value(context, STEP_RESERVE_INVENTORY, RESERVATION_ID)?;
            self.0.release(&reservation_id).await
        }
        .await;
        into_step_result(result, |()| SagaStepResult::success())
    }
}

struct ChargePayment(Arc<dyn PaymentService>);

#[async_trait]
impl StepHandler for ChargePayment {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let order = OrderRequest::from_context(context)?;
            self.0
                .charge(&order.order_id, &order.customer_id, order.amount_cents)
                .await
        }
        .await;
        into_step_result(result, |r| {
            SagaStepResult::success_with([(PAYMENT_ID, r.payment_id)])
        })
    }
}

struct RefundPayment(Arc<dyn PaymentService>);

#[async_trait]
impl StepHandler for RefundPayment {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let payment_id = step_value(context, STEP_PROCESS_PAYMENT, PAYMENT_ID)?;
            self.0.refund(&payment_id).await
        }
        .await;
        into_step_result(result, |()| SagaStepResult::success())
    }
}

struct CreateShipment(Arc<dyn ShippingService>);

#[async_trait]
impl StepHandler for CreateShipment {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let order = OrderRequest::from_context(context)?;
            self.0.create_shipment(&order.order_id).await
        }
        .await;
        into_step_result(result, |r| {
            SagaStepResult::success_with([(TRACKING_NUMBER, r.tracking_number)])
        })
    }
}

struct CancelShipment(Arc<dyn ShippingService>);

#[async_trait]
impl StepHandler for CancelShipment {
    async fn call(&self, context: &mut SagaContext) -> SagaStepResult {
        let result = async {
            let tracking_number = step_value(context, STEP_CREATE_SHIPMENT, TRACKING_NUMBER)?;
            self.0.cancel_shipment(&tracking_number).await
        }
        .await;
        into_step_result(result, |()| SagaStepResult::success())
    }
}
