//! Fulfillment error types.

use saga::SagaError;
use thiserror::Error;

/// Errors raised by fulfillment services and step handlers.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Inventory service error.
    #[error("Inventory service error: {0}")]
    InventoryService(String),

    /// Payment service error.
    #[error("Payment service error: {0}")]
    PaymentService(String),

    /// Shipping service error.
    #[error("Shipping service error: {0}")]
    ShippingService(String),

    /// A value an earlier step should have stored is missing from the context.
    #[error("Missing context value: {0}")]
    MissingContext(String),

    /// Saga construction or context access error.
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
