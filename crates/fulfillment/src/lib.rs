//! Order fulfillment on top of the saga orchestrator.
//!
//! Provides in-memory inventory, payment and shipping services and the
//! `OrderFulfillment` saga definition that drives them.

pub mod error;
pub mod order_fulfillment;
pub mod services;

pub use error::{FulfillmentError, Result};
pub use order_fulfillment::{FulfillmentPolicy, FulfillmentServices, OrderRequest};
