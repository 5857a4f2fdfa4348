//! Services the fulfillment steps call, with in-memory implementations.

pub mod inventory;
pub mod payment;
pub mod shipping;

pub use inventory::{InMemoryInventoryService, InventoryService, Reservation, ReservationItem};
pub use payment::{ChargeReceipt, InMemoryPaymentService, PaymentService};
pub use shipping::{InMemoryShippingService, Shipment, ShippingService};
