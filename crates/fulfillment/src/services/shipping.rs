//! Carrier dispatch service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{FulfillmentError, Result};

/// A shipment booked with the carrier.
#[derive(Debug, Clone)]
pub struct Shipment {
    pub tracking_number: String,
}

#[async_trait]
pub trait ShippingService: Send + Sync {
    async fn create_shipment(&self, order_id: &str) -> Result<Shipment>;

    /// Withdraws a booked shipment before pickup.
    async fn cancel_shipment(&self, tracking_number: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct Dispatch {
    open: HashMap<String, String>,
    cancelled: Vec<String>,
    issued: u32,
    carrier_down: bool,
}

/// Carrier bookings kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    dispatch: Arc<RwLock<Dispatch>>,
}

impl InMemoryShippingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_carrier_available(&self, available: bool) {
        self.dispatch.write().unwrap().carrier_down = !available;
    }

    pub fn open_shipments(&self) -> usize {
        self.dispatch.read().unwrap().open.len()
    }

    /// Tracking numbers withdrawn so far, oldest first.
    pub fn cancelled(&self) -> Vec<String> {
        self.dispatch.read().unwrap().cancelled.clone()
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn create_shipment(&self, order_id: &str) -> Result<Shipment> {
        let mut dispatch = self.dispatch.write().unwrap();
        if dispatch.carrier_down {
            return Err(FulfillmentError::ShippingService(format!(
                "No carrier available for order {order_id}"
            )));
        }

        dispatch.issued += 1;
        let tracking_number = format!("TRK{:08}", dispatch.issued);
        dispatch
            .open
            .insert(tracking_number.clone(), order_id.to_string());
        Ok(Shipment { tracking_number })
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> Result<()> {
        let mut dispatch = self.dispatch.write().unwrap();
        if dispatch.open.remove(tracking_number).is_some() {
            dispatch.cancelled.push(tracking_number.to_string());
        }
        Ok(())
    }
}
