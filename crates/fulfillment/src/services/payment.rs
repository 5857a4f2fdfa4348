//! Payment gateway: charges and refunds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FulfillmentError, Result};

/// Proof of a captured charge.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub payment_id: String,
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn charge(
        &self,
        order_id: &str,
        customer_id: &str,
        amount_cents: u64,
    ) -> Result<ChargeReceipt>;

    /// Refunds a captured charge in full.
    async fn refund(&self, payment_id: &str) -> Result<()>;
}

#[derive(Debug)]
struct ChargeRecord {
    order_id: String,
    amount_cents: u64,
    refunded: bool,
}

#[derive(Debug, Default)]
struct Gateway {
    charges: HashMap<String, ChargeRecord>,
    issued: u32,
    decline: bool,
    reject_refunds: bool,
    outages_left: u32,
    latency: Option<Duration>,
    charge_calls: usize,
    refund_calls: usize,
}

/// Gateway kept in process memory, with switches for declines, outages and latency.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    gateway: Arc<RwLock<Gateway>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every charge while set.
    pub fn set_decline_charges(&self, decline: bool) {
        self.gateway.write().unwrap().decline = decline;
    }

    pub fn set_reject_refunds(&self, reject: bool) {
        self.gateway.write().unwrap().reject_refunds = reject;
    }

    /// Makes the next `count` charges fail as if the gateway were down.
    pub fn set_outages(&self, count: u32) {
        self.gateway.write().unwrap().outages_left = count;
    }

    /// Delays every charge before it reaches the gateway.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.gateway.write().unwrap().latency = latency;
    }

    pub fn charge_calls(&self) -> usize {
        self.gateway.read().unwrap().charge_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.gateway.read().unwrap().refund_calls
    }

    /// Charges captured and not refunded.
    pub fn active_charges(&self) -> usize {
        self.gateway
            .read()
            .unwrap()
            .charges
            .values()
            .filter(|c| !c.refunded)
            .count()
    }

    pub fn captured_cents(&self) -> u64 {
        self.gateway
            .read()
            .unwrap()
            .charges
            .values()
            .filter(|c| !c.refunded)
            .map(|c| c.amount_cents)
            .sum()
    }

    /// Order a payment was taken for, if the gateway knows it.
    pub fn order_for(&self, payment_id: &str) -> Option<String> {
        self.gateway
            .read()
            .unwrap()
            .charges
            .get(payment_id)
            .map(|c| c.order_id.clone())
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        order_id: &str,
        customer_id: &str,
        amount_cents: u64,
    ) -> Result<ChargeReceipt> {
        let latency = {
            let mut gateway = self.gateway.write().unwrap();
            gateway.charge_calls += 1;
            gateway.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut gateway = self.gateway.write().unwrap();
        if gateway.decline {
            return Err(FulfillmentError::PaymentService(format!(
                "Card declined for customer {customer_id}"
            )));
        }
        if gateway.outages_left > 0 {
            gateway.outages_left -= 1;
            return Err(FulfillmentError::PaymentService(
                "Gateway unavailable".to_string(),
            ));
        }

        gateway.issued += 1;
        let payment_id = format!("pay-{:05}", gateway.issued);
        gateway.charges.insert(
            payment_id.clone(),
            ChargeRecord {
                order_id: order_id.to_string(),
                amount_cents,
                refunded: false,
            },
        );
        Ok(ChargeReceipt { payment_id })
    }

    async fn refund(&self, payment_id: &str) -> Result<()> {
        let mut gateway = self.gateway.write().unwrap();
        gateway.refund_calls += 1;
        if gateway.reject_refunds {
            return Err(FulfillmentError::PaymentService(
                "Refund rejected".to_string(),
            ));
        }
        match gateway.charges.get_mut(payment_id) {
            Some(record) => {
                record.refunded = true;
                Ok(())
            }
            None => Err(FulfillmentError::PaymentService(format!(
                "Unknown payment {payment_id}"
            ))),
        }
    }
}
