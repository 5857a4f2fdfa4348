//! Stock-tracking inventory service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FulfillmentError, Result};

/// Handle for stock held against an order.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub reservation_id: String,
}

/// One order line to hold stock for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub sku: String,
    pub product_name: String,
    pub quantity: u32,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Holds stock for every line of the order, or none of it.
    async fn reserve(&self, order_id: &str, items: &[ReservationItem]) -> Result<Reservation>;

    /// Puts held stock back on the shelf. Unknown ids are ignored, so the
    /// call is safe to repeat.
    async fn release(&self, reservation_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct StockBook {
    /// Units on hand per SKU. SKUs not listed are not stock-limited.
    on_hand: HashMap<String, u32>,
    held: HashMap<String, (String, Vec<ReservationItem>)>,
    issued: u32,
    releases: usize,
}

/// Inventory kept in process memory. Clones share the same stock book.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    book: Arc<RwLock<StockBook>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits `sku` to `units` on hand.
    pub fn set_stock(&self, sku: &str, units: u32) {
        self.book.write().unwrap().on_hand.insert(sku.to_string(), units);
    }

    pub fn on_hand(&self, sku: &str) -> Option<u32> {
        self.book.read().unwrap().on_hand.get(sku).copied()
    }

    /// Reservations currently holding stock.
    pub fn held_count(&self) -> usize {
        self.book.read().unwrap().held.len()
    }

    pub fn is_held(&self, reservation_id: &str) -> bool {
        self.book.read().unwrap().held.contains_key(reservation_id)
    }

    pub fn release_calls(&self) -> usize {
        self.book.read().unwrap().releases
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(&self, order_id: &str, items: &[ReservationItem]) -> Result<Reservation> {
        let mut book = self.book.write().unwrap();

        let mut requested: HashMap<&str, u32> = HashMap::new();
        for item in items {
            *requested.entry(item.sku.as_str()).or_default() += item.quantity;
        }
        for (sku, wanted) in &requested {
            if let Some(&units) = book.on_hand.get(*sku) {
                if units < *wanted {
                    return Err(FulfillmentError::InventoryService(format!(
                        "Insufficient stock for {sku}: {wanted} requested, {units} on hand"
                    )));
                }
            }
        }
        for (sku, wanted) in requested {
            if let Some(units) = book.on_hand.get_mut(sku) {
                *units -= wanted;
            }
        }

        book.issued += 1;
        let reservation_id = format!("rsv-{:05}", book.issued);
        book.held.insert(
            reservation_id.clone(),
            (order_id.to_string(), items.to_vec()),
        );
        Ok(Reservation { reservation_id })
    }

    async fn release(&self, reservation_id: &str) -> Result<()> {
        let mut book = self.book.write().unwrap();
        book.releases += 1;
        if let Some((_, items)) = book.held.remove(reservation_id) {
            for item in items {
                if let Some(units) = book.on_hand.get_mut(&item.sku) {
                    *units += item.quantity;
                }
            }
        }
        Ok(())
    }
}
