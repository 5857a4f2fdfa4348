//! Order fulfillment demo entry point.
//!
//! Runs the fulfillment saga against in-memory services for a happy path and
//! a few failure scenarios, printing each result as JSON and the collected
//! metrics in Prometheus text format.

use fulfillment::order_fulfillment::{self, FulfillmentPolicy, FulfillmentServices, OrderRequest};
use fulfillment::services::{
    InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService, ReservationItem,
};
use saga::{OrchestratorConfig, SagaDefinition, SagaId, SagaOrchestrator};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

fn sample_order(amount_cents: u64) -> OrderRequest {
    OrderRequest {
        order_id: Uuid::new_v4().to_string(),
        customer_id: "customer-42".to_string(),
        items: vec![
            ReservationItem {
                sku: "SKU-001".to_string(),
                product_name: "Mechanical Keyboard".to_string(),
                quantity: 1,
            },
            ReservationItem {
                sku: "SKU-002".to_string(),
                product_name: "USB-C Cable".to_string(),
                quantity: 2,
            },
        ],
        amount_cents,
    }
}

async fn run(
    scenario: &str,
    orchestrator: &SagaOrchestrator,
    definition: &SagaDefinition,
    order: OrderRequest,
) {
    let mut context = order.into_context().expect("failed to build saga context");
    let result = orchestrator
        .execute(SagaId::new(), definition, &mut context)
        .await;

    tracing::info!(scenario, status = %result.status(), "scenario finished");
    println!(
        "{}",
        serde_json::to_string_pretty(&result).expect("failed to serialize result")
    );
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire services and the saga definition
    let inventory = InMemoryInventoryService::new();
    inventory.set_stock("SKU-001", 10);
    inventory.set_stock("SKU-002", 20);
    let payment = InMemoryPaymentService::new();
    let shipping = InMemoryShippingService::new();
    let services = FulfillmentServices::new(inventory.clone(), payment.clone(), shipping.clone());
    let definition = order_fulfillment::definition(&services, &FulfillmentPolicy::default())
        .expect("invalid fulfillment saga definition");

    let orchestrator = SagaOrchestrator::with_config(OrchestratorConfig::from_env());
    tracing::info!(saga = %definition, "fulfillment saga ready");

    // 4. Run scenarios
    run("happy_path", &orchestrator, &definition, sample_order(12_999)).await;

    payment.set_outages(1);
    run("payment_retried", &orchestrator, &definition, sample_order(4_500)).await;

    payment.set_decline_charges(true);
    run("payment_declined", &orchestrator, &definition, sample_order(9_900)).await;
    payment.set_decline_charges(false);

    shipping.set_carrier_available(false);
    run("shipping_failed", &orchestrator, &definition, sample_order(3_000)).await;
    shipping.set_carrier_available(true);

    tracing::info!(
        held_reservations = inventory.held_count(),
        captured_cents = payment.captured_cents(),
        open_shipments = shipping.open_shipments(),
        "all scenarios finished"
    );
    println!("{}", metrics_handle.render());
}
