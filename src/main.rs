//! Entitlements service binary.
//!
//! Loads configuration, connects to PostgreSQL, and runs the reconciliation
//! scheduler until interrupted. Request surfaces embed [`EntitlementService`]
//! through the library.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use entitlements::adapters::{
    PostgresEntitlementReader, PostgresEntitlementRepository, PostgresNotifier,
    PostgresWebhookEventRepository, StripeConfig, StripeGateway,
};
use entitlements::application::{EntitlementService, ReconciliationScheduler, ServiceDependencies};
use entitlements::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry().with(config.logging.env_filter()?);
    if config.logging.json {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;
    tracing::info!("Connected to database");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let gateway = StripeGateway::new(StripeConfig::from_payment_config(&config.payment))
        .map_err(|e| format!("payment gateway: {}", e))?;

    let service = Arc::new(EntitlementService::new(
        ServiceDependencies {
            repository: Arc::new(PostgresEntitlementRepository::new(pool.clone())),
            reader: Arc::new(PostgresEntitlementReader::new(pool.clone())),
            webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
            gateway: Arc::new(gateway),
            notifier: Arc::new(PostgresNotifier::new(pool.clone())),
        },
        &config.trial,
        config.payment.gateway_timeout(),
    ));

    let scheduler = if config.scheduler.enabled {
        Some(ReconciliationScheduler::new(service.clone(), config.scheduler.clone()).start())
    } else {
        tracing::info!("Reconciliation scheduler disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    pool.close().await;
    Ok(())
}
