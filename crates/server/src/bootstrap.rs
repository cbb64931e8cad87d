use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tably_agent::checkout::{CheckoutOrchestrator, CheckoutUrls};
use tably_agent::payments::{NoopPaymentGateway, PaymentGateway};
use tably_agent::planner::{NoopPlanner, PlannerEnrichment};
use tably_agent::runtime::AgentRuntime;
use tably_agent::LexicalExtractor;
use tably_core::config::{AppConfig, ConfigError, LoadOptions, PaymentProvider};
use tably_core::prefs::Vocabulary;
use tably_db::repositories::{
    CartStore, SqlCartStore, SqlCatalogRepository, SqlEventLogRepository, SqlOrderRepository,
};
use tably_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub carts: Arc<dyn CartStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let catalog = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let carts: Arc<dyn CartStore> = Arc::new(SqlCartStore::new(db_pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let events = Arc::new(SqlEventLogRepository::new(db_pool.clone()));

    let gateway: Arc<dyn PaymentGateway> = match config.payments.provider {
        PaymentProvider::Noop => Arc::new(NoopPaymentGateway::default()),
    };
    info!(
        event_name = "system.bootstrap.payment_gateway",
        correlation_id = "bootstrap",
        provider = ?config.payments.provider,
        "payment gateway initialized"
    );

    let checkout = CheckoutOrchestrator::new(
        catalog.clone(),
        carts.clone(),
        orders,
        events.clone(),
        gateway,
        CheckoutUrls {
            success_url: config.payments.success_url.clone(),
            cancel_url: config.payments.cancel_url.clone(),
        },
    );

    let mut runtime = AgentRuntime::new(
        LexicalExtractor::default(),
        catalog,
        carts.clone(),
        events,
        checkout,
    );
    if config.planner.enabled {
        // No model client is wired yet; the enrichment plans nothing and the
        // deterministic extractor carries every message.
        runtime = runtime.with_planner(PlannerEnrichment::new(
            Arc::new(NoopPlanner),
            Vocabulary::builtin(),
            Duration::from_secs(config.planner.timeout_secs),
        ));
        info!(
            event_name = "system.bootstrap.planner_enabled",
            correlation_id = "bootstrap",
            model = %config.planner.model,
            "planner enrichment enabled"
        );
    }

    Ok(Application { config, db_pool, runtime: Arc::new(runtime), carts })
}

#[cfg(test)]
mod tests {
    use tably_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_runtime() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap succeeds with in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('menu_item', 'cart', 'customer_order', 'event_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4, "bootstrap must expose the core tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_an_invalid_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite:///nonexistent-dir/nope/tably.db".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;
        assert!(result.is_err());
    }
}
