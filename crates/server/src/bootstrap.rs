use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use outlay_core::config::{AppConfig, ConfigError, LoadOptions};
use outlay_core::currency::ConversionError;
use outlay_db::{connect, migrations, seed_demo_directory, DbPool, SqlDirectory, SqlWorkflowStore};

use crate::rates::HttpRateClient;
use crate::service::{ExpenseWorkflowService, TracingAuditSink};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ExpenseWorkflowService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("seed failed: {0}")]
    Seed(#[source] sqlx::Error),
    #[error("rate client initialization failed: {0}")]
    RateClient(#[from] ConversionError),
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

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let dataset = seed_demo_directory(&db_pool).await.map_err(BootstrapError::Seed)?;
    info!(
        event_name = "system.bootstrap.directory_seeded",
        correlation_id = "bootstrap",
        company_id = %dataset.company_id,
        "directory read model seeded"
    );

    let rate_client = HttpRateClient::from_config(&config.currency)?;

    let service = Arc::new(ExpenseWorkflowService::new(
        Arc::new(SqlWorkflowStore::new(db_pool.clone())),
        Arc::new(SqlDirectory::new(db_pool.clone())),
        Arc::new(rate_client),
        Arc::new(TracingAuditSink),
        config.workflow.policy(),
    ));

    Ok(Application { config, db_pool, service })
}
