pub mod api;
pub mod appointments;
pub mod audit;
pub mod billing;
pub mod compliance;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod error;
pub mod hr;
pub mod lab;
pub mod models;
pub mod patients;
pub mod pharmacy;
pub mod radiology;
pub mod rbac;
pub mod staff;
pub mod telemedicine;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::audit::Actor;
use crate::config::{AppConfig, ConfigError};
use crate::core_state::{CoreError, CoreState};
use crate::error::DomainError;
use crate::staff::BootstrapOutcome;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("Cannot bind API server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Load config, prepare the database, serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let core = Arc::new(CoreState::new(config.clone())?);
    prepare_store(&core, &config)?;

    let mut server = api::start_api_server(core, config.bind_addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

/// First-run admin account and audit retention.
fn prepare_store(core: &CoreState, config: &AppConfig) -> Result<(), StartupError> {
    let mut conn = core.open_db()?;

    match staff::bootstrap_admin(&mut conn, config.bootstrap_admin_password.as_deref())? {
        BootstrapOutcome::AlreadyProvisioned => {}
        BootstrapOutcome::Created => {
            tracing::info!(username = staff::BOOTSTRAP_USERNAME, "Bootstrap admin account created");
        }
        BootstrapOutcome::CreatedWithGeneratedPassword(password) => {
            tracing::warn!(
                username = staff::BOOTSTRAP_USERNAME,
                password = %password,
                "Bootstrap admin created with a generated password, change it after first login"
            );
        }
    }

    if let Err(e) = compliance::prune(&mut conn, &Actor::system(), config.audit_retention_days) {
        tracing::warn!(retention_days = config.audit_retention_days, "Audit retention skipped: {e}");
    }
    Ok(())
}
