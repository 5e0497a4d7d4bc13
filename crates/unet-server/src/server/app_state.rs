//! Application state and initialization

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use unet_core::{
    config::Config,
    datastore::CurrentStateStore,
    metrics::MetricsManager,
    secrets::{CredentialVault, MasterKey},
    timeseries::{HttpTimeSeriesBackend, TimeSeriesBuffer},
};

use crate::background::BackgroundTasks;

/// A state change pushed out over `/ws/updates`. Kept deliberately small —
/// subscribers re-fetch details from the read API rather than this carrying
/// a full device/problem payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    DeviceStateChanged {
        device_id: String,
        reachable: bool,
        is_flapping: bool,
        at: DateTime<Utc>,
    },
    InterfaceStatusChanged {
        device_id: String,
        if_index: i32,
        oper_status: String,
        at: DateTime<Utc>,
    },
    ProblemOpened {
        problem_id: String,
        device_id: String,
        rule_name: String,
        severity: String,
        at: DateTime<Utc>,
    },
    ProblemResolved {
        problem_id: String,
        device_id: String,
        at: DateTime<Utc>,
    },
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: CurrentStateStore,
    pub db: DatabaseConnection,
    pub config: Config,
    pub metrics: MetricsManager,
    pub credential_vault: Arc<CredentialVault>,
    pub timeseries: Arc<TimeSeriesBuffer>,
    pub change_tx: broadcast::Sender<ChangeEvent>,
}

/// Initialize application state: connect, migrate, wire the sweep scheduler.
pub async fn initialize_app_state(mut config: Config, database_url: String) -> Result<AppState> {
    config.database.url = database_url;

    let db_manager = unet_core::database::DatabaseManager::new(config.database.clone())
        .await
        .context("failed to connect to the monitoring database")?;
    let db = db_manager.get_connection().clone();

    info!("applying schema migrations");
    migration::Migrator::up(&db, None)
        .await
        .context("failed to apply database migrations")?;

    let store = CurrentStateStore::new(db.clone());
    let metrics = MetricsManager::new().context("failed to register metrics")?;

    let credential_vault = Arc::new(CredentialVault::new(match &config.credentials.credential_key {
        Some(encoded) => MasterKey::from_base64(encoded)?,
        None => {
            warn!(
                "CREDENTIAL_KEY not set: generating an ephemeral master key. \
                 Encrypted SNMP credentials will not survive a restart."
            );
            MasterKey::generate()
        }
    }));

    let backend = HttpTimeSeriesBackend::new(config.timeseries.url.clone().unwrap_or_default());
    let timeseries = Arc::new(TimeSeriesBuffer::new(Box::new(backend), 10_000, config.polling.batch_size));

    let (change_tx, _) = broadcast::channel(256);

    let app_state = AppState {
        store: store.clone(),
        db: db.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
        credential_vault: credential_vault.clone(),
        timeseries: timeseries.clone(),
        change_tx: change_tx.clone(),
    };

    let background_tasks = BackgroundTasks::new(
        config,
        db,
        store,
        metrics,
        credential_vault,
        timeseries,
        change_tx,
    );
    background_tasks.start().await?;

    Ok(app_state)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Builds an `AppState` against a fresh, unshared in-memory SQLite
    /// database, with no background sweeps started, for route-wiring and
    /// handler tests. Each call gets its own database so concurrently
    /// running tests that seed fixed ids (`"d1"`, ...) and assert exact row
    /// counts never collide with one another.
    pub async fn create_mock_app_state() -> AppState {
        let db = test_support::fresh_entity_db().await;
        let store = CurrentStateStore::new(db.clone());
        let metrics = MetricsManager::new().expect("static metric definitions never collide");
        let credential_vault = Arc::new(CredentialVault::new(MasterKey::generate()));
        let timeseries = Arc::new(TimeSeriesBuffer::new(
            Box::new(HttpTimeSeriesBackend::new(String::new())),
            100,
            10,
        ));
        let (change_tx, _) = broadcast::channel(16);

        AppState {
            store,
            db,
            config: Config::default(),
            metrics,
            credential_vault,
            timeseries,
            change_tx,
        }
    }
}
