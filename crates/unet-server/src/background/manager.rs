//! Owns the six scheduled sweeps (§4.1): acquires scheduler leadership, then
//! runs one tokio task per job, each polling its own persisted schedule and
//! firing the corresponding sweep when due. The time-series flush loop is
//! the odd one out — it doesn't go through `ScheduleStore` at all, since
//! draining a bounded in-memory buffer on a fixed tick needs no
//! restart-safe due-check (§4.5: a missed tick just means the next one
//! drains a deeper queue).

use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};
use unet_core::alerting::AlertEngine;
use unet_core::config::Config;
use unet_core::datastore::CurrentStateStore;
use unet_core::error::Error;
use unet_core::leader_election::LeaderLease;
use unet_core::metrics::MetricsManager;
use unet_core::ping::PingSampler;
use unet_core::scheduler::ScheduleStore;
use unet_core::secrets::CredentialVault;
use unet_core::snmp::SnmpPoller;
use unet_core::timeseries::TimeSeriesBuffer;

use super::{alert_task, ping_worker, retention_task, snmp_worker};
use crate::server::ChangeEvent;

/// How often each scheduled-job loop checks whether its persisted schedule
/// is due. Short enough that a period/hour boundary is never missed by more
/// than this much; the actual cadence is governed by `ScheduleStore`, not by
/// this tick.
const PERIODIC_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DAILY_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct BackgroundTasks {
    config: Config,
    db: DatabaseConnection,
    store: CurrentStateStore,
    metrics: MetricsManager,
    credential_vault: Arc<CredentialVault>,
    timeseries: Arc<TimeSeriesBuffer>,
    change_tx: broadcast::Sender<ChangeEvent>,
}

impl BackgroundTasks {
    #[must_use]
    pub const fn new(
        config: Config,
        db: DatabaseConnection,
        store: CurrentStateStore,
        metrics: MetricsManager,
        credential_vault: Arc<CredentialVault>,
        timeseries: Arc<TimeSeriesBuffer>,
        change_tx: broadcast::Sender<ChangeEvent>,
    ) -> Self {
        Self {
            config,
            db,
            store,
            metrics,
            credential_vault,
            timeseries,
            change_tx,
        }
    }

    /// Acquires scheduler leadership and spawns every sweep loop. Returns an
    /// error if leadership cannot be acquired (§6: fatal, non-zero exit) or
    /// if the ICMP client cannot be created.
    pub async fn start(&self) -> unet_core::Result<()> {
        let lease = LeaderLease::try_acquire(self.db.clone())
            .await?
            .ok_or_else(|| Error::internal("another process already owns scheduler leadership"))?;
        // The lease must outlive every spawned loop; parking it in a task
        // that never completes keeps the advisory lock held for the
        // process lifetime without threading it through each loop.
        tokio::spawn(async move {
            let _lease = lease;
            std::future::pending::<()>().await;
        });

        let schedule = ScheduleStore::new(self.db.clone());
        let sampler = Arc::new(
            PingSampler::new(self.config.polling.ping_count, self.config.ping_timeout())
                .map_err(|e| Error::internal(format!("failed to start ICMP sampler: {e}")))?,
        );
        let poller = Arc::new(SnmpPoller::new(
            self.config.polling.worker_concurrency_snmp,
            self.config.snmp_timeout(),
            self.config.polling.snmp_retries,
        ));
        let engine = Arc::new(AlertEngine::new(self.db.clone()));

        self.spawn_ping_loop(schedule.clone(), sampler);
        self.spawn_snmp_discovery_loop(schedule.clone(), poller.clone());
        self.spawn_snmp_metrics_loop(schedule.clone(), poller);
        self.spawn_alert_eval_loop(schedule.clone(), engine);
        self.spawn_retention_loop(schedule);
        self.spawn_timeseries_flush_loop();

        info!("background sweep scheduler started");
        Ok(())
    }

    fn spawn_ping_loop(&self, schedule: ScheduleStore, sampler: Arc<PingSampler>) {
        let store = self.store.clone();
        let timeseries = self.timeseries.clone();
        let metrics = self.metrics.clone();
        let change_tx = self.change_tx.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = interval(PERIODIC_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let period = Duration::from_secs(config.polling.ping_interval_secs);
                match schedule.try_fire_periodic("ping_sweep", period, Utc::now()).await {
                    Ok(true) => {
                        if let Err(e) = ping_worker::run_sweep(
                            &store,
                            &sampler,
                            &timeseries,
                            &metrics,
                            &change_tx,
                            &config.polling,
                        )
                        .await
                        {
                            error!(error = %e, "ping sweep failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to check ping_sweep schedule"),
                }
            }
        });
    }

    fn spawn_snmp_discovery_loop(&self, schedule: ScheduleStore, poller: Arc<SnmpPoller>) {
        let store = self.store.clone();
        let db = self.db.clone();
        let vault = self.credential_vault.clone();
        let metrics = self.metrics.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = interval(DAILY_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let hour = config.polling.interface_discovery_hour;
                match schedule.try_fire_daily("interface_discovery", hour, Utc::now()).await {
                    Ok(true) => {
                        if let Err(e) =
                            snmp_worker::run_discovery_sweep(&store, &db, &poller, &vault, &metrics, &config.polling)
                                .await
                        {
                            error!(error = %e, "SNMP discovery sweep failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to check interface_discovery schedule"),
                }
            }
        });
    }

    fn spawn_snmp_metrics_loop(&self, schedule: ScheduleStore, poller: Arc<SnmpPoller>) {
        let store = self.store.clone();
        let db = self.db.clone();
        let vault = self.credential_vault.clone();
        let timeseries = self.timeseries.clone();
        let metrics = self.metrics.clone();
        let change_tx = self.change_tx.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = interval(PERIODIC_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let period = Duration::from_secs(config.polling.interface_metrics_interval_secs);
                match schedule
                    .try_fire_periodic("interface_metrics_sweep", period, Utc::now())
                    .await
                {
                    Ok(true) => {
                        if let Err(e) = snmp_worker::run_metrics_sweep(
                            &store,
                            &db,
                            &poller,
                            &vault,
                            &timeseries,
                            &change_tx,
                            &metrics,
                            &config.polling,
                        )
                        .await
                        {
                            error!(error = %e, "interface metrics sweep failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to check interface_metrics_sweep schedule"),
                }
            }
        });
    }

    fn spawn_alert_eval_loop(&self, schedule: ScheduleStore, engine: Arc<AlertEngine>) {
        let store = self.store.clone();
        let db = self.db.clone();
        let metrics = self.metrics.clone();
        let change_tx = self.change_tx.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = interval(PERIODIC_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let period = Duration::from_secs(config.polling.alert_eval_interval_secs);
                match schedule.try_fire_periodic("alert_eval", period, Utc::now()).await {
                    Ok(true) => {
                        if let Err(e) =
                            alert_task::run_eval_sweep(&store, &db, &engine, &metrics, &change_tx).await
                        {
                            error!(error = %e, "alert evaluation sweep failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to check alert_eval schedule"),
                }
            }
        });
    }

    fn spawn_retention_loop(&self, schedule: ScheduleStore) {
        let store = self.store.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = interval(DAILY_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let hour = config.alerting.retention_cleanup_hour;
                match schedule.try_fire_daily("retention_cleanup", hour, Utc::now()).await {
                    Ok(true) => {
                        if let Err(e) =
                            retention_task::run_cleanup(&store, &config.polling, &config.alerting).await
                        {
                            error!(error = %e, "retention cleanup failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to check retention_cleanup schedule"),
                }
            }
        });
    }

    /// Drains one batch off the time-series buffer per tick (§4.2/§4.3/§4.5:
    /// the actual delivery half of every `timeseries.enqueue(...)` call in
    /// the ping/SNMP sweeps — without this loop samples only ever
    /// accumulate and are dropped once the buffer fills).
    fn spawn_timeseries_flush_loop(&self) {
        let timeseries = self.timeseries.clone();
        let metrics = self.metrics.clone();
        let interval_secs = self.config.polling.timeseries_flush_interval_secs;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                metrics.timeseries_buffer_depth.set(timeseries.depth() as f64);
                match timeseries.flush_one_batch().await {
                    Ok(outcome) => {
                        if outcome.dropped > 0 {
                            metrics
                                .timeseries_samples_dropped_total
                                .inc_by(outcome.dropped as f64);
                            warn!(dropped = outcome.dropped, "time-series samples dropped after buffer overflow");
                        }
                    }
                    Err(e) => error!(error = %e, "time-series flush failed"),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unet_core::secrets::MasterKey;
    use unet_core::timeseries::HttpTimeSeriesBackend;

    async fn memory_app() -> (BackgroundTasks, DatabaseConnection) {
        let db = test_support::fresh_entity_db().await;
        let store = CurrentStateStore::new(db.clone());
        let metrics = MetricsManager::new().unwrap();
        let vault = Arc::new(CredentialVault::new(MasterKey::generate()));
        let timeseries = Arc::new(TimeSeriesBuffer::new(
            Box::new(HttpTimeSeriesBackend::new(String::new())),
            100,
            10,
        ));
        let (change_tx, _) = broadcast::channel(16);
        let tasks = BackgroundTasks::new(
            Config::default(),
            db.clone(),
            store,
            metrics,
            vault,
            timeseries,
            change_tx,
        );
        (tasks, db)
    }

    #[tokio::test]
    async fn start_acquires_leadership_and_spawns_without_error() {
        let (tasks, _db) = memory_app().await;
        assert!(tasks.start().await.is_ok());
    }
}
