//! SNMP discovery and interface-metrics sweeps (§4.3). Owns all writes to
//! `device_interface.oper_status`/counters; the ping worker never touches
//! this table.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use unet_core::config::PollingConfig;
use unet_core::datastore::{CurrentStateStore, InterfaceCounters};
use unet_core::entities::{device_credentials, devices};
use unet_core::metrics::MetricsManager;
use unet_core::secrets::{CredentialVault, EncryptedSecret};
use unet_core::snmp::{self, SnmpCredential, SnmpPoller};
use unet_core::timeseries::{Sample, TimeSeriesBuffer};

use crate::server::ChangeEvent;

async fn load_credential(
    db: &DatabaseConnection,
    vault: &CredentialVault,
    device_id: &str,
) -> Option<SnmpCredential> {
    let row = device_credentials::Entity::find()
        .filter(device_credentials::Column::DeviceId.eq(device_id))
        .one(db)
        .await
        .ok()??;
    let secret = EncryptedSecret {
        ciphertext: row.ciphertext,
        nonce: row.nonce,
        algorithm: row.algorithm,
    };
    vault
        .open::<SnmpCredential>(&secret)
        .map_err(|e| warn!(device_id, error = %e, "failed to decrypt SNMP credential"))
        .ok()
}

fn snmp_eligible(devices: Vec<devices::Model>) -> Vec<devices::Model> {
    devices
        .into_iter()
        .filter(|d| d.monitoring_mode != "ping_only")
        .collect()
}

/// Walks IF-MIB on every enabled device, upserting discovered interfaces and
/// their classifier output.
pub async fn run_discovery_sweep(
    store: &CurrentStateStore,
    db: &DatabaseConnection,
    poller: &SnmpPoller,
    vault: &CredentialVault,
    metrics: &MetricsManager,
    config: &PollingConfig,
) -> unet_core::Result<()> {
    let eligible = snmp_eligible(store.enabled_devices_ordered().await?);
    debug!(count = eligible.len(), "starting SNMP discovery sweep");

    stream::iter(eligible)
        .for_each_concurrent(config.worker_concurrency_snmp, |device| async move {
            let Ok(ip) = device.ip_address.parse() else {
                return;
            };
            let Some(credential) = load_credential(db, vault, &device.id).await else {
                debug!(device_id = %device.id, "no SNMP credential on file, skipping discovery");
                return;
            };
            let address = SocketAddr::new(ip, u16::try_from(device.snmp_port).unwrap_or(161));

            let deadline = Duration::from_secs(config.snmp_timeout_secs.max(1) * 2);
            let discovered = match tokio::time::timeout(
                deadline,
                poller.discover_interfaces(address, credential),
            )
            .await
            {
                Ok(Ok(interfaces)) => interfaces,
                Ok(Err(e)) => {
                    warn!(device_id = %device.id, error = %e, "SNMP discovery failed");
                    metrics.snmp_probe_failures_total.inc();
                    return;
                }
                Err(_) => {
                    warn!(device_id = %device.id, "SNMP discovery exceeded per-device deadline");
                    metrics.snmp_probe_failures_total.inc();
                    return;
                }
            };

            for interface in &discovered {
                let classification = snmp::classify(interface);
                if let Err(e) = store
                    .upsert_interface(
                        &device.id,
                        interface.if_index,
                        &interface.if_descr,
                        &interface.if_name,
                        &interface.if_alias,
                        interface.if_type,
                        interface.if_speed,
                        &classification,
                    )
                    .await
                {
                    warn!(device_id = %device.id, if_index = interface.if_index, error = %e, "failed to upsert interface");
                }
            }
        })
        .await;

    metrics.snmp_sweeps_total.inc();
    Ok(())
}

/// Samples operational status and traffic counters for every already-known
/// interface on every enabled device.
pub async fn run_metrics_sweep(
    store: &CurrentStateStore,
    db: &DatabaseConnection,
    poller: &SnmpPoller,
    vault: &CredentialVault,
    timeseries: &TimeSeriesBuffer,
    change_tx: &broadcast::Sender<ChangeEvent>,
    metrics: &MetricsManager,
    config: &PollingConfig,
) -> unet_core::Result<()> {
    let eligible = snmp_eligible(store.enabled_devices_ordered().await?);
    debug!(count = eligible.len(), "starting interface metrics sweep");

    stream::iter(eligible)
        .for_each_concurrent(config.worker_concurrency_snmp, |device| async move {
            let Ok(ip) = device.ip_address.parse() else {
                return;
            };
            let Some(credential) = load_credential(db, vault, &device.id).await else {
                return;
            };
            let address = SocketAddr::new(ip, u16::try_from(device.snmp_port).unwrap_or(161));
            let interfaces = store.interfaces_for_device(&device.id).await.unwrap_or_default();
            let deadline = Duration::from_secs(config.snmp_timeout_secs.max(1) * 2);

            for interface in interfaces {
                let sample = tokio::time::timeout(
                    deadline,
                    poller.poll_interface(address, credential.clone(), interface.if_index),
                )
                .await;
                let metrics_sample = match sample {
                    Ok(Ok(m)) => m,
                    Ok(Err(e)) => {
                        warn!(device_id = %device.id, if_index = interface.if_index, error = %e, "SNMP metrics poll failed");
                        continue;
                    }
                    Err(_) => {
                        warn!(device_id = %device.id, if_index = interface.if_index, "SNMP metrics poll exceeded deadline");
                        continue;
                    }
                };

                let now = Utc::now();
                let changed = store
                    .update_interface_status(
                        &device.id,
                        interface.if_index,
                        &metrics_sample.oper_status,
                        &metrics_sample.admin_status,
                        metrics_sample.if_speed,
                        InterfaceCounters {
                            in_octets: metrics_sample.in_octets,
                            out_octets: metrics_sample.out_octets,
                            in_errors: metrics_sample.in_errors,
                            out_errors: metrics_sample.out_errors,
                            in_discards: metrics_sample.in_discards,
                            out_discards: metrics_sample.out_discards,
                        },
                    )
                    .await
                    .unwrap_or(false);

                if changed {
                    let _ = change_tx.send(ChangeEvent::InterfaceStatusChanged {
                        device_id: device.id.clone(),
                        if_index: interface.if_index,
                        oper_status: metrics_sample.oper_status.clone(),
                        at: now,
                    });
                }

                timeseries.enqueue(Sample::interface(
                    "interface_oper_status",
                    device.id.clone(),
                    interface.id.clone(),
                    if metrics_sample.oper_status == "up" { 1.0 } else { 0.0 },
                    now,
                ));

                for (metric, value) in [
                    ("interface_in_octets", metrics_sample.in_octets),
                    ("interface_out_octets", metrics_sample.out_octets),
                    ("interface_in_errors", metrics_sample.in_errors),
                    ("interface_out_errors", metrics_sample.out_errors),
                    ("interface_in_discards", metrics_sample.in_discards),
                    ("interface_out_discards", metrics_sample.out_discards),
                    ("interface_speed", metrics_sample.if_speed),
                ] {
                    if let Some(value) = value {
                        timeseries.enqueue(Sample::interface(
                            metric,
                            device.id.clone(),
                            interface.id.clone(),
                            value as f64,
                            now,
                        ));
                    }
                }
            }
        })
        .await;

    Ok(())
}
