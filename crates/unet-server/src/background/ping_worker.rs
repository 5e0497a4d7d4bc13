//! Ping sweep: probes every enabled device and advances its reachability
//! state machine (§4.2). Owns all writes to `device_state`'s reachability
//! fields — nothing else in this binary touches them.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use unet_core::config::PollingConfig;
use unet_core::datastore::{CurrentStateStore, ReachabilityUpdate};
use unet_core::metrics::MetricsManager;
use unet_core::ping::{transition, PingSampler, ReachabilityState, TransitionRing};
use unet_core::timeseries::{Sample, TimeSeriesBuffer};

use crate::server::ChangeEvent;

/// Derives a per-device ICMP identifier so concurrent probes sharing one
/// `surge-ping` `Client` can't have their echo replies cross-matched between
/// hosts (`PingIdentifier` is the only thing the client demuxes replies on).
fn ping_identifier(device_id: &str) -> u16 {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    hasher.finish() as u16
}

/// Probes the enabled fleet once, bounded by `worker_concurrency_ping`
/// concurrent in-flight probes (§4.2 batch semaphore).
pub async fn run_sweep(
    store: &CurrentStateStore,
    sampler: &PingSampler,
    timeseries: &TimeSeriesBuffer,
    metrics: &MetricsManager,
    change_tx: &broadcast::Sender<ChangeEvent>,
    config: &PollingConfig,
) -> unet_core::Result<()> {
    let devices = store.enabled_devices_ordered().await?;
    let eligible: Vec<_> = devices
        .into_iter()
        .filter(|d| d.monitoring_mode != "snmp_only")
        .collect();
    debug!(count = eligible.len(), "starting ping sweep");

    stream::iter(eligible)
        .for_each_concurrent(config.worker_concurrency_ping, |device| async move {
            let Ok(addr) = device.ip_address.parse::<IpAddr>() else {
                warn!(device_id = %device.id, ip = %device.ip_address, "skipping device with unparseable IP");
                return;
            };

            let result = sampler.probe(addr, ping_identifier(&device.id)).await;
            let now = Utc::now();

            let prior_state = store.device_state_for(&device.id).await;
            let (prior, down_since, was_flapping, mut ring): (
                ReachabilityState,
                Option<chrono::DateTime<Utc>>,
                bool,
                TransitionRing,
            ) = match prior_state {
                Ok(Some(state)) => (
                    if state.reachable { ReachabilityState::Up } else { ReachabilityState::Down },
                    state.down_since.and_then(|s| s.parse().ok()),
                    state.is_flapping,
                    state
                        .transition_history
                        .as_deref()
                        .and_then(|json| serde_json::from_str(json).ok())
                        .unwrap_or_default(),
                ),
                Ok(None) => (ReachabilityState::Up, None, false, TransitionRing::new()),
                Err(e) => {
                    warn!(device_id = %device.id, error = %e, "failed to load prior device state");
                    return;
                }
            };

            let outcome = transition(
                prior,
                down_since,
                result.reachable,
                &mut ring,
                now,
                config.flap_k,
                chrono::Duration::seconds(config.flap_window_secs as i64),
                was_flapping,
            );

            if let Err(e) = store
                .apply_reachability_update(ReachabilityUpdate {
                    device_id: device.id.clone(),
                    reachable: result.reachable,
                    down_since: outcome.down_since,
                    is_flapping: outcome.is_flapping,
                    rtt_ms: result.rtt_ms,
                    loss_pct: Some(result.loss_pct),
                    transition_history: serde_json::to_string(&ring).ok(),
                })
                .await
            {
                warn!(device_id = %device.id, error = %e, "failed to persist reachability update");
                return;
            }

            if let Err(e) = store
                .record_ping_sample(&device.id, now, result.reachable, result.rtt_ms, result.loss_pct)
                .await
            {
                warn!(device_id = %device.id, error = %e, "failed to record ping sample");
            }

            metrics
                .ping_probes_total
                .with_label_values(&[if result.reachable { "reachable" } else { "unreachable" }])
                .inc();

            timeseries.enqueue(Sample::device(
                "device_ping_status",
                device.id.clone(),
                if result.reachable { 1.0 } else { 0.0 },
                now,
            ));
            if let Some(rtt) = result.rtt_ms {
                timeseries.enqueue(Sample::device("device_ping_rtt_ms", device.id.clone(), rtt, now));
            }
            timeseries.enqueue(Sample::device(
                "device_ping_loss_pct",
                device.id.clone(),
                result.loss_pct,
                now,
            ));

            if outcome.event.is_some() {
                info!(device_id = %device.id, event = ?outcome.event, "device reachability transition");
                let _ = change_tx.send(ChangeEvent::DeviceStateChanged {
                    device_id: device.id.clone(),
                    reachable: result.reachable,
                    is_flapping: outcome.is_flapping,
                    at: now,
                });
            }
        })
        .await;

    metrics.ping_sweeps_total.inc();
    Ok(())
}
