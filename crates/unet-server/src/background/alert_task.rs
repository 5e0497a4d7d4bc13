//! Alert evaluation sweep (§4.6): builds one in-memory snapshot per device,
//! evaluates every enabled rule against the whole fleet in a single pass, and
//! publishes the resulting active-problem count and change events.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::warn;
use unet_core::alerting::{AlertEngine, Condition, DeviceSnapshot};
use unet_core::classifier::ip_suffix_isp_heuristic;
use unet_core::datastore::CurrentStateStore;
use unet_core::entities::{alert_history, alert_rules, devices};
use unet_core::metrics::MetricsManager;

use crate::server::ChangeEvent;

/// Loads every enabled rule with its deserialized condition AST. Rules whose
/// `condition` column fails to parse are skipped with a warning rather than
/// aborting the whole sweep.
async fn load_enabled_rules(db: &DatabaseConnection) -> unet_core::Result<Vec<(alert_rules::Model, Condition)>> {
    let rows = alert_rules::Entity::find()
        .filter(alert_rules::Column::Enabled.eq(true))
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|rule| match serde_json::from_str::<Condition>(&rule.condition) {
            Ok(condition) => Some((rule, condition)),
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "failed to parse alert rule condition, skipping");
                None
            }
        })
        .collect())
}

/// Builds the evaluation snapshot for one device: its current reachability
/// state, the recent rtt/loss tail for `ResponseTime`/`PacketLoss`
/// conditions, and both ISP-router signals (§9 — the explicit flag and the
/// legacy IP-suffix heuristic are each compared against the classified-ISP-
/// interface criterion, and any disagreement is logged rather than resolved
/// silently in favor of one).
async fn build_snapshot(
    store: &CurrentStateStore,
    device: &devices::Model,
) -> unet_core::Result<DeviceSnapshot> {
    let state = store.device_state_for(&device.id).await?;
    let recent = store.ping_samples_for_device(&device.id, None, 20).await?;
    let mut recent_rtt_ms: Vec<f64> = recent.iter().rev().filter_map(|s| s.rtt_ms).collect();
    let mut recent_loss_pct: Vec<f64> = recent.iter().rev().map(|s| s.loss_pct).collect();
    recent_rtt_ms.shrink_to_fit();
    recent_loss_pct.shrink_to_fit();

    let interfaces = store.interfaces_for_device(&device.id).await?;
    let has_isp_interface = interfaces.iter().any(|i| i.interface_class == "isp");

    let ip_heuristic = ip_suffix_isp_heuristic(&device.ip_address);
    if device.is_isp_router != ip_heuristic {
        warn!(
            device_id = %device.id,
            flag = device.is_isp_router,
            ip_heuristic,
            "ISP-router identification signals disagree (explicit flag vs IP-suffix heuristic)"
        );
    }
    let is_isp_router = device.is_isp_router || ip_heuristic;
    if is_isp_router != has_isp_interface {
        warn!(
            device_id = %device.id,
            is_isp_router,
            has_isp_interface,
            "ISP-router identification signals disagree (device-level vs classified interface)"
        );
    }

    Ok(match state {
        Some(state) => DeviceSnapshot {
            device_id: device.id.clone(),
            reachable: state.reachable,
            down_since: state.down_since.and_then(|s| s.parse().ok()),
            is_flapping: state.is_flapping,
            recent_rtt_ms,
            recent_loss_pct,
            is_isp_router,
            has_isp_interface,
        },
        None => DeviceSnapshot {
            device_id: device.id.clone(),
            reachable: true,
            down_since: None,
            is_flapping: false,
            recent_rtt_ms,
            recent_loss_pct,
            is_isp_router,
            has_isp_interface,
        },
    })
}

fn severity_label(severity: &str) -> &'static str {
    match severity {
        "critical" => "critical",
        "high" => "high",
        "medium" => "medium",
        _ => "low",
    }
}

async fn refresh_active_problem_gauge(
    db: &DatabaseConnection,
    metrics: &MetricsManager,
) -> unet_core::Result<()> {
    use unet_core::entities::active_problems;

    let open = active_problems::Entity::find()
        .filter(active_problems::Column::ResolvedAt.is_null())
        .all(db)
        .await?;

    let mut counts: HashMap<&'static str, f64> =
        [("critical", 0.0), ("high", 0.0), ("medium", 0.0), ("low", 0.0)].into();
    for problem in &open {
        *counts.entry(severity_label(&problem.severity)).or_insert(0.0) += 1.0;
    }
    for (label, count) in counts {
        metrics.active_problems.with_label_values(&[label]).set(count);
    }
    Ok(())
}

async fn emit_change_events(
    db: &DatabaseConnection,
    rules: &[(alert_rules::Model, Condition)],
    now: DateTime<Utc>,
    change_tx: &broadcast::Sender<ChangeEvent>,
) -> unet_core::Result<()> {
    let rule_names: HashMap<&str, &str> = rules
        .iter()
        .map(|(r, _)| (r.id.as_str(), r.name.as_str()))
        .collect();

    let events = alert_history::Entity::find()
        .filter(alert_history::Column::OccurredAt.eq(now.to_rfc3339()))
        .all(db)
        .await?;

    for event in events {
        let at = now;
        match event.event_type.as_str() {
            "triggered" => {
                let _ = change_tx.send(ChangeEvent::ProblemOpened {
                    problem_id: event.problem_id,
                    device_id: event.device_id,
                    rule_name: rule_names
                        .get(event.rule_id.as_str())
                        .map_or_else(|| event.rule_id.clone(), ToString::to_string),
                    severity: event.severity,
                    at,
                });
            }
            "resolved" => {
                let _ = change_tx.send(ChangeEvent::ProblemResolved {
                    problem_id: event.problem_id,
                    device_id: event.device_id,
                    at,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Runs one alert-evaluation tick over the whole fleet (§4.6: one in-memory
/// pass per tick rather than a query per rule per device).
pub async fn run_eval_sweep(
    store: &CurrentStateStore,
    db: &DatabaseConnection,
    engine: &AlertEngine,
    metrics: &MetricsManager,
    change_tx: &broadcast::Sender<ChangeEvent>,
) -> unet_core::Result<()> {
    let rules = load_enabled_rules(db).await?;
    if rules.is_empty() {
        return Ok(());
    }

    let devices = store.enabled_devices_ordered().await?;
    let mut snapshots = Vec::with_capacity(devices.len());
    for device in &devices {
        let snapshot = build_snapshot(store, device).await?;
        snapshots.push((snapshot, device.branch_id.clone()));
    }

    let now = Utc::now();
    engine.evaluate_fleet(&rules, &snapshots, now).await?;

    refresh_active_problem_gauge(db, metrics).await?;
    emit_change_events(db, &rules, now, change_tx).await?;
    Ok(())
}
