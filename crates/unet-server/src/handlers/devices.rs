//! Fleet and per-device read handlers (`GET /devices`, `GET /devices/{id}`,
//! `GET /devices/{id}/history`).

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handlers::{ServerError, ServerResult};
use crate::server::AppState;
use unet_core::entities::{device_interfaces, device_state, devices};

/// One row of the `GET /devices` fleet list.
#[derive(Debug, Serialize)]
pub struct DeviceListEntry {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub reachability: &'static str,
    pub down_since: Option<String>,
    pub is_flapping: bool,
    pub last_probe_at: Option<String>,
    pub rtt_ms: Option<f64>,
    pub loss_pct: Option<f64>,
    pub branch_id: Option<String>,
    pub classification: String,
}

fn reachability_label(state: Option<&device_state::Model>) -> &'static str {
    match state {
        Some(s) if s.reachable => "up",
        Some(_) => "down",
        None => "unknown",
    }
}

fn list_entry(device: devices::Model, state: Option<device_state::Model>) -> DeviceListEntry {
    DeviceListEntry {
        id: device.id,
        name: device.name,
        ip: device.ip_address,
        reachability: reachability_label(state.as_ref()),
        down_since: state.as_ref().and_then(|s| s.down_since.clone()),
        is_flapping: state.as_ref().is_some_and(|s| s.is_flapping),
        last_probe_at: state.as_ref().and_then(|s| s.last_probe_at.clone()),
        rtt_ms: state.as_ref().and_then(|s| s.rtt_ms),
        loss_pct: state.as_ref().and_then(|s| s.loss_pct),
        branch_id: device.branch_id,
        classification: device.classification,
    }
}

/// # Errors
/// Returns an error if the fleet query fails.
pub async fn list_devices(
    State(app_state): State<AppState>,
) -> ServerResult<Json<Vec<DeviceListEntry>>> {
    let rows = app_state.store.devices_with_state().await?;
    Ok(Json(
        rows.into_iter().map(|(d, s)| list_entry(d, s)).collect(),
    ))
}

/// An ISP-facing interface reported on a device's detail view.
#[derive(Debug, Serialize)]
pub struct IspInterfaceEntry {
    pub provider: Option<String>,
    pub status: String,
    pub if_name: Option<String>,
    pub if_alias: Option<String>,
    pub last_seen_at: String,
}

impl From<device_interfaces::Model> for IspInterfaceEntry {
    fn from(i: device_interfaces::Model) -> Self {
        Self {
            provider: i.isp_provider,
            status: i.oper_status,
            if_name: i.if_name,
            if_alias: i.if_alias,
            last_seen_at: i.last_seen_at,
        }
    }
}

/// `GET /devices/{id}` response: the fleet-list fields plus every known
/// ISP-facing interface on the device.
#[derive(Debug, Serialize)]
pub struct DeviceDetail {
    #[serde(flatten)]
    pub summary: DeviceListEntry,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub monitoring_mode: String,
    pub is_isp_router: bool,
    pub isp_interfaces: Vec<IspInterfaceEntry>,
}

/// # Errors
/// Returns `NotFound` if no device matches `id`, or an error if the query fails.
pub async fn device_detail(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<DeviceDetail>> {
    let (device, state, interfaces) = app_state
        .store
        .device_detail(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("device {id}")))?;

    let isp_interfaces = interfaces
        .iter()
        .filter(|i| i.interface_class == "isp")
        .cloned()
        .map(IspInterfaceEntry::from)
        .collect();

    let summary = list_entry(device.clone(), state);
    Ok(Json(DeviceDetail {
        summary,
        vendor: device.vendor,
        model: device.model,
        monitoring_mode: device.monitoring_mode,
        is_isp_router: device.is_isp_router,
        isp_interfaces,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub range: Option<String>,
}

/// One time-series point in a `GET /devices/{id}/history` slice.
#[derive(Debug, Serialize)]
pub struct HistoryPoint {
    pub t: DateTime<Utc>,
    pub reachable: bool,
    pub rtt_ms: Option<f64>,
    pub loss_pct: f64,
}

/// Parses a `1h`/`30m`/`7d` style range into a lookback `Duration`. Defaults
/// to 24h when absent or malformed.
fn parse_range(range: Option<&str>) -> chrono::Duration {
    const DEFAULT: i64 = 24;
    let Some(range) = range else {
        return chrono::Duration::hours(DEFAULT);
    };
    let Some((value, unit)) = range.split_at_checked(range.len().saturating_sub(1)) else {
        return chrono::Duration::hours(DEFAULT);
    };
    let Ok(value) = value.parse::<i64>() else {
        return chrono::Duration::hours(DEFAULT);
    };
    match unit {
        "m" => chrono::Duration::minutes(value),
        "h" => chrono::Duration::hours(value),
        "d" => chrono::Duration::days(value),
        _ => chrono::Duration::hours(DEFAULT),
    }
}

const HISTORY_PAGE_LIMIT: u64 = 2000;

/// # Errors
/// Returns `NotFound` if no device matches `id`, or an error if the query fails.
pub async fn device_history(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ServerResult<Json<Vec<HistoryPoint>>> {
    if app_state.store.device_by_id(&id).await?.is_none() {
        return Err(ServerError::NotFound(format!("device {id}")));
    }

    let since = Utc::now() - parse_range(query.range.as_deref());
    let samples = app_state
        .store
        .ping_samples_for_device(&id, Some(since), HISTORY_PAGE_LIMIT)
        .await?;

    Ok(Json(
        samples
            .into_iter()
            .filter_map(|s| {
                Some(HistoryPoint {
                    t: s.probed_at.parse().ok()?,
                    reachable: s.reachable,
                    rtt_ms: s.rtt_ms,
                    loss_pct: s.loss_pct,
                })
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use unet_core::entities::devices;

    #[test]
    fn parse_range_reads_unit_suffix() {
        assert_eq!(parse_range(Some("30m")), chrono::Duration::minutes(30));
        assert_eq!(parse_range(Some("6h")), chrono::Duration::hours(6));
        assert_eq!(parse_range(Some("7d")), chrono::Duration::days(7));
    }

    #[test]
    fn parse_range_defaults_to_24h_on_malformed_or_missing_input() {
        assert_eq!(parse_range(None), chrono::Duration::hours(24));
        assert_eq!(parse_range(Some("bogus")), chrono::Duration::hours(24));
        assert_eq!(parse_range(Some("")), chrono::Duration::hours(24));
    }

    #[test]
    fn reachability_label_reflects_state_or_unknown() {
        assert_eq!(reachability_label(None), "unknown");
    }

    async fn seed_device(app_state: &AppState, id: &str, ip: &str) {
        let now = Utc::now().to_rfc3339();
        devices::ActiveModel {
            id: Set(id.to_string()),
            name: Set(format!("device-{id}")),
            ip_address: Set(ip.to_string()),
            classification: Set("router".to_string()),
            vendor: Set(None),
            model: Set(None),
            branch_id: Set(None),
            enabled: Set(true),
            monitoring_mode: Set("ping_and_snmp".to_string()),
            snmp_version: Set("v2c".to_string()),
            snmp_port: Set(161),
            credential_ref: Set(None),
            description: Set(None),
            is_isp_router: Set(false),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        }
        .insert(&app_state.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn list_devices_reports_unknown_for_unprobed_device() {
        let app_state = create_mock_app_state().await;
        seed_device(&app_state, "d1", "10.0.0.1").await;

        let Json(devices) = list_devices(State(app_state)).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].reachability, "unknown");
        assert!(devices[0].down_since.is_none());
    }

    #[tokio::test]
    async fn device_detail_returns_not_found_for_unknown_id() {
        let app_state = create_mock_app_state().await;
        let result = device_detail(State(app_state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn device_history_returns_not_found_for_unknown_id() {
        let app_state = create_mock_app_state().await;
        let result = device_history(
            State(app_state),
            Path("missing".to_string()),
            Query(HistoryQuery { range: None }),
        )
        .await;
        assert!(matches!(result, Err(ServerError::NotFound(_))));
    }
}
