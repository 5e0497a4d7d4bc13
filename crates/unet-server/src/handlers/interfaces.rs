//! ISP interface status and on-demand discovery handlers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use unet_core::entities::device_credentials;
use unet_core::secrets::EncryptedSecret;
use unet_core::snmp::{self, SnmpCredential, SnmpPoller};

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::handlers::{ServerError, ServerResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct BulkIspStatusQuery {
    pub device_ips: String,
}

#[derive(Debug, Serialize)]
pub struct IspStatus {
    pub status: String,
    pub if_name: Option<String>,
    pub last_seen_at: String,
}

/// `GET /interfaces/isp-status/bulk?device_ips=a,b,c` (§4.7, §8 property E):
/// IPs with no matching device, or no classified ISP interface, are omitted
/// rather than reported as an error.
///
/// # Errors
/// Returns an error if the underlying query fails.
pub async fn bulk_isp_status(
    State(app_state): State<AppState>,
    Query(query): Query<BulkIspStatusQuery>,
) -> ServerResult<Json<HashMap<String, HashMap<String, IspStatus>>>> {
    let ips: Vec<String> = query
        .device_ips
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    let rows = app_state.store.bulk_isp_status(&ips).await?;

    let mut out = HashMap::with_capacity(rows.len());
    for (device, interfaces) in rows {
        let mut by_provider = HashMap::with_capacity(interfaces.len());
        for interface in interfaces {
            let provider = interface.isp_provider.clone().unwrap_or_else(|| "unknown".to_string());
            by_provider.insert(
                provider,
                IspStatus {
                    status: interface.oper_status,
                    if_name: interface.if_name,
                    last_seen_at: interface.last_seen_at,
                },
            );
        }
        if !by_provider.is_empty() {
            out.insert(device.ip_address, by_provider);
        }
    }
    Ok(Json(out))
}

#[derive(Debug, Serialize)]
pub struct DiscoverResult {
    pub discovered: usize,
}

/// `POST /interfaces/discover/{device_id}`: runs an SNMP discovery walk
/// against a single device on demand, outside its regular sweep cadence.
///
/// # Errors
/// Returns `NotFound` if the device is unknown, `BadRequest` if it has no
/// SNMP credential on file, or an error if the walk itself fails.
pub async fn discover_interfaces(
    State(app_state): State<AppState>,
    Path(device_id): Path<String>,
) -> ServerResult<Json<DiscoverResult>> {
    let device = app_state
        .store
        .device_by_id(&device_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("device {device_id}")))?;

    let credential_row = device_credentials::Entity::find()
        .filter(device_credentials::Column::DeviceId.eq(device_id.clone()))
        .one(&app_state.db)
        .await?
        .ok_or_else(|| ServerError::BadRequest(format!("device {device_id} has no SNMP credential on file")))?;

    let secret = EncryptedSecret {
        ciphertext: credential_row.ciphertext,
        nonce: credential_row.nonce,
        algorithm: credential_row.algorithm,
    };
    let credential: SnmpCredential = app_state
        .credential_vault
        .open(&secret)
        .map_err(|e| ServerError::Internal(format!("failed to decrypt SNMP credential: {e}")))?;

    let ip = device
        .ip_address
        .parse()
        .map_err(|_| ServerError::Internal(format!("device {device_id} has an invalid IP address")))?;
    let address = SocketAddr::new(ip, u16::try_from(device.snmp_port).unwrap_or(161));

    let poller = SnmpPoller::new(
        app_state.config.polling.worker_concurrency_snmp,
        app_state.config.snmp_timeout(),
        app_state.config.polling.snmp_retries,
    );
    let deadline = Duration::from_secs(app_state.config.polling.snmp_timeout_secs.max(1) * 2);
    let discovered = tokio::time::timeout(deadline, poller.discover_interfaces(address, credential))
        .await
        .map_err(|_| ServerError::Internal("SNMP discovery exceeded its deadline".to_string()))?
        .map_err(|e| ServerError::Internal(format!("SNMP discovery failed: {e}")))?;

    for interface in &discovered {
        let classification = snmp::classify(interface);
        app_state
            .store
            .upsert_interface(
                &device_id,
                interface.if_index,
                &interface.if_descr,
                &interface.if_name,
                &interface.if_alias,
                interface.if_type,
                interface.if_speed,
                &classification,
            )
            .await?;
    }

    let count = discovered.len();
    app_state.metrics.snmp_sweeps_total.inc();
    Ok(Json(DiscoverResult { discovered: count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use unet_core::classifier::{Classification, InterfaceClass};
    use unet_core::entities::devices;

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
    async fn bulk_isp_status_omits_devices_with_no_isp_interface() {
        let app_state = create_mock_app_state().await;
        seed_device(&app_state, "d1", "10.0.0.1").await;
        app_state
            .store
            .upsert_interface(
                "d1",
                1,
                "descr",
                "Gi0/0",
                "Magti_Uplink",
                6,
                None,
                &Classification {
                    interface_type: InterfaceClass::Isp,
                    isp_provider: Some("magti".to_string()),
                    is_critical: true,
                    confidence: 0.9,
                },
            )
            .await
            .unwrap();

        let Json(result) = bulk_isp_status(
            State(app_state),
            Query(BulkIspStatusQuery {
                device_ips: "10.0.0.1, 10.0.0.99".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 1, "only the matched, ISP-bearing device is reported");
        assert!(result.contains_key("10.0.0.1"));
        assert!(result["10.0.0.1"].contains_key("magti"));
    }

    #[tokio::test]
    async fn discover_interfaces_returns_not_found_for_unknown_device() {
        let app_state = create_mock_app_state().await;
        let result = discover_interfaces(State(app_state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn discover_interfaces_returns_bad_request_without_credential() {
        let app_state = create_mock_app_state().await;
        seed_device(&app_state, "d1", "10.0.0.1").await;
        let result = discover_interfaces(State(app_state), Path("d1".to_string())).await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }
}
