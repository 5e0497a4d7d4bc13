//! Current-state store: the authoritative, indexed, transactional record of
//! "is this device/interface up right now" (§4.5). Every read here must stay
//! O(indexed-lookup) — nothing in this module touches the time-series store.

use crate::classifier::Classification;
use crate::entities::{alert_history, device_interfaces, device_state, devices, ping_samples};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};

/// Thin, transactional wrapper over the current-state tables.
#[derive(Clone)]
pub struct CurrentStateStore {
    db: DatabaseConnection,
}

/// Input to a reachability update, written atomically with the owning
/// transaction (§4.5: any hot-path field lives here and is written inside
/// the same transaction as its state change).
pub struct ReachabilityUpdate {
    pub device_id: String,
    pub reachable: bool,
    pub down_since: Option<chrono::DateTime<Utc>>,
    pub is_flapping: bool,
    pub rtt_ms: Option<f64>,
    pub loss_pct: Option<f64>,
    pub transition_history: Option<String>,
}

impl CurrentStateStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upserts `device_state` for one device inside a single transaction.
    /// This is the ping worker's exclusive write path (§3 ownership rule).
    pub async fn apply_reachability_update(&self, update: ReachabilityUpdate) -> Result<()> {
        let txn = self.db.begin().await?;
        let existing = device_state::Entity::find()
            .filter(device_state::Column::DeviceId.eq(update.device_id.clone()))
            .one(&txn)
            .await?;

        let now = Utc::now().to_rfc3339();
        let mut model = existing.map_or_else(
            || device_state::ActiveModel {
                id: Set(uuid::Uuid::new_v4().to_string()),
                device_id: Set(update.device_id.clone()),
                consecutive_failures: Set(0),
                ..Default::default()
            },
            sea_orm::IntoActiveModel::into_active_model,
        );

        model.reachable = Set(update.reachable);
        model.down_since = Set(update.down_since.map(|d| d.to_rfc3339()));
        model.is_flapping = Set(update.is_flapping);
        model.last_probe_at = Set(Some(now.clone()));
        model.rtt_ms = Set(update.rtt_ms);
        model.loss_pct = Set(update.loss_pct);
        model.transition_history = Set(update.transition_history);
        model.consecutive_failures = Set(if update.reachable {
            0
        } else {
            model.consecutive_failures.clone().unwrap_or(0) + 1
        });
        model.updated_at = Set(now);

        model
            .save(&txn)
            .await
            .map_err(|e| Error::database("apply_reachability_update", e))?;
        txn.commit().await?;
        Ok(())
    }

    /// Appends one raw probe result to the debugging log (§4.2). Never read
    /// by the reachability engine itself — `device_state` is authoritative.
    pub async fn record_ping_sample(
        &self,
        device_id: &str,
        probed_at: chrono::DateTime<Utc>,
        reachable: bool,
        rtt_ms: Option<f64>,
        loss_pct: f64,
    ) -> Result<()> {
        let model = ping_samples::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            device_id: Set(device_id.to_string()),
            probed_at: Set(probed_at.to_rfc3339()),
            reachable: Set(reachable),
            rtt_ms: Set(rtt_ms),
            loss_pct: Set(loss_pct),
        };
        model
            .insert(&self.db)
            .await
            .map_err(|e| Error::database("record_ping_sample", e))?;
        Ok(())
    }

    /// Upserts one discovered interface's metadata and classification
    /// (§4.3 discovery walk / §4.4 classifier). Idempotent: re-running with
    /// unchanged metadata only touches `last_seen_at`.
    pub async fn upsert_interface(
        &self,
        device_id: &str,
        if_index: i32,
        if_descr: &str,
        if_name: &str,
        if_alias: &str,
        if_type: i32,
        if_speed: Option<i64>,
        classification: &Classification,
    ) -> Result<()> {
        let existing = device_interfaces::Entity::find()
            .filter(device_interfaces::Column::DeviceId.eq(device_id))
            .filter(device_interfaces::Column::IfIndex.eq(if_index))
            .one(&self.db)
            .await?;

        let now = Utc::now().to_rfc3339();
        let mut model = existing.map_or_else(
            || device_interfaces::ActiveModel {
                id: Set(uuid::Uuid::new_v4().to_string()),
                device_id: Set(device_id.to_string()),
                if_index: Set(if_index),
                ..Default::default()
            },
            sea_orm::IntoActiveModel::into_active_model,
        );

        model.if_descr = Set(if_descr.to_string());
        model.if_name = Set(Some(if_name.to_string()));
        model.if_alias = Set(Some(if_alias.to_string()));
        model.if_type = Set(if_type);
        model.if_speed = Set(if_speed);
        model.interface_class = Set(classification.interface_type.as_str().to_string());
        model.isp_provider = Set(classification.isp_provider.clone());
        model.is_critical = Set(classification.is_critical);
        model.classification_confidence = Set(classification.confidence);
        model.last_seen_at = Set(now);

        model
            .save(&self.db)
            .await
            .map_err(|e| Error::database("upsert_interface", e))?;
        Ok(())
    }

    /// Updates an interface's live operational status (SNMP worker's
    /// exclusive write path). Emits a status-change marker by returning
    /// whether `oper_status` actually changed.
    pub async fn update_interface_status(
        &self,
        device_id: &str,
        if_index: i32,
        oper_status: &str,
        admin_status: &str,
        if_speed: Option<i64>,
        counters: InterfaceCounters,
    ) -> Result<bool> {
        let existing = device_interfaces::Entity::find()
            .filter(device_interfaces::Column::DeviceId.eq(device_id))
            .filter(device_interfaces::Column::IfIndex.eq(if_index))
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::consistency("update_interface_status", "interface not found"))?;

        let changed = existing.oper_status != oper_status;
        let now = Utc::now().to_rfc3339();
        let mut model = existing.into_active_model();
        model.oper_status = Set(oper_status.to_string());
        model.admin_status = Set(admin_status.to_string());
        if let Some(if_speed) = if_speed {
            model.if_speed = Set(Some(if_speed));
        }
        model.in_octets = Set(counters.in_octets);
        model.out_octets = Set(counters.out_octets);
        model.in_errors = Set(counters.in_errors);
        model.out_errors = Set(counters.out_errors);
        model.in_discards = Set(counters.in_discards);
        model.out_discards = Set(counters.out_discards);
        model.last_seen_at = Set(now.clone());
        if changed {
            model.last_status_change_at = Set(Some(now));
        }
        model
            .save(&self.db)
            .await
            .map_err(|e| Error::database("update_interface_status", e))?;
        Ok(changed)
    }

    /// Single indexed query answering "give me the ISP oper-status for this
    /// list of IPs" (§4.7 bulk endpoint, §8 property E). Missing IPs are
    /// silently omitted.
    pub async fn bulk_isp_status(
        &self,
        ips: &[String],
    ) -> Result<Vec<(devices::Model, Vec<device_interfaces::Model>)>> {
        let matched_devices = devices::Entity::find()
            .filter(devices::Column::IpAddress.is_in(ips.iter().cloned()))
            .all(&self.db)
            .await?;

        let mut out = Vec::with_capacity(matched_devices.len());
        for device in matched_devices {
            let interfaces = device_interfaces::Entity::find()
                .filter(device_interfaces::Column::DeviceId.eq(device.id.clone()))
                .filter(device_interfaces::Column::InterfaceClass.eq("isp"))
                .all(&self.db)
                .await?;
            out.push((device, interfaces));
        }
        Ok(out)
    }

    /// All enabled devices, ordered by id ascending for stable sweep batching (§4.1).
    pub async fn enabled_devices_ordered(&self) -> Result<Vec<devices::Model>> {
        Ok(devices::Entity::find()
            .filter(devices::Column::Enabled.eq(true))
            .order_by_asc(devices::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn device_state_for(&self, device_id: &str) -> Result<Option<device_state::Model>> {
        Ok(device_state::Entity::find()
            .filter(device_state::Column::DeviceId.eq(device_id))
            .one(&self.db)
            .await?)
    }

    pub async fn device_by_id(&self, device_id: &str) -> Result<Option<devices::Model>> {
        Ok(devices::Entity::find_by_id(device_id.to_string())
            .one(&self.db)
            .await?)
    }

    pub async fn interfaces_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<device_interfaces::Model>> {
        Ok(device_interfaces::Entity::find()
            .filter(device_interfaces::Column::DeviceId.eq(device_id))
            .all(&self.db)
            .await?)
    }

    /// Every device paired with its current-state row, for the fleet list
    /// endpoint (§4.7 `GET /devices`). Devices without a state row yet (never
    /// probed) come back with `None`.
    pub async fn devices_with_state(
        &self,
    ) -> Result<Vec<(devices::Model, Option<device_state::Model>)>> {
        Ok(devices::Entity::find()
            .order_by_asc(devices::Column::Id)
            .find_also_related(device_state::Entity)
            .all(&self.db)
            .await?)
    }

    /// One device's full detail: its current-state row and all known
    /// interfaces (§4.7 `GET /devices/{id}`). `None` if the device id is unknown.
    pub async fn device_detail(
        &self,
        device_id: &str,
    ) -> Result<Option<(devices::Model, Option<device_state::Model>, Vec<device_interfaces::Model>)>>
    {
        let Some(device) = self.device_by_id(device_id).await? else {
            return Ok(None);
        };
        let state = self.device_state_for(device_id).await?;
        let interfaces = self.interfaces_for_device(device_id).await?;
        Ok(Some((device, state, interfaces)))
    }

    /// Append-only alert history for one device, newest first, for the
    /// `GET /devices/{id}/history` endpoint. `since` restricts to entries at
    /// or after that timestamp; `limit` caps the page size.
    pub async fn history_for_device(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u64,
    ) -> Result<Vec<alert_history::Model>> {
        let mut query = alert_history::Entity::find()
            .filter(alert_history::Column::DeviceId.eq(device_id))
            .order_by_desc(alert_history::Column::OccurredAt);
        if let Some(since) = since {
            query = query.filter(alert_history::Column::OccurredAt.gte(since.to_rfc3339()));
        }
        Ok(query.paginate(&self.db, limit).fetch_page(0).await?)
    }

    /// Raw ICMP probe history for one device, newest first, for the
    /// `GET /devices/{id}/history` time-series slice. `since` restricts to
    /// samples at or after that timestamp; `limit` caps the page size.
    pub async fn ping_samples_for_device(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u64,
    ) -> Result<Vec<ping_samples::Model>> {
        let mut query = ping_samples::Entity::find()
            .filter(ping_samples::Column::DeviceId.eq(device_id))
            .order_by_desc(ping_samples::Column::ProbedAt);
        if let Some(since) = since {
            query = query.filter(ping_samples::Column::ProbedAt.gte(since.to_rfc3339()));
        }
        Ok(query.paginate(&self.db, limit).fetch_page(0).await?)
    }

    /// Deletes ping samples older than `cutoff` (retention-days policy, §6
    /// `RETENTION_DAYS_TIMESERIES`). Returns the number of rows removed.
    pub async fn delete_ping_samples_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = ping_samples::Entity::delete_many()
            .filter(ping_samples::Column::ProbedAt.lt(cutoff.to_rfc3339()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Removes interfaces not seen by a discovery walk since `cutoff` (§6
    /// `INTERFACE_STALE_DAYS`) — typically decommissioned or renumbered ports.
    pub async fn retire_stale_interfaces(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = device_interfaces::Entity::delete_many()
            .filter(device_interfaces::Column::LastSeenAt.lt(cutoff.to_rfc3339()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceCounters {
    pub in_octets: Option<i64>,
    pub out_octets: Option<i64>,
    pub in_errors: Option<i64>,
    pub out_errors: Option<i64>,
    pub in_discards: Option<i64>,
    pub out_discards: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, InterfaceClass};
    use crate::entities::devices;
    use sea_orm::{ActiveValue::Set, ConnectionTrait, Database, DatabaseBackend, Schema};

    async fn test_store() -> CurrentStateStore {
        let conn = Database::connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:");
        let schema = Schema::new(DatabaseBackend::Sqlite);
        for stmt in [
            schema.create_table_from_entity(devices::Entity),
            schema.create_table_from_entity(device_state::Entity),
            schema.create_table_from_entity(device_interfaces::Entity),
            schema.create_table_from_entity(ping_samples::Entity),
            schema.create_table_from_entity(alert_history::Entity),
        ] {
            conn.execute(conn.get_database_backend().build(&stmt))
                .await
                .expect("create table");
        }
        CurrentStateStore::new(conn)
    }

    async fn seed_device(store: &CurrentStateStore, id: &str, ip: &str) {
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
        .insert(&store.db)
        .await
        .expect("seed device");
    }

    fn isp_classification() -> Classification {
        Classification {
            interface_type: InterfaceClass::Isp,
            isp_provider: Some("magti".to_string()),
            is_critical: true,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn reachability_update_is_insert_then_upsert() {
        let store = test_store().await;
        seed_device(&store, "d1", "10.0.0.1").await;

        store
            .apply_reachability_update(ReachabilityUpdate {
                device_id: "d1".to_string(),
                reachable: false,
                down_since: Some(Utc::now()),
                is_flapping: false,
                rtt_ms: None,
                loss_pct: Some(1.0),
                transition_history: None,
            })
            .await
            .unwrap();

        let state = store.device_state_for("d1").await.unwrap().unwrap();
        assert!(!state.reachable);
        assert!(state.down_since.is_some());
        assert_eq!(state.consecutive_failures, 1);

        store
            .apply_reachability_update(ReachabilityUpdate {
                device_id: "d1".to_string(),
                reachable: true,
                down_since: None,
                is_flapping: false,
                rtt_ms: Some(12.5),
                loss_pct: Some(0.0),
                transition_history: None,
            })
            .await
            .unwrap();

        let rows = device_state::Entity::find()
            .filter(device_state::Column::DeviceId.eq("d1"))
            .all(&store.db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1, "reachability update must upsert, not insert a second row");
        assert!(rows[0].reachable);
        assert!(rows[0].down_since.is_none());
        assert_eq!(rows[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn upsert_interface_is_idempotent_on_unchanged_metadata() {
        let store = test_store().await;
        seed_device(&store, "d1", "10.0.0.1").await;
        let classification = isp_classification();

        store
            .upsert_interface("d1", 1, "GigabitEthernet0/0", "Gi0/0", "ISP_Uplink", 6, Some(1_000_000_000), &classification)
            .await
            .unwrap();
        store
            .upsert_interface("d1", 1, "GigabitEthernet0/0", "Gi0/0", "ISP_Uplink", 6, Some(1_000_000_000), &classification)
            .await
            .unwrap();

        let interfaces = store.interfaces_for_device("d1").await.unwrap();
        assert_eq!(interfaces.len(), 1, "re-running discovery must upsert by (device, ifIndex)");
        assert_eq!(interfaces[0].interface_class, "isp");
        assert_eq!(interfaces[0].isp_provider.as_deref(), Some("magti"));
        assert!(interfaces[0].is_critical);
    }

    #[tokio::test]
    async fn update_interface_status_reports_change_only_on_transition() {
        let store = test_store().await;
        seed_device(&store, "d1", "10.0.0.1").await;
        store
            .upsert_interface("d1", 1, "descr", "Gi0/0", "alias", 6, None, &isp_classification())
            .await
            .unwrap();

        let changed = store
            .update_interface_status("d1", 1, "up", "up", None, InterfaceCounters::default())
            .await
            .unwrap();
        assert!(changed, "unset -> up is a transition");

        let changed_again = store
            .update_interface_status("d1", 1, "up", "up", None, InterfaceCounters::default())
            .await
            .unwrap();
        assert!(!changed_again, "repeating the same status is not a transition");

        let changed_down = store
            .update_interface_status("d1", 1, "down", "up", None, InterfaceCounters::default())
            .await
            .unwrap();
        assert!(changed_down);
    }

    #[tokio::test]
    async fn bulk_isp_status_omits_missing_ips_and_only_returns_isp_interfaces() {
        let store = test_store().await;
        seed_device(&store, "d1", "10.0.0.1").await;
        seed_device(&store, "d2", "10.0.0.2").await;
        store
            .upsert_interface("d1", 1, "descr", "Gi0/0", "ISP", 6, None, &isp_classification())
            .await
            .unwrap();
        store
            .upsert_interface(
                "d2",
                1,
                "descr",
                "Gi0/1",
                "trunk",
                6,
                None,
                &Classification {
                    interface_type: InterfaceClass::Trunk,
                    isp_provider: None,
                    is_critical: false,
                    confidence: 0.5,
                },
            )
            .await
            .unwrap();

        let results = store
            .bulk_isp_status(&[
                "10.0.0.1".to_string(),
                "10.0.0.2".to_string(),
                "10.0.0.99".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 2, "missing IPs are silently omitted");
        let d1 = results.iter().find(|(d, _)| d.id == "d1").unwrap();
        assert_eq!(d1.1.len(), 1, "only isp-classified interfaces are returned");
        let d2 = results.iter().find(|(d, _)| d.id == "d2").unwrap();
        assert!(d2.1.is_empty(), "trunk interface is not an isp interface");
    }

    #[tokio::test]
    async fn retention_cleanup_deletes_only_rows_before_cutoff() {
        let store = test_store().await;
        seed_device(&store, "d1", "10.0.0.1").await;
        let old = Utc::now() - chrono::Duration::days(40);
        let recent = Utc::now() - chrono::Duration::days(1);
        store
            .record_ping_sample("d1", old, true, Some(5.0), 0.0)
            .await
            .unwrap();
        store
            .record_ping_sample("d1", recent, true, Some(5.0), 0.0)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let removed = store.delete_ping_samples_before(cutoff).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.ping_samples_for_device("d1", None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].probed_at > cutoff.to_rfc3339());
    }
}
