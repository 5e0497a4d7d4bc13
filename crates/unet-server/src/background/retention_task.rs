//! Daily retention cleanup (§6 `RETENTION_DAYS_TIMESERIES`, `INTERFACE_STALE_DAYS`):
//! prunes ping-sample history past its retention window and retires
//! interfaces a discovery walk hasn't seen in a while (decommissioned or
//! renumbered ports).

use chrono::Utc;
use tracing::info;
use unet_core::config::{AlertingConfig, PollingConfig};
use unet_core::datastore::CurrentStateStore;

pub async fn run_cleanup(
    store: &CurrentStateStore,
    polling: &PollingConfig,
    alerting: &AlertingConfig,
) -> unet_core::Result<()> {
    let now = Utc::now();

    let ping_cutoff = now - chrono::Duration::days(i64::from(alerting.retention_days_timeseries));
    let deleted_samples = store.delete_ping_samples_before(ping_cutoff).await?;

    let interface_cutoff = now - chrono::Duration::days(i64::from(polling.interface_stale_days));
    let retired_interfaces = store.retire_stale_interfaces(interface_cutoff).await?;

    info!(
        deleted_samples,
        retired_interfaces, "completed daily retention cleanup"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use unet_core::config::Config;

    #[tokio::test]
    async fn cleanup_prunes_only_rows_older_than_their_own_retention_window() {
        let db = test_support::fresh_entity_db().await;
        let store = CurrentStateStore::new(db);
        let config = Config::default();

        store
            .record_ping_sample("d1", Utc::now() - Duration::days(40), true, Some(5.0), 0.0)
            .await
            .unwrap();
        store
            .record_ping_sample("d1", Utc::now() - Duration::days(1), true, Some(5.0), 0.0)
            .await
            .unwrap();

        run_cleanup(&store, &config.polling, &config.alerting).await.unwrap();

        let remaining = store.ping_samples_for_device("d1", None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1, "only the sample inside the retention window survives");
    }
}
