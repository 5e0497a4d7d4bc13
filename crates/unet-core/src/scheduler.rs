//! Persisted schedule state (§4.1). Each named job gets one row in
//! `sweep_schedule`; a period-based job tracks a monotonic next-fire
//! timestamp (`next = max(prev+period, now)`, skipping missed slots rather
//! than back-filling them), and a daily job tracks the last calendar date it
//! fired on. Both survive a restart, so a process bounce never double-fires
//! a slot within its period.

use crate::entities::sweep_schedule;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, IntoActiveModel};
use std::time::Duration;

#[derive(Clone)]
pub struct ScheduleStore {
    db: DatabaseConnection,
}

impl ScheduleStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Whether `job_name` is due to fire right now under a fixed `period`.
    /// Advances the persisted next-fire timestamp when it returns `true`.
    pub async fn try_fire_periodic(
        &self,
        job_name: &str,
        period: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let period = chrono::Duration::from_std(period)
            .map_err(|e| Error::internal(format!("period out of range: {e}")))?;

        let existing = sweep_schedule::Entity::find_by_id(job_name.to_string())
            .one(&self.db)
            .await?;

        let Some(row) = existing else {
            // First ever run: fire immediately, schedule the next slot from now.
            let model = sweep_schedule::ActiveModel {
                job_name: Set(job_name.to_string()),
                next_fire_at: Set(Some((now + period).to_rfc3339())),
                last_fired_date: Set(None),
            };
            model
                .insert(&self.db)
                .await
                .map_err(|e| Error::database("insert sweep_schedule row", e))?;
            return Ok(true);
        };

        let next_fire_at = row
            .next_fire_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        let due = next_fire_at.map_or(true, |next| now >= next);
        if due {
            let advanced = next_fire_at.map_or(now, |next| (next + period).max(now));
            let mut model = row.into_active_model();
            model.next_fire_at = Set(Some(advanced.to_rfc3339()));
            model
                .save(&self.db)
                .await
                .map_err(|e| Error::database("advance sweep_schedule row", e))?;
        }
        Ok(due)
    }

    /// Whether `job_name` is due to fire today: the local (UTC) hour matches
    /// `hour` and it has not already fired on today's date. Records today's
    /// date when it returns `true`.
    pub async fn try_fire_daily(&self, job_name: &str, hour: u32, now: DateTime<Utc>) -> Result<bool> {
        use chrono::Timelike;

        let today = now.date_naive().to_string();
        let existing = sweep_schedule::Entity::find_by_id(job_name.to_string())
            .one(&self.db)
            .await?;

        let already_fired_today = existing
            .as_ref()
            .and_then(|r| r.last_fired_date.as_deref())
            .is_some_and(|d| d == today);

        if now.hour() != hour || already_fired_today {
            if existing.is_none() {
                let model = sweep_schedule::ActiveModel {
                    job_name: Set(job_name.to_string()),
                    next_fire_at: Set(None),
                    last_fired_date: Set(None),
                };
                model
                    .insert(&self.db)
                    .await
                    .map_err(|e| Error::database("insert sweep_schedule row", e))?;
            }
            return Ok(false);
        }

        let mut model = existing.map_or_else(
            || sweep_schedule::ActiveModel {
                job_name: Set(job_name.to_string()),
                next_fire_at: Set(None),
                last_fired_date: Set(None),
            },
            IntoActiveModel::into_active_model,
        );
        model.last_fired_date = Set(Some(today));
        model
            .save(&self.db)
            .await
            .map_err(|e| Error::database("advance sweep_schedule row", e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Schema};

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(DatabaseBackend::Sqlite);
        let stmt = schema.create_table_from_entity(sweep_schedule::Entity);
        db.execute(db.get_database_backend().build(&stmt))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn periodic_job_fires_immediately_then_waits_out_the_period() -> Result<()> {
        let store = ScheduleStore::new(memory_db().await);
        let t0 = Utc::now();
        assert!(store.try_fire_periodic("ping_sweep", Duration::from_secs(30), t0).await?);
        assert!(!store.try_fire_periodic("ping_sweep", Duration::from_secs(30), t0 + chrono::Duration::seconds(5)).await?);
        assert!(store.try_fire_periodic("ping_sweep", Duration::from_secs(30), t0 + chrono::Duration::seconds(31)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn periodic_job_skips_missed_slots_instead_of_catching_up() -> Result<()> {
        let store = ScheduleStore::new(memory_db().await);
        let t0 = Utc::now();
        store.try_fire_periodic("snmp_sweep", Duration::from_secs(60), t0).await?;
        // A very late tick (several periods after next-fire) fires exactly once,
        // and the following next-fire is anchored to `now`, not to the missed slots.
        let late = t0 + chrono::Duration::seconds(600);
        assert!(store.try_fire_periodic("snmp_sweep", Duration::from_secs(60), late).await?);
        assert!(!store.try_fire_periodic("snmp_sweep", Duration::from_secs(60), late + chrono::Duration::seconds(1)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn daily_job_fires_once_per_date_at_the_configured_hour() -> Result<()> {
        let store = ScheduleStore::new(memory_db().await);
        let at_hour = Utc::now()
            .date_naive()
            .and_hms_opt(2, 0, 0)
            .unwrap()
            .and_utc();

        assert!(store.try_fire_daily("interface_discovery", 2, at_hour).await?);
        assert!(!store.try_fire_daily("interface_discovery", 2, at_hour + chrono::Duration::minutes(30)).await?);
        assert!(
            store
                .try_fire_daily("interface_discovery", 2, at_hour + chrono::Duration::days(1))
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn daily_job_does_not_fire_outside_its_hour() -> Result<()> {
        let store = ScheduleStore::new(memory_db().await);
        let off_hour = Utc::now()
            .date_naive()
            .and_hms_opt(14, 0, 0)
            .unwrap()
            .and_utc();
        assert!(!store.try_fire_daily("retention_cleanup", 3, off_hour).await?);
        Ok(())
    }
}
