//! Alert engine: a tagged-variant condition AST evaluated as a pure function
//! over a current-state snapshot (§9 redesign), deduplicated active-problem
//! rows (§3), dependency suppression, and maintenance-window suppression (§4.6).

use crate::entities::{active_problems, alert_history, alert_rules, maintenance_windows};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition as SeaCondition, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

/// The structured condition AST named in §9 — replaces the source's
/// free-form rule strings. Evaluation is a pure function over one device's
/// snapshot; no condition variant reaches back into the database itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Condition {
    DownDuration { secs: i64 },
    StatusChanges { k: u32, window_secs: i64 },
    ResponseTime { over_ms: f64, samples: u32 },
    PacketLoss { over_pct: f64, samples: u32 },
    And(Vec<Condition>),
    ScopeIsp { inner: Box<Condition> },
}

/// Everything the engine needs about one device to evaluate every condition
/// variant without a second round-trip to the database.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub reachable: bool,
    pub down_since: Option<DateTime<Utc>>,
    pub is_flapping: bool,
    pub recent_rtt_ms: Vec<f64>,
    pub recent_loss_pct: Vec<f64>,
    pub is_isp_router: bool,
    pub has_isp_interface: bool,
}

impl DeviceSnapshot {
    #[must_use]
    pub fn is_isp(&self) -> bool {
        // §9 open question: both criteria are honored; callers should log
        // when they disagree rather than silently picking one.
        self.is_isp_router || self.has_isp_interface
    }
}

/// Evaluate `condition` against `snapshot` at `now`. Pure: no I/O, no side effects.
#[must_use]
pub fn evaluate(condition: &Condition, snapshot: &DeviceSnapshot, now: DateTime<Utc>) -> bool {
    match condition {
        Condition::DownDuration { secs } => snapshot
            .down_since
            .is_some_and(|since| (now - since).num_seconds() >= *secs),
        Condition::StatusChanges { .. } => snapshot.is_flapping,
        Condition::ResponseTime { over_ms, samples } => {
            tail_average(&snapshot.recent_rtt_ms, *samples as usize) > Some(*over_ms)
        }
        Condition::PacketLoss { over_pct, samples } => {
            tail_average(&snapshot.recent_loss_pct, *samples as usize) > Some(*over_pct)
        }
        Condition::And(conditions) => conditions.iter().all(|c| evaluate(c, snapshot, now)),
        Condition::ScopeIsp { inner } => snapshot.is_isp() && evaluate(inner, snapshot, now),
    }
}

fn tail_average(samples: &[f64], n: usize) -> Option<f64> {
    if samples.is_empty() || n == 0 {
        return None;
    }
    let tail = &samples[samples.len().saturating_sub(n)..];
    Some(tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Whether a [`Condition`] references ISP scope anywhere in its tree — used
/// to decide the §4.6 "ISP-link conditions escalate to Critical" rule.
#[must_use]
pub fn is_isp_scoped(condition: &Condition) -> bool {
    match condition {
        Condition::ScopeIsp { .. } => true,
        Condition::And(conditions) => conditions.iter().any(is_isp_scoped),
        _ => false,
    }
}

/// Whether a [`Condition`] is the flap-detector condition itself — used to
/// exempt it from §4.2 flapping suppression. Every other condition
/// (`DownDuration`, `ResponseTime`, `PacketLoss`, ...) fires per-occurrence
/// and must not reopen on every flap tick while the device is flapping.
#[must_use]
pub fn is_flap_scoped(condition: &Condition) -> bool {
    match condition {
        Condition::StatusChanges { .. } => true,
        Condition::And(conditions) => conditions.iter().any(is_flap_scoped),
        _ => false,
    }
}

/// Drives the active-problem lifecycle: dedup, re-trigger-in-place, resolve,
/// dependency suppression, maintenance-window suppression, history journal.
pub struct AlertEngine {
    db: DatabaseConnection,
}

/// Ephemeral view of whether a problem is open, for the resolve pass; kept
/// separate from the entity model so evaluation logic doesn't depend on ORM types.
#[derive(Debug, Clone)]
pub struct ActiveProblemState {
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub interface_id: Option<String>,
    pub severity: Severity,
}

impl AlertEngine {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Evaluates one rule against one device snapshot, opening, re-triggering
    /// in place, or resolving the corresponding `active_problem` row per
    /// §4.6's dedup and recovery rules. Returns the row's id if one is open
    /// afterward.
    pub async fn evaluate_rule(
        &self,
        rule: &alert_rules::Model,
        condition: &Condition,
        snapshot: &DeviceSnapshot,
        interface_id: Option<&str>,
        suppressed: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let fires = evaluate(condition, snapshot, now);
        let severity = if is_isp_scoped(condition) {
            Severity::Critical
        } else {
            rule.severity
                .parse::<SeverityStr>()
                .map_or(Severity::Medium, |s| s.0)
        };

        let existing = active_problems::Entity::find()
            .filter(active_problems::Column::RuleId.eq(rule.id.clone()))
            .filter(active_problems::Column::DeviceId.eq(snapshot.device_id.clone()))
            .filter(match interface_id {
                Some(id) => active_problems::Column::InterfaceId.eq(id),
                None => active_problems::Column::InterfaceId.is_null(),
            })
            .filter(active_problems::Column::ResolvedAt.is_null())
            .one(&self.db)
            .await?;

        match (fires, existing) {
            (true, Some(open)) => {
                // Re-trigger in place: bump event_count / last_seen, never a new row.
                let id = open.id.clone();
                let mut model = open.into_active_model();
                model.last_seen_at = Set(now.to_rfc3339());
                model.suppressed = Set(suppressed);
                let event_count = model
                    .event_count
                    .take()
                    .ok_or_else(|| Error::internal("active_problem row missing event_count"))?;
                model.event_count = Set(event_count + 1);
                model.save(&self.db).await?;
                Ok(Some(id))
            }
            (true, None) => {
                let id = uuid::Uuid::new_v4().to_string();
                let active = active_problems::ActiveModel {
                    id: Set(id.clone()),
                    rule_id: Set(rule.id.clone()),
                    device_id: Set(snapshot.device_id.clone()),
                    interface_id: Set(interface_id.map(str::to_string)),
                    severity: Set(severity.as_str().to_string()),
                    first_triggered_at: Set(now.to_rfc3339()),
                    last_seen_at: Set(now.to_rfc3339()),
                    resolved_at: Set(None),
                    suppressed: Set(suppressed),
                    suppressed_reason: Set(None),
                    event_count: Set(1),
                };
                active.insert(&self.db).await?;
                self.append_history(
                    &id,
                    &rule.id,
                    &snapshot.device_id,
                    interface_id,
                    severity,
                    "triggered",
                    now,
                )
                .await?;
                Ok(Some(id))
            }
            (false, Some(open)) => {
                // Recovery: close the row, idempotent journal entry.
                let id = open.id.clone();
                let mut model = open.into_active_model();
                model.resolved_at = Set(Some(now.to_rfc3339()));
                model.save(&self.db).await?;
                self.append_history(
                    &id,
                    &rule.id,
                    &snapshot.device_id,
                    interface_id,
                    severity,
                    "resolved",
                    now,
                )
                .await?;
                Ok(None)
            }
            (false, None) => Ok(None),
        }
    }

    /// Whether `rule` should be opened as `suppressed` for `device_id` right
    /// now: either a maintenance window covers the device/branch, or the
    /// rule's declared parent (§4.6 dependency suppression) already has an
    /// open problem on the same device.
    pub async fn is_suppressed(
        &self,
        rule: &alert_rules::Model,
        device_id: &str,
        branch_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if self.maintenance_window_active(device_id, branch_id, now).await? {
            return Ok(true);
        }
        if let Some(parent_id) = &rule.depends_on_rule_id {
            if self.rule_is_firing(parent_id, device_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn maintenance_window_active(
        &self,
        device_id: &str,
        branch_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now_str = now.to_rfc3339();
        let mut scope = SeaCondition::any().add(maintenance_windows::Column::DeviceId.eq(device_id));
        if let Some(branch_id) = branch_id {
            scope = scope.add(maintenance_windows::Column::BranchId.eq(branch_id));
        }
        let hit = maintenance_windows::Entity::find()
            .filter(scope)
            .filter(maintenance_windows::Column::StartsAt.lte(now_str.clone()))
            .filter(maintenance_windows::Column::EndsAt.gte(now_str))
            .one(&self.db)
            .await?;
        Ok(hit.is_some())
    }

    async fn rule_is_firing(&self, rule_id: &str, device_id: &str) -> Result<bool> {
        let open = active_problems::Entity::find()
            .filter(active_problems::Column::RuleId.eq(rule_id))
            .filter(active_problems::Column::DeviceId.eq(device_id))
            .filter(active_problems::Column::ResolvedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(open.is_some())
    }

    /// Evaluates every enabled rule against every device snapshot in one
    /// pass (§4.6: the whole fleet is pulled into memory and walked once per
    /// tick rather than per-rule-per-query). Returns the count of problems
    /// left open afterward.
    ///
    /// §4.2: while a device is flapping, every condition other than the
    /// flap-detector itself (`StatusChanges`) is forced `suppressed` rather
    /// than left to open/re-trigger a fresh per-occurrence Down/Up problem
    /// on every flap tick — only the single flapping problem is live until
    /// the device has been stable for a full window.
    pub async fn evaluate_fleet(
        &self,
        rules: &[(alert_rules::Model, Condition)],
        snapshots: &[(DeviceSnapshot, Option<String>)],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut open_count = 0;
        for (snapshot, branch_id) in snapshots {
            for (rule, condition) in rules {
                if !rule.enabled {
                    continue;
                }
                let suppressed = (snapshot.is_flapping && !is_flap_scoped(condition))
                    || self
                        .is_suppressed(rule, &snapshot.device_id, branch_id.as_deref(), now)
                        .await?;
                if self
                    .evaluate_rule(rule, condition, snapshot, None, suppressed, now)
                    .await?
                    .is_some()
                {
                    open_count += 1;
                }
            }
        }
        Ok(open_count)
    }

    async fn append_history(
        &self,
        problem_id: &str,
        rule_id: &str,
        device_id: &str,
        interface_id: Option<&str>,
        severity: Severity,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let entry = alert_history::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            problem_id: Set(problem_id.to_string()),
            rule_id: Set(rule_id.to_string()),
            device_id: Set(device_id.to_string()),
            interface_id: Set(interface_id.map(str::to_string)),
            severity: Set(severity.as_str().to_string()),
            event_type: Set(event_type.to_string()),
            message: Set(format!("{event_type} for device {device_id}")),
            occurred_at: Set(now.to_rfc3339()),
        };
        entry.insert(&self.db).await?;
        Ok(())
    }
}

struct SeverityStr(Severity);

impl std::str::FromStr for SeverityStr {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self(Severity::Low)),
            "medium" => Ok(Self(Severity::Medium)),
            "high" => Ok(Self(Severity::High)),
            "critical" => Ok(Self(Severity::Critical)),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(down_since: Option<DateTime<Utc>>) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: "dev-1".to_string(),
            reachable: down_since.is_none(),
            down_since,
            is_flapping: false,
            recent_rtt_ms: vec![],
            recent_loss_pct: vec![],
            is_isp_router: false,
            has_isp_interface: false,
        }
    }

    #[test]
    fn down_duration_fires_once_threshold_elapsed() {
        let now = Utc::now();
        let since = now - chrono::Duration::seconds(15);
        let condition = Condition::DownDuration { secs: 10 };
        assert!(evaluate(&condition, &snapshot(Some(since)), now));

        let condition = Condition::DownDuration { secs: 20 };
        assert!(!evaluate(&condition, &snapshot(Some(since)), now));
    }

    #[test]
    fn and_requires_all_children() {
        let now = Utc::now();
        let snap = snapshot(Some(now - chrono::Duration::seconds(100)));
        let condition = Condition::And(vec![
            Condition::DownDuration { secs: 10 },
            Condition::DownDuration { secs: 1000 },
        ]);
        assert!(!evaluate(&condition, &snap, now));
    }

    #[test]
    fn isp_scope_detection_recurses_into_and() {
        let condition = Condition::And(vec![Condition::ScopeIsp {
            inner: Box::new(Condition::DownDuration { secs: 1 }),
        }]);
        assert!(is_isp_scoped(&condition));
        assert!(!is_isp_scoped(&Condition::DownDuration { secs: 1 }));
    }

    #[test]
    fn response_time_uses_tail_average_of_recent_samples() {
        let now = Utc::now();
        let mut snap = snapshot(None);
        snap.recent_rtt_ms = vec![10.0, 10.0, 500.0, 500.0];
        let condition = Condition::ResponseTime {
            over_ms: 100.0,
            samples: 2,
        };
        assert!(evaluate(&condition, &snap, now));

        let condition = Condition::ResponseTime {
            over_ms: 100.0,
            samples: 4,
        };
        assert!(!evaluate(&condition, &snap, now));
    }

    #[test]
    fn severity_escalates_but_caps_at_critical() {
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    async fn test_engine() -> AlertEngine {
        let conn = sea_orm::Database::connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:");
        let schema = sea_orm::Schema::new(sea_orm::DatabaseBackend::Sqlite);
        for stmt in [
            schema.create_table_from_entity(alert_rules::Entity),
            schema.create_table_from_entity(active_problems::Entity),
            schema.create_table_from_entity(alert_history::Entity),
            schema.create_table_from_entity(maintenance_windows::Entity),
        ] {
            sea_orm::ConnectionTrait::execute(
                &conn,
                sea_orm::ConnectionTrait::get_database_backend(&conn).build(&stmt),
            )
            .await
            .expect("create table");
        }
        AlertEngine::new(conn)
    }

    fn rule(id: &str, depends_on: Option<&str>) -> alert_rules::Model {
        let now = Utc::now().to_rfc3339();
        alert_rules::Model {
            id: id.to_string(),
            name: format!("rule-{id}"),
            condition: serde_json::to_string(&Condition::DownDuration { secs: 0 }).unwrap(),
            severity: "high".to_string(),
            depends_on_rule_id: depends_on.map(str::to_string),
            enabled: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn evaluate_rule_opens_then_re_triggers_in_place_then_resolves() {
        let engine = test_engine().await;
        let rule = rule("r1", None);
        let down_since = Utc::now() - chrono::Duration::seconds(10);
        let down = snapshot(Some(down_since));

        let t0 = Utc::now();
        let opened = engine
            .evaluate_rule(&rule, &Condition::DownDuration { secs: 0 }, &down, None, false, t0)
            .await
            .unwrap()
            .expect("fires and opens a row");

        let t1 = t0 + chrono::Duration::seconds(30);
        let retriggered = engine
            .evaluate_rule(&rule, &Condition::DownDuration { secs: 0 }, &down, None, false, t1)
            .await
            .unwrap()
            .expect("still firing, re-triggers the same row");
        assert_eq!(opened, retriggered, "re-trigger must not create a second row");

        let open_row = active_problems::Entity::find_by_id(&opened)
            .one(&engine.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open_row.event_count, 2);

        let up = snapshot(None);
        let t2 = t1 + chrono::Duration::seconds(30);
        let resolved = engine
            .evaluate_rule(&rule, &Condition::DownDuration { secs: 0 }, &up, None, false, t2)
            .await
            .unwrap();
        assert!(resolved.is_none(), "recovery closes the row");

        let history = alert_history::Entity::find().all(&engine.db).await.unwrap();
        let event_types: Vec<&str> = history.iter().map(|h| h.event_type.as_str()).collect();
        assert_eq!(event_types, vec!["triggered", "resolved"]);
    }

    #[tokio::test]
    async fn is_suppressed_true_inside_an_active_maintenance_window() {
        let engine = test_engine().await;
        let rule = rule("r1", None);
        let now = Utc::now();

        maintenance_windows::ActiveModel {
            id: Set("mw1".to_string()),
            device_id: Set(Some("dev-1".to_string())),
            branch_id: Set(None),
            starts_at: Set((now - chrono::Duration::hours(1)).to_rfc3339()),
            ends_at: Set((now + chrono::Duration::hours(1)).to_rfc3339()),
            reason: Set(Some("planned upgrade".to_string())),
            created_at: Set(now.to_rfc3339()),
        }
        .insert(&engine.db)
        .await
        .unwrap();

        assert!(engine.is_suppressed(&rule, "dev-1", None, now).await.unwrap());
        assert!(!engine.is_suppressed(&rule, "dev-2", None, now).await.unwrap());
    }

    #[tokio::test]
    async fn is_suppressed_true_when_parent_rule_already_firing() {
        let engine = test_engine().await;
        let parent = rule("parent", None);
        let child = rule("child", Some("parent"));
        let now = Utc::now();
        let down = snapshot(Some(now - chrono::Duration::seconds(10)));

        engine
            .evaluate_rule(&parent, &Condition::DownDuration { secs: 0 }, &down, None, false, now)
            .await
            .unwrap();

        assert!(engine.is_suppressed(&child, "dev-1", None, now).await.unwrap());
    }

    #[tokio::test]
    async fn evaluate_fleet_skips_disabled_rules_and_counts_only_open_problems() {
        let engine = test_engine().await;
        let mut disabled = rule("r-disabled", None);
        disabled.enabled = false;
        let enabled = rule("r-enabled", None);
        let now = Utc::now();
        let down = snapshot(Some(now - chrono::Duration::seconds(10)));
        let up = snapshot(None);

        let rules = vec![
            (disabled, Condition::DownDuration { secs: 0 }),
            (enabled, Condition::DownDuration { secs: 0 }),
        ];
        let snapshots = vec![
            (down, None),
            ({
                let mut s = up;
                s.device_id = "dev-2".to_string();
                s
            }, None),
        ];

        let open_count = engine.evaluate_fleet(&rules, &snapshots, now).await.unwrap();
        assert_eq!(open_count, 1, "only dev-1 is down, and only the enabled rule fires");
    }

    #[test]
    fn flap_scope_detection_recurses_into_and() {
        let condition = Condition::And(vec![Condition::StatusChanges {
            k: 3,
            window_secs: 300,
        }]);
        assert!(is_flap_scoped(&condition));
        assert!(!is_flap_scoped(&Condition::DownDuration { secs: 1 }));
    }

    #[tokio::test]
    async fn flapping_device_forces_down_duration_problems_suppressed() {
        let engine = test_engine().await;
        let rule = rule("r1", None);
        let now = Utc::now();
        let mut flapping_down = snapshot(Some(now - chrono::Duration::seconds(10)));
        flapping_down.is_flapping = true;

        engine
            .evaluate_fleet(
                &[(rule, Condition::DownDuration { secs: 0 })],
                &[(flapping_down, None)],
                now,
            )
            .await
            .unwrap();

        let open = active_problems::Entity::find().all(&engine.db).await.unwrap();
        assert_eq!(open.len(), 1, "the down problem still opens, but suppressed");
        assert!(open[0].suppressed, "flapping must suppress per-occurrence down/up problems");
    }

    #[tokio::test]
    async fn flapping_device_does_not_suppress_the_flap_detector_rule_itself() {
        let engine = test_engine().await;
        let rule = rule("r1", None);
        let now = Utc::now();
        let mut flapping = snapshot(None);
        flapping.is_flapping = true;

        engine
            .evaluate_fleet(
                &[(
                    rule,
                    Condition::StatusChanges {
                        k: 3,
                        window_secs: 300,
                    },
                )],
                &[(flapping, None)],
                now,
            )
            .await
            .unwrap();

        let open = active_problems::Entity::find().all(&engine.db).await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(!open[0].suppressed, "the flapping problem itself must stay live");
    }
}
