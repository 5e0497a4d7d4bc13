//! `GET /problems`: the open active-problem list (§4.6, §4.7).

use axum::extract::{Query, State};
use axum::response::Json;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use unet_core::entities::{active_problems, alert_rules, device_state};

use crate::handlers::ServerResult;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListProblemsQuery {
    /// `?active=true` is the only supported filter; present for contract
    /// symmetry with a future `active=false` (resolved history) view.
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ProblemEntry {
    pub id: String,
    pub device_id: String,
    pub rule_name: String,
    pub severity: String,
    pub first_triggered: String,
    pub suppressed: bool,
    pub is_flapping: bool,
}

/// # Errors
/// Returns an error if the query fails.
pub async fn list_problems(
    State(app_state): State<AppState>,
    Query(query): Query<ListProblemsQuery>,
) -> ServerResult<Json<Vec<ProblemEntry>>> {
    let mut finder = active_problems::Entity::find().order_by_desc(active_problems::Column::FirstTriggeredAt);
    if query.active.unwrap_or(true) {
        finder = finder.filter(active_problems::Column::ResolvedAt.is_null());
    }
    let rows = finder.find_also_related(alert_rules::Entity).all(&app_state.db).await?;

    let mut out = Vec::with_capacity(rows.len());
    for (problem, rule) in rows {
        let is_flapping = device_state::Entity::find()
            .filter(device_state::Column::DeviceId.eq(problem.device_id.clone()))
            .one(&app_state.db)
            .await?
            .is_some_and(|s| s.is_flapping);

        out.push(ProblemEntry {
            id: problem.id,
            device_id: problem.device_id,
            rule_name: rule.map_or(problem.rule_id, |r| r.name),
            severity: problem.severity,
            first_triggered: problem.first_triggered_at,
            suppressed: problem.suppressed,
            is_flapping,
        });
    }
    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use unet_core::entities::devices;

    async fn seed_device(app_state: &AppState, id: &str) {
        let now = Utc::now().to_rfc3339();
        devices::ActiveModel {
            id: Set(id.to_string()),
            name: Set(format!("device-{id}")),
            ip_address: Set(format!("10.0.0.{id}", id = id)),
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

    async fn seed_problem(app_state: &AppState, resolved: bool) {
        let now = Utc::now().to_rfc3339();
        alert_rules::ActiveModel {
            id: Set("r1".to_string()),
            name: Set("Device Down".to_string()),
            condition: Set("{}".to_string()),
            severity: Set("High".to_string()),
            depends_on_rule_id: Set(None),
            enabled: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
        }
        .insert(&app_state.db)
        .await
        .unwrap();
        active_problems::ActiveModel {
            id: Set("p1".to_string()),
            rule_id: Set("r1".to_string()),
            device_id: Set("d1".to_string()),
            interface_id: Set(None),
            severity: Set("High".to_string()),
            first_triggered_at: Set(now.clone()),
            last_seen_at: Set(now.clone()),
            resolved_at: Set(resolved.then_some(now)),
            suppressed: Set(false),
            suppressed_reason: Set(None),
            event_count: Set(1),
        }
        .insert(&app_state.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn active_filter_excludes_resolved_problems() {
        let app_state = create_mock_app_state().await;
        seed_device(&app_state, "1").await;
        seed_problem(&app_state, true).await;

        let Json(problems) = list_problems(
            State(app_state),
            Query(ListProblemsQuery { active: Some(true) }),
        )
        .await
        .unwrap();
        assert!(problems.is_empty(), "resolved problems are not active");
    }

    #[tokio::test]
    async fn open_problem_resolves_rule_name_from_join() {
        let app_state = create_mock_app_state().await;
        seed_device(&app_state, "1").await;
        seed_problem(&app_state, false).await;

        let Json(problems) = list_problems(
            State(app_state),
            Query(ListProblemsQuery { active: Some(true) }),
        )
        .await
        .unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].rule_name, "Device Down");
        assert_eq!(problems[0].device_id, "d1");
    }
}
