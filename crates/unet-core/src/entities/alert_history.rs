//! Append-only journal of alert lifecycle events (triggered / resolved /
//! suppressed). Never updated or deduplicated, unlike `active_problem`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub problem_id: String,
    pub rule_id: String,
    pub device_id: String,
    pub interface_id: Option<String>,
    pub severity: String,
    /// triggered, resolved, suppressed, escalated
    pub event_type: String,
    pub message: String,
    pub occurred_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::active_problems::Entity",
        from = "Column::ProblemId",
        to = "super::active_problems::Column::Id"
    )]
    ActiveProblem,
}

impl Related<super::active_problems::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActiveProblem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
