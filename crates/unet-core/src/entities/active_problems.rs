//! Deduplicated "is this alert currently firing" rows, unique per
//! (rule, device, interface). Re-triggering after resolution clears
//! `resolved_at` and bumps `event_count` in place rather than inserting a
//! new row — this is the dedup mechanism the alert engine relies on.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "active_problem")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub interface_id: Option<String>,
    pub severity: String,
    pub first_triggered_at: String,
    pub last_seen_at: String,
    pub resolved_at: Option<String>,
    pub suppressed: bool,
    pub suppressed_reason: Option<String>,
    pub event_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert_rules::Entity",
        from = "Column::RuleId",
        to = "super::alert_rules::Column::Id"
    )]
    AlertRule,
    #[sea_orm(
        belongs_to = "super::devices::Entity",
        from = "Column::DeviceId",
        to = "super::devices::Column::Id"
    )]
    Device,
}

impl Related<super::alert_rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertRule.def()
    }
}

impl Related<super::devices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
