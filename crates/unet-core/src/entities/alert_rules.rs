//! Alert rule definitions. `condition` holds the serialized tagged-variant
//! Condition AST (see `crate::alerting::condition`), never a free-form string.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_rule")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub condition: String,
    pub severity: String,
    /// Another rule id this one is suppressed by when that rule has an open problem.
    pub depends_on_rule_id: Option<String>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::active_problems::Entity")]
    ActiveProblems,
}

impl Related<super::active_problems::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActiveProblems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
