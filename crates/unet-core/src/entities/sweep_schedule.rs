//! Persisted scheduler state: one row per named job, read and updated by
//! `crate::scheduler` to guarantee a restart resumes the next-fire sequence
//! rather than re-running a slot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sweep_schedule")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_name: String,
    /// Next allowed fire time for a period-based job (RFC3339).
    pub next_fire_at: Option<String>,
    /// Last calendar date (`YYYY-MM-DD`, UTC) a daily job fired.
    pub last_fired_date: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
