//! The current-state store row for a single device: everything a read of
//! "is it up right now" needs, updated in place on every probe.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "device_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub device_id: String,
    pub reachable: bool,
    /// UTC timestamp the device was first observed down in the current outage, if any.
    pub down_since: Option<String>,
    pub is_flapping: bool,
    /// JSON-encoded ring buffer of recent Up/Down transition timestamps, used
    /// for flap detection. Bounded to the flap-detection window; never grows
    /// unbounded.
    pub transition_history: Option<String>,
    pub last_probe_at: Option<String>,
    pub rtt_ms: Option<f64>,
    pub loss_pct: Option<f64>,
    pub last_snmp_success_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::devices::Entity",
        from = "Column::DeviceId",
        to = "super::devices::Column::Id"
    )]
    Device,
}

impl Related<super::devices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
