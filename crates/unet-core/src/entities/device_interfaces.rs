//! One row per IF-MIB interface discovered on a device: identity fields from
//! the discovery walk plus the metrics last observed during a metrics sweep.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "device_interface")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub device_id: String,
    pub if_index: i32,
    pub if_descr: String,
    pub if_name: Option<String>,
    pub if_alias: Option<String>,
    pub if_type: i32,
    pub if_speed: Option<i64>,
    /// Classifier output: isp, trunk, access, server_link, branch_link,
    /// management, loopback, voice, camera, unclassified.
    pub interface_class: String,
    pub isp_provider: Option<String>,
    pub is_critical: bool,
    pub classification_confidence: f64,
    pub admin_status: String,
    pub oper_status: String,
    pub in_octets: Option<i64>,
    pub out_octets: Option<i64>,
    pub in_errors: Option<i64>,
    pub out_errors: Option<i64>,
    pub in_discards: Option<i64>,
    pub out_discards: Option<i64>,
    pub last_seen_at: String,
    pub last_status_change_at: Option<String>,
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
