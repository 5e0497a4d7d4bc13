//! Static device identity and monitoring configuration.
//!
//! Current reachability lives in [`super::device_state`], one row per device,
//! so that reads against "is this device up" never need to join through the
//! larger identity row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "device")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    #[sea_orm(column_name = "ip_address")]
    pub ip_address: String,
    /// One of atm, ap, router, switch, nvr, other.
    pub classification: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub branch_id: Option<String>,
    pub enabled: bool,
    /// ping_only, snmp_only, ping_and_snmp
    pub monitoring_mode: String,
    pub snmp_version: String,
    pub snmp_port: i32,
    /// Opaque reference into `device_credentials`; `None` means no SNMP credential on file.
    pub credential_ref: Option<String>,
    pub description: Option<String>,
    /// Operator-asserted: this device is a branch's ISP-facing router.
    /// Cross-checked against classified ISP interfaces at alert-evaluation
    /// time; disagreement is logged, not silently overridden.
    pub is_isp_router: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::branches::Entity",
        from = "Column::BranchId",
        to = "super::branches::Column::Id"
    )]
    Branch,
    #[sea_orm(has_one = "super::device_state::Entity")]
    DeviceState,
    #[sea_orm(has_many = "super::device_interfaces::Entity")]
    DeviceInterfaces,
    #[sea_orm(has_many = "super::ping_samples::Entity")]
    PingSamples,
    #[sea_orm(has_one = "super::device_credentials::Entity")]
    DeviceCredential,
}

impl Related<super::branches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl Related<super::device_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeviceState.def()
    }
}

impl Related<super::device_interfaces::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeviceInterfaces.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
