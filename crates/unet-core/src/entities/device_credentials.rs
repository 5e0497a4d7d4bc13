//! Encrypted SNMP credential storage. `ciphertext` holds an AES-256-GCM
//! sealed JSON payload (community string, or v3 auth/priv secrets); the
//! master key lives outside the database entirely (see `crate::secrets`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "device_credential")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub device_id: String,
    #[sea_orm(column_type = "Text")]
    pub ciphertext: String,
    pub nonce: String,
    pub algorithm: String,
    pub created_at: String,
    pub rotated_at: Option<String>,
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
