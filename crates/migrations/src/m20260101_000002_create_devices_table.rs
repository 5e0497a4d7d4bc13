use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Device::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Device::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Device::Name).string().not_null())
                    .col(ColumnDef::new(Device::IpAddress).string().not_null())
                    .col(ColumnDef::new(Device::Classification).string().not_null())
                    .col(ColumnDef::new(Device::Vendor).string())
                    .col(ColumnDef::new(Device::Model).string())
                    .col(ColumnDef::new(Device::BranchId).string())
                    .col(
                        ColumnDef::new(Device::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Device::MonitoringMode)
                            .string()
                            .not_null()
                            .default("ping_and_snmp"),
                    )
                    .col(
                        ColumnDef::new(Device::SnmpVersion)
                            .string()
                            .not_null()
                            .default("v2c"),
                    )
                    .col(
                        ColumnDef::new(Device::SnmpPort)
                            .integer()
                            .not_null()
                            .default(161),
                    )
                    .col(ColumnDef::new(Device::CredentialRef).string())
                    .col(ColumnDef::new(Device::Description).string())
                    .col(
                        ColumnDef::new(Device::IsIspRouter)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Device::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Device::UpdatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_branch")
                            .from(Device::Table, Device::BranchId)
                            .to(Alias::new("branch"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_ip_address")
                    .table(Device::Table)
                    .col(Device::IpAddress)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_branch")
                    .table(Device::Table)
                    .col(Device::BranchId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_classification")
                    .table(Device::Table)
                    .col(Device::Classification)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_enabled")
                    .table(Device::Table)
                    .col(Device::Enabled)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Device::Table).to_owned())
            .await
    }
}

/// Static device identity and monitoring configuration. Current reachability
/// state lives in `device_state`, one row per device (see the next migration).
#[derive(DeriveIden)]
pub(crate) enum Device {
    Table,
    Id,
    Name,
    IpAddress,
    Classification,
    Vendor,
    Model,
    BranchId,
    Enabled,
    MonitoringMode,
    SnmpVersion,
    SnmpPort,
    CredentialRef,
    Description,
    IsIspRouter,
    CreatedAt,
    UpdatedAt,
}
