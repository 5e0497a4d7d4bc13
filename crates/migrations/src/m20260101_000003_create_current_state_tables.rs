use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // device_state: the authoritative "is it up right now" row, one per device.
        manager
            .create_table(
                Table::create()
                    .table(DeviceState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceState::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceState::DeviceId).text().not_null())
                    .col(
                        ColumnDef::new(DeviceState::Reachable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(DeviceState::DownSince).text())
                    .col(
                        ColumnDef::new(DeviceState::IsFlapping)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(DeviceState::TransitionHistory).text())
                    .col(ColumnDef::new(DeviceState::LastProbeAt).text())
                    .col(ColumnDef::new(DeviceState::RttMs).double())
                    .col(ColumnDef::new(DeviceState::LossPct).double())
                    .col(ColumnDef::new(DeviceState::LastSnmpSuccessAt).text())
                    .col(ColumnDef::new(DeviceState::LastError).text())
                    .col(
                        ColumnDef::new(DeviceState::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DeviceState::UpdatedAt).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_state_device_id")
                    .table(DeviceState::Table)
                    .col(DeviceState::DeviceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_state_reachable")
                    .table(DeviceState::Table)
                    .col(DeviceState::Reachable)
                    .to_owned(),
            )
            .await?;

        // device_interfaces: identity + current metrics for one IF-MIB interface.
        manager
            .create_table(
                Table::create()
                    .table(DeviceInterface::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceInterface::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceInterface::DeviceId).text().not_null())
                    .col(
                        ColumnDef::new(DeviceInterface::IfIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceInterface::IfDescr).text().not_null())
                    .col(ColumnDef::new(DeviceInterface::IfName).text())
                    .col(ColumnDef::new(DeviceInterface::IfAlias).text())
                    .col(ColumnDef::new(DeviceInterface::IfType).integer().not_null())
                    .col(ColumnDef::new(DeviceInterface::IfSpeed).big_integer())
                    .col(
                        ColumnDef::new(DeviceInterface::InterfaceClass)
                            .text()
                            .not_null()
                            .default("unclassified"),
                    )
                    .col(ColumnDef::new(DeviceInterface::IspProvider).text())
                    .col(
                        ColumnDef::new(DeviceInterface::IsCritical)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DeviceInterface::ClassificationConfidence)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(DeviceInterface::AdminStatus)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(
                        ColumnDef::new(DeviceInterface::OperStatus)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(DeviceInterface::InOctets).big_integer())
                    .col(ColumnDef::new(DeviceInterface::OutOctets).big_integer())
                    .col(ColumnDef::new(DeviceInterface::InErrors).big_integer())
                    .col(ColumnDef::new(DeviceInterface::OutErrors).big_integer())
                    .col(ColumnDef::new(DeviceInterface::InDiscards).big_integer())
                    .col(ColumnDef::new(DeviceInterface::OutDiscards).big_integer())
                    .col(ColumnDef::new(DeviceInterface::LastSeenAt).text().not_null())
                    .col(ColumnDef::new(DeviceInterface::LastStatusChangeAt).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_interface_device_index")
                    .table(DeviceInterface::Table)
                    .col(DeviceInterface::DeviceId)
                    .col(DeviceInterface::IfIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_interface_isp")
                    .table(DeviceInterface::Table)
                    .col(DeviceInterface::InterfaceClass)
                    .to_owned(),
            )
            .await?;

        // ping_samples: optional short rolling log, debug-only, not read by the engine.
        manager
            .create_table(
                Table::create()
                    .table(PingSample::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PingSample::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PingSample::DeviceId).text().not_null())
                    .col(ColumnDef::new(PingSample::ProbedAt).text().not_null())
                    .col(ColumnDef::new(PingSample::Reachable).boolean().not_null())
                    .col(ColumnDef::new(PingSample::RttMs).double())
                    .col(ColumnDef::new(PingSample::LossPct).double().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ping_sample_device_probed")
                    .table(PingSample::Table)
                    .col(PingSample::DeviceId)
                    .col(PingSample::ProbedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PingSample::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeviceInterface::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeviceState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeviceState {
    Table,
    Id,
    DeviceId,
    Reachable,
    DownSince,
    IsFlapping,
    TransitionHistory,
    LastProbeAt,
    RttMs,
    LossPct,
    LastSnmpSuccessAt,
    LastError,
    ConsecutiveFailures,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeviceInterface {
    Table,
    Id,
    DeviceId,
    IfIndex,
    IfDescr,
    IfName,
    IfAlias,
    IfType,
    IfSpeed,
    InterfaceClass,
    IspProvider,
    IsCritical,
    ClassificationConfidence,
    AdminStatus,
    OperStatus,
    InOctets,
    OutOctets,
    InErrors,
    OutErrors,
    InDiscards,
    OutDiscards,
    LastSeenAt,
    LastStatusChangeAt,
}

#[derive(DeriveIden)]
enum PingSample {
    Table,
    Id,
    DeviceId,
    ProbedAt,
    Reachable,
    RttMs,
    LossPct,
}
