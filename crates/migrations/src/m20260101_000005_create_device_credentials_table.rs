use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeviceCredential::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceCredential::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceCredential::DeviceId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceCredential::Ciphertext)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceCredential::Nonce).text().not_null())
                    .col(
                        ColumnDef::new(DeviceCredential::Algorithm)
                            .text()
                            .not_null()
                            .default("aes-256-gcm"),
                    )
                    .col(ColumnDef::new(DeviceCredential::CreatedAt).text().not_null())
                    .col(ColumnDef::new(DeviceCredential::RotatedAt).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_credential_device_id")
                    .table(DeviceCredential::Table)
                    .col(DeviceCredential::DeviceId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeviceCredential::Table).to_owned())
            .await
    }
}

/// Encrypted SNMP community string / v3 auth+priv secrets, one row per device.
/// `ciphertext` is the AES-256-GCM sealed JSON payload; the master key never
/// touches this table.
#[derive(DeriveIden)]
enum DeviceCredential {
    Table,
    Id,
    DeviceId,
    Ciphertext,
    Nonce,
    Algorithm,
    CreatedAt,
    RotatedAt,
}
