use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Branch::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Branch::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Branch::Name).string().not_null())
                    .col(ColumnDef::new(Branch::Code).string())
                    .col(ColumnDef::new(Branch::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Branch::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_branch_code")
                    .table(Branch::Table)
                    .col(Branch::Code)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Branch::Table).to_owned())
            .await
    }
}

/// Minimal branch registry. Full branch/site administration (hierarchy, contacts,
/// addresses) is out of scope here; devices only need a stable id to group by.
#[derive(DeriveIden)]
enum Branch {
    Table,
    Id,
    Name,
    Code,
    CreatedAt,
    UpdatedAt,
}
