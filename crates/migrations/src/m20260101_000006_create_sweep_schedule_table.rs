use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SweepSchedule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SweepSchedule::JobName)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SweepSchedule::NextFireAt).text())
                    .col(ColumnDef::new(SweepSchedule::LastFiredDate).text())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SweepSchedule::Table).to_owned())
            .await
    }
}

/// Persisted scheduler state (§4.1): one row per named job, so a restart
/// resumes the `next = max(prev+period, now)` sequence instead of
/// re-firing a slot that already ran, or firing a daily job twice in
/// one day.
#[derive(DeriveIden)]
enum SweepSchedule {
    Table,
    JobName,
    NextFireAt,
    LastFiredDate,
}
