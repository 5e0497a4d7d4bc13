use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AlertRule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRule::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertRule::Name).text().not_null())
                    .col(ColumnDef::new(AlertRule::Condition).text().not_null())
                    .col(
                        ColumnDef::new(AlertRule::Severity)
                            .text()
                            .not_null()
                            .default("warning"),
                    )
                    .col(ColumnDef::new(AlertRule::DependsOnRuleId).text())
                    .col(
                        ColumnDef::new(AlertRule::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(AlertRule::CreatedAt).text().not_null())
                    .col(ColumnDef::new(AlertRule::UpdatedAt).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActiveProblem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActiveProblem::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActiveProblem::RuleId).text().not_null())
                    .col(ColumnDef::new(ActiveProblem::DeviceId).text().not_null())
                    .col(ColumnDef::new(ActiveProblem::InterfaceId).text())
                    .col(ColumnDef::new(ActiveProblem::Severity).text().not_null())
                    .col(
                        ColumnDef::new(ActiveProblem::FirstTriggeredAt)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActiveProblem::LastSeenAt).text().not_null())
                    .col(ColumnDef::new(ActiveProblem::ResolvedAt).text())
                    .col(
                        ColumnDef::new(ActiveProblem::Suppressed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ActiveProblem::SuppressedReason).text())
                    .col(
                        ColumnDef::new(ActiveProblem::EventCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_active_problem_scope")
                    .table(ActiveProblem::Table)
                    .col(ActiveProblem::RuleId)
                    .col(ActiveProblem::DeviceId)
                    .col(ActiveProblem::InterfaceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_active_problem_open")
                    .table(ActiveProblem::Table)
                    .col(ActiveProblem::ResolvedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertHistory::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertHistory::ProblemId).text().not_null())
                    .col(ColumnDef::new(AlertHistory::RuleId).text().not_null())
                    .col(ColumnDef::new(AlertHistory::DeviceId).text().not_null())
                    .col(ColumnDef::new(AlertHistory::InterfaceId).text())
                    .col(ColumnDef::new(AlertHistory::Severity).text().not_null())
                    .col(ColumnDef::new(AlertHistory::EventType).text().not_null())
                    .col(ColumnDef::new(AlertHistory::Message).text().not_null())
                    .col(ColumnDef::new(AlertHistory::OccurredAt).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alert_history_device_time")
                    .table(AlertHistory::Table)
                    .col(AlertHistory::DeviceId)
                    .col(AlertHistory::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MaintenanceWindow::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaintenanceWindow::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MaintenanceWindow::DeviceId).text())
                    .col(ColumnDef::new(MaintenanceWindow::BranchId).text())
                    .col(ColumnDef::new(MaintenanceWindow::StartsAt).text().not_null())
                    .col(ColumnDef::new(MaintenanceWindow::EndsAt).text().not_null())
                    .col(ColumnDef::new(MaintenanceWindow::Reason).text())
                    .col(ColumnDef::new(MaintenanceWindow::CreatedAt).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_maintenance_window_device")
                    .table(MaintenanceWindow::Table)
                    .col(MaintenanceWindow::DeviceId)
                    .col(MaintenanceWindow::StartsAt)
                    .col(MaintenanceWindow::EndsAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaintenanceWindow::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActiveProblem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRule::Table).to_owned())
            .await
    }
}

/// `condition` stores the serialized tagged-variant Condition AST (JSON).
#[derive(DeriveIden)]
enum AlertRule {
    Table,
    Id,
    Name,
    Condition,
    Severity,
    DependsOnRuleId,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

/// One row per (rule, device, interface) ever triggered; `resolved_at` is
/// cleared and `event_count` bumped when the condition re-triggers after
/// resolution, rather than inserting a new row.
#[derive(DeriveIden)]
enum ActiveProblem {
    Table,
    Id,
    RuleId,
    DeviceId,
    InterfaceId,
    Severity,
    FirstTriggeredAt,
    LastSeenAt,
    ResolvedAt,
    Suppressed,
    SuppressedReason,
    EventCount,
}

#[derive(DeriveIden)]
enum AlertHistory {
    Table,
    Id,
    ProblemId,
    RuleId,
    DeviceId,
    InterfaceId,
    Severity,
    EventType,
    Message,
    OccurredAt,
}

#[derive(DeriveIden)]
enum MaintenanceWindow {
    Table,
    Id,
    DeviceId,
    BranchId,
    StartsAt,
    EndsAt,
    Reason,
    CreatedAt,
}
