use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Singleton schedule row, created lazily on first save
        manager
            .create_table(
                Table::create()
                    .table(SettlementConfig::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SettlementConfig::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SettlementConfig::DailyTime).string_len(5).not_null())
                    .col(ColumnDef::new(SettlementConfig::WeeklyDay).integer().not_null())
                    .col(ColumnDef::new(SettlementConfig::WeeklyTime).string_len(5).not_null())
                    .col(
                        ColumnDef::new(SettlementConfig::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(SettlementConfig::LastExecuteTime).timestamp().null())
                    .col(
                        ColumnDef::new(SettlementConfig::UpdateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SettlementTask::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SettlementTask::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SettlementTask::TaskType).string_len(16).not_null())
                    .col(ColumnDef::new(SettlementTask::TaskDate).date().not_null())
                    .col(ColumnDef::new(SettlementTask::EndDate).date().not_null())
                    .col(ColumnDef::new(SettlementTask::Status).string_len(16).not_null())
                    .col(ColumnDef::new(SettlementTask::StartTime).timestamp().null())
                    .col(ColumnDef::new(SettlementTask::EndTime).timestamp().null())
                    .col(
                        ColumnDef::new(SettlementTask::ProcessedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SettlementTask::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SettlementTask::CreateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(SettlementTask::UpdateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Dispatch dedup looks tasks up by (type, date)
        manager
            .create_index(
                Index::create()
                    .name("idx_settlement_task_type_date")
                    .table(SettlementTask::Table)
                    .col(SettlementTask::TaskType)
                    .col(SettlementTask::TaskDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SettlementTask::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SettlementConfig::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SettlementConfig {
    Table,
    Id,
    DailyTime,
    WeeklyDay,
    WeeklyTime,
    Enabled,
    LastExecuteTime,
    UpdateTime,
}

#[derive(Iden)]
enum SettlementTask {
    Table,
    Id,
    TaskType,
    TaskDate,
    EndDate,
    Status,
    StartTime,
    EndTime,
    ProcessedCount,
    ErrorMessage,
    CreateTime,
    UpdateTime,
}
