use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SettlementFormulas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SettlementFormulas::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SettlementFormulas::Name).string_len(64).not_null())
                    .col(ColumnDef::new(SettlementFormulas::Description).string_len(255).null())
                    .col(
                        ColumnDef::new(SettlementFormulas::Tokens)
                            .json_binary() // jsonb
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SettlementFormulas::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(SettlementFormulas::UpdatedBy).string_len(64).null())
                    .col(
                        ColumnDef::new(SettlementFormulas::CreateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(SettlementFormulas::UpdateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Default formula lookup: enabled, most recently updated
        manager
            .create_index(
                Index::create()
                    .name("idx_settlement_formulas_enabled_update_time")
                    .table(SettlementFormulas::Table)
                    .col(SettlementFormulas::Enabled)
                    .col(SettlementFormulas::UpdateTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SettlementFormulas::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SettlementFormulas {
    Table,
    Id,
    Name,
    Description,
    Tokens,
    Enabled,
    UpdatedBy,
    CreateTime,
    UpdateTime,
}
