use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SchoolSettlement::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SchoolSettlement::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SchoolSettlement::SchoolId).string_len(64).not_null())
                    .col(ColumnDef::new(SchoolSettlement::SchoolName).string_len(255).not_null())
                    .col(ColumnDef::new(SchoolSettlement::Region).string_len(64).not_null())
                    .col(ColumnDef::new(SchoolSettlement::Cp).string_len(64).not_null())
                    .col(
                        ColumnDef::new(SchoolSettlement::SettlementValue)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SchoolSettlement::SettlementTime).timestamp().not_null())
                    .col(ColumnDef::new(SchoolSettlement::SettlementDate).date().not_null())
                    .col(
                        ColumnDef::new(SchoolSettlement::CreateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(SchoolSettlement::UpdateTime)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Natural key: one daily value per region/cp/school/date
        manager
            .create_index(
                Index::create()
                    .name("uniq_school_settlement_natural_key")
                    .table(SchoolSettlement::Table)
                    .col(SchoolSettlement::Region)
                    .col(SchoolSettlement::Cp)
                    .col(SchoolSettlement::SchoolId)
                    .col(SchoolSettlement::SettlementDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_school_settlement_date")
                    .table(SchoolSettlement::Table)
                    .col(SchoolSettlement::SettlementDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SchoolSettlement::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SchoolSettlement {
    Table,
    Id,
    SchoolId,
    SchoolName,
    Region,
    Cp,
    SettlementValue,
    SettlementTime,
    SettlementDate,
    CreateTime,
    UpdateTime,
}
