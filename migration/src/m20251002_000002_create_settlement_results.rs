use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Cached billing results, recomputed in place
        manager
            .create_table(
                Table::create()
                    .table(SettlementResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SettlementResults::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SettlementResults::FormulaId).big_integer().not_null())
                    .col(ColumnDef::new(SettlementResults::FormulaName).string_len(128).not_null())
                    .col(ColumnDef::new(SettlementResults::FormulaTokens).json_binary().not_null())
                    .col(ColumnDef::new(SettlementResults::Region).string_len(64).not_null())
                    .col(ColumnDef::new(SettlementResults::Cp).string_len(64).not_null())
                    .col(ColumnDef::new(SettlementResults::SchoolId).string_len(64).not_null())
                    .col(ColumnDef::new(SettlementResults::SchoolName).string_len(255).not_null())
                    .col(ColumnDef::new(SettlementResults::StartDate).date().not_null())
                    .col(ColumnDef::new(SettlementResults::EndDate).date().not_null())
                    .col(ColumnDef::new(SettlementResults::BillingDays).integer().not_null())
                    .col(ColumnDef::new(SettlementResults::Total95Flow).double().not_null())
                    .col(ColumnDef::new(SettlementResults::Average95Flow).double().not_null())
                    .col(ColumnDef::new(SettlementResults::CustomerFee).double().null())
                    .col(ColumnDef::new(SettlementResults::NetworkLineFee).double().null())
                    .col(ColumnDef::new(SettlementResults::GeneralFee).double().null())
                    .col(ColumnDef::new(SettlementResults::NodeDeductionFee).double().null())
                    .col(ColumnDef::new(SettlementResults::FinalFee).double().null())
                    .col(
                        ColumnDef::new(SettlementResults::Amount)
                            .decimal_len(20, 2) // numeric(20,2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SettlementResults::AmountRaw).double().not_null())
                    .col(
                        ColumnDef::new(SettlementResults::Currency)
                            .string_len(8)
                            .not_null()
                            .default("CNY"),
                    )
                    .col(ColumnDef::new(SettlementResults::MissingDays).integer().not_null())
                    .col(ColumnDef::new(SettlementResults::MissingFields).json_binary().not_null())
                    .col(
                        ColumnDef::new(SettlementResults::CalculationDetail)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SettlementResults::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(SettlementResults::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_settlement_results_natural_key")
                    .table(SettlementResults::Table)
                    .col(SettlementResults::Region)
                    .col(SettlementResults::Cp)
                    .col(SettlementResults::SchoolId)
                    .col(SettlementResults::StartDate)
                    .col(SettlementResults::EndDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SettlementResults::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SettlementResults {
    Table,
    Id,
    FormulaId,
    FormulaName,
    FormulaTokens,
    Region,
    Cp,
    SchoolId,
    SchoolName,
    StartDate,
    EndDate,
    BillingDays,
    #[iden = "total_95_flow"]
    Total95Flow,
    #[iden = "average_95_flow"]
    Average95Flow,
    CustomerFee,
    NetworkLineFee,
    GeneralFee,
    NodeDeductionFee,
    FinalFee,
    Amount,
    AmountRaw,
    Currency,
    MissingDays,
    MissingFields,
    CalculationDetail,
    CreatedAt,
    UpdatedAt,
}
