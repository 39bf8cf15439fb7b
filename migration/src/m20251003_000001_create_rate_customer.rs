use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Negotiated customer rates, partly maintained by rule-driven sync
        manager
            .create_table(
                Table::create()
                    .table(RateCustomer::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateCustomer::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RateCustomer::Region).string_len(32).not_null())
                    .col(ColumnDef::new(RateCustomer::Cp).string_len(32).not_null())
                    .col(ColumnDef::new(RateCustomer::SchoolName).string_len(128).not_null())
                    .col(ColumnDef::new(RateCustomer::CustomerFee).double().null())
                    .col(ColumnDef::new(RateCustomer::NetworkLineFee).double().null())
                    .col(ColumnDef::new(RateCustomer::GeneralFee).double().null())
                    .col(
                        ColumnDef::new(RateCustomer::FeeMode)
                            .string_len(16)
                            .not_null()
                            .default("auto"),
                    )
                    .col(
                        ColumnDef::new(RateCustomer::Extra)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(RateCustomer::LastSyncTime).timestamp().null())
                    .col(ColumnDef::new(RateCustomer::LastSyncRuleId).big_integer().null())
                    .col(
                        ColumnDef::new(RateCustomer::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(RateCustomer::UpdatedAt)
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
                    .name("uniq_rate_customer_region_cp_school")
                    .table(RateCustomer::Table)
                    .col(RateCustomer::Region)
                    .col(RateCustomer::Cp)
                    .col(RateCustomer::SchoolName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RateCustomerSyncRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RateCustomerSyncRules::Name).string_len(128).not_null())
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RateCustomerSyncRules::ScopeRegion).json_binary().null())
                    .col(ColumnDef::new(RateCustomerSyncRules::ScopeCp).json_binary().null())
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::FieldsToUpdate)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::OverwriteStrategy)
                            .string_len(16)
                            .not_null()
                            .default("always"),
                    )
                    .col(ColumnDef::new(RateCustomerSyncRules::Actions).json_binary().not_null())
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(RateCustomerSyncRules::UpdatedAt)
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
                    .name("idx_rate_customer_sync_rules_priority")
                    .table(RateCustomerSyncRules::Table)
                    .col(RateCustomerSyncRules::Enabled)
                    .col(RateCustomerSyncRules::Priority)
                    .to_owned(),
            )
            .await?;

        // Registered schema for keys in rate_customer.extra
        manager
            .create_table(
                Table::create()
                    .table(RateCustomerFieldDefs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::FieldKey)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(RateCustomerFieldDefs::Label).string_len(128).not_null())
                    .col(ColumnDef::new(RateCustomerFieldDefs::DataType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::UsableInRules)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(RateCustomerFieldDefs::Min).double().null())
                    .col(ColumnDef::new(RateCustomerFieldDefs::Max).double().null())
                    .col(ColumnDef::new(RateCustomerFieldDefs::EnumOptions).json_binary().null())
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(RateCustomerFieldDefs::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RateCustomerFieldDefs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RateCustomerSyncRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RateCustomer::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum RateCustomer {
    Table,
    Id,
    Region,
    Cp,
    SchoolName,
    CustomerFee,
    NetworkLineFee,
    GeneralFee,
    FeeMode,
    Extra,
    LastSyncTime,
    LastSyncRuleId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RateCustomerSyncRules {
    Table,
    Id,
    Name,
    Enabled,
    Priority,
    ScopeRegion,
    ScopeCp,
    FieldsToUpdate,
    OverwriteStrategy,
    Actions,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RateCustomerFieldDefs {
    Table,
    Id,
    FieldKey,
    Label,
    DataType,
    Enabled,
    UsableInRules,
    Min,
    Max,
    EnumOptions,
    CreatedAt,
    UpdatedAt,
}
