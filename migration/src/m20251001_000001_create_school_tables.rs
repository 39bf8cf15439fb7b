use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // School directory: one row per school with its registered region/cp
        manager
            .create_table(
                Table::create()
                    .table(School::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(School::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(School::SchoolId).string_len(64).not_null())
                    .col(ColumnDef::new(School::SchoolName).string_len(255).not_null())
                    .col(ColumnDef::new(School::Region).string_len(64).not_null())
                    .col(ColumnDef::new(School::Cp).string_len(64).not_null())
                    .col(
                        ColumnDef::new(School::UpdateTime)
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
                    .name("idx_school_school_id")
                    .table(School::Table)
                    .col(School::SchoolId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_school_region_cp")
                    .table(School::Table)
                    .col(School::Region)
                    .col(School::Cp)
                    .to_owned(),
            )
            .await?;

        // Raw traffic samples, externally ingested at a fixed interval
        manager
            .create_table(
                Table::create()
                    .table(SchoolTraffic::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SchoolTraffic::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SchoolTraffic::CreateTime).timestamp().not_null())
                    .col(ColumnDef::new(SchoolTraffic::SchoolId).string_len(64).not_null())
                    .col(ColumnDef::new(SchoolTraffic::SchoolName).string_len(255).not_null())
                    .col(ColumnDef::new(SchoolTraffic::Region).string_len(64).not_null())
                    .col(ColumnDef::new(SchoolTraffic::Cp).string_len(64).not_null())
                    .col(
                        ColumnDef::new(SchoolTraffic::TotalRecv)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SchoolTraffic::TotalSend)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Daily scans always filter by school and time window
        manager
            .create_index(
                Index::create()
                    .name("idx_school_traffic_school_time")
                    .table(SchoolTraffic::Table)
                    .col(SchoolTraffic::SchoolId)
                    .col(SchoolTraffic::CreateTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SchoolTraffic::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(School::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum School {
    Table,
    Id,
    SchoolId,
    SchoolName,
    Region,
    Cp,
    UpdateTime,
}

#[derive(Iden)]
enum SchoolTraffic {
    Table,
    Id,
    CreateTime,
    SchoolId,
    SchoolName,
    Region,
    Cp,
    TotalRecv,
    TotalSend,
}
