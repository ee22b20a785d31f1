use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LatestImage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LatestImage::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LatestImage::ImageB64).text().not_null())
                    .col(
                        ColumnDef::new(LatestImage::Prompt)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(LatestImage::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LatestImage::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LatestImage {
    Table,
    Key,
    #[sea_orm(iden = "image_b64")]
    ImageB64,
    Prompt,
    UpdatedAt,
}
