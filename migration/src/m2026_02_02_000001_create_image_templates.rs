//! Migration to create the image_templates table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImageTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImageTemplates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImageTemplates::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ImageTemplates::Name).text().not_null())
                    .col(ColumnDef::new(ImageTemplates::Width).integer().not_null())
                    .col(ColumnDef::new(ImageTemplates::Height).integer().not_null())
                    .col(ColumnDef::new(ImageTemplates::Background).text().null())
                    .col(
                        ColumnDef::new(ImageTemplates::Elements)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImageTemplates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ImageTemplates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_image_templates_tenant_id")
                            .from(ImageTemplates::Table, ImageTemplates::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImageTemplates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImageTemplates {
    Table,
    Id,
    TenantId,
    Name,
    Width,
    Height,
    Background,
    Elements,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
