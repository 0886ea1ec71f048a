//! Migration to create the tenants and tenant_members tables.
//!
//! A tenant has exactly one owner and an ordered member list. A member row
//! references either a user or, while the invitee has no account, a pending
//! email address.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tenants::Name).text().not_null())
                    .col(ColumnDef::new(Tenants::Slug).text().not_null())
                    .col(ColumnDef::new(Tenants::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Tenants::EmailFromAddress).text().null())
                    .col(ColumnDef::new(Tenants::EmailFromName).text().null())
                    .col(ColumnDef::new(Tenants::EmailReplyTo).text().null())
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenants_owner_id")
                            .from(Tenants::Table, Tenants::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_slug_unique")
                    .table(Tenants::Table)
                    .col(Tenants::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_owner_id")
                    .table(Tenants::Table)
                    .col(Tenants::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TenantMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantMembers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantMembers::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TenantMembers::UserId).uuid().null())
                    .col(ColumnDef::new(TenantMembers::Email).text().null())
                    .col(ColumnDef::new(TenantMembers::Role).text().not_null())
                    .col(
                        ColumnDef::new(TenantMembers::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TenantMembers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_members_tenant_id")
                            .from(TenantMembers::Table, TenantMembers::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_members_user_id")
                            .from(TenantMembers::Table, TenantMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A user may appear in a tenant's member list at most once. Pending
        // rows carry a NULL user_id and are not constrained.
        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_members_tenant_user_unique")
                    .table(TenantMembers::Table)
                    .col(TenantMembers::TenantId)
                    .col(TenantMembers::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_members_user_id")
                    .table(TenantMembers::Table)
                    .col(TenantMembers::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantMembers::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    Slug,
    OwnerId,
    EmailFromAddress,
    EmailFromName,
    EmailReplyTo,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TenantMembers {
    Table,
    Id,
    TenantId,
    UserId,
    Email,
    Role,
    Position,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
