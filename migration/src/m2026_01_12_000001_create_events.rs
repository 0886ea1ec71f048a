//! Migration to create events and the records registered against them.
//!
//! Participants and partners carry both the event and the tenant derived
//! from it, and may register for a given event only once per email.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Events::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Events::Name).text().not_null())
                    .col(ColumnDef::new(Events::Slug).text().not_null())
                    .col(
                        ColumnDef::new(Events::StartsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Events::EndsAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Events::Location).text().null())
                    .col(
                        ColumnDef::new(Events::Status)
                            .text()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Events::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_tenant_id")
                            .from(Events::Table, Events::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_tenant_slug_unique")
                    .table(Events::Table)
                    .col(Events::TenantId)
                    .col(Events::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participants::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Participants::EventId).uuid().not_null())
                    .col(
                        ColumnDef::new(Participants::ParticipantType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Participants::FirstName).text().not_null())
                    .col(ColumnDef::new(Participants::LastName).text().not_null())
                    .col(ColumnDef::new(Participants::Email).text().not_null())
                    .col(ColumnDef::new(Participants::Company).text().null())
                    .col(
                        ColumnDef::new(Participants::Status)
                            .text()
                            .not_null()
                            .default("not-approved"),
                    )
                    .col(ColumnDef::new(Participants::ImageUrl).text().null())
                    .col(ColumnDef::new(Participants::Fields).json_binary().null())
                    .col(
                        ColumnDef::new(Participants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Participants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participants_tenant_id")
                            .from(Participants::Table, Participants::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participants_event_id")
                            .from(Participants::Table, Participants::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_participants_event_email_unique")
                    .table(Participants::Table)
                    .col(Participants::EventId)
                    .col(Participants::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Partners::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Partners::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Partners::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Partners::EventId).uuid().not_null())
                    .col(ColumnDef::new(Partners::CompanyName).text().not_null())
                    .col(ColumnDef::new(Partners::ContactName).text().null())
                    .col(ColumnDef::new(Partners::Email).text().not_null())
                    .col(ColumnDef::new(Partners::Tier).text().null())
                    .col(
                        ColumnDef::new(Partners::Status)
                            .text()
                            .not_null()
                            .default("not-approved"),
                    )
                    .col(ColumnDef::new(Partners::LogoUrl).text().null())
                    .col(
                        ColumnDef::new(Partners::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Partners::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_partners_tenant_id")
                            .from(Partners::Table, Partners::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_partners_event_id")
                            .from(Partners::Table, Partners::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_partners_event_email_unique")
                    .table(Partners::Table)
                    .col(Partners::EventId)
                    .col(Partners::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Partners::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Participants::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    TenantId,
    Name,
    Slug,
    StartsAt,
    EndsAt,
    Location,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Participants {
    Table,
    Id,
    TenantId,
    EventId,
    ParticipantType,
    FirstName,
    LastName,
    Email,
    Company,
    Status,
    ImageUrl,
    Fields,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Partners {
    Table,
    Id,
    TenantId,
    EventId,
    CompanyName,
    ContactName,
    Email,
    Tier,
    Status,
    LogoUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
