//! Migration to create the email automation tables.
//!
//! - `email_templates`: per-tenant templates bound to a trigger event
//! - `email_logs`: append-only audit of every attempted send
//! - `scheduled_emails`: durable queue of delayed sends

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailTemplates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailTemplates::TenantId).uuid().not_null())
                    .col(ColumnDef::new(EmailTemplates::Name).text().not_null())
                    .col(ColumnDef::new(EmailTemplates::Subject).text().not_null())
                    .col(ColumnDef::new(EmailTemplates::Body).text().not_null())
                    .col(ColumnDef::new(EmailTemplates::Trigger).text().not_null())
                    .col(
                        ColumnDef::new(EmailTemplates::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(EmailTemplates::DelayMinutes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailTemplates::Conditions)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmailTemplates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailTemplates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_templates_tenant_id")
                            .from(EmailTemplates::Table, EmailTemplates::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_templates_tenant_trigger_active")
                    .table(EmailTemplates::Table)
                    .col(EmailTemplates::TenantId)
                    .col(EmailTemplates::Trigger)
                    .col(EmailTemplates::IsActive)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmailLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(EmailLogs::TenantId).uuid().not_null())
                    .col(ColumnDef::new(EmailLogs::TemplateId).uuid().null())
                    .col(ColumnDef::new(EmailLogs::Recipient).text().not_null())
                    .col(ColumnDef::new(EmailLogs::Trigger).text().not_null())
                    .col(ColumnDef::new(EmailLogs::Status).text().not_null())
                    .col(ColumnDef::new(EmailLogs::Error).text().null())
                    .col(
                        ColumnDef::new(EmailLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_logs_tenant_id")
                            .from(EmailLogs::Table, EmailLogs::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_tenant_created")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::TenantId)
                    .col(EmailLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScheduledEmails::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledEmails::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduledEmails::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ScheduledEmails::TemplateId).uuid().not_null())
                    .col(ColumnDef::new(ScheduledEmails::Recipient).text().not_null())
                    .col(ColumnDef::new(ScheduledEmails::Trigger).text().not_null())
                    .col(
                        ColumnDef::new(ScheduledEmails::Variables)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledEmails::DueAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledEmails::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(ScheduledEmails::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScheduledEmails::LastError).text().null())
                    .col(
                        ColumnDef::new(ScheduledEmails::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledEmails::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scheduled_emails_tenant_id")
                            .from(ScheduledEmails::Table, ScheduledEmails::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scheduled_emails_template_id")
                            .from(ScheduledEmails::Table, ScheduledEmails::TemplateId)
                            .to(EmailTemplates::Table, EmailTemplates::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim path for the delayed email worker
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_scheduled_emails_status_due ON scheduled_emails (status, due_at)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_scheduled_emails_status_due")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ScheduledEmails::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(EmailTemplates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailTemplates {
    Table,
    Id,
    TenantId,
    Name,
    Subject,
    Body,
    Trigger,
    IsActive,
    DelayMinutes,
    Conditions,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailLogs {
    Table,
    Id,
    TenantId,
    TemplateId,
    Recipient,
    Trigger,
    Status,
    Error,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ScheduledEmails {
    Table,
    Id,
    TenantId,
    TemplateId,
    Recipient,
    Trigger,
    Variables,
    DueAt,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
