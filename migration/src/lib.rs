//! Database migrations for the eventdesk back office.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000001_create_users;
mod m2026_01_05_000002_create_tenants;
mod m2026_01_05_000003_create_invitations;
mod m2026_01_12_000001_create_events;
mod m2026_01_19_000001_create_email_automation;
mod m2026_02_02_000001_create_image_templates;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000001_create_users::Migration),
            Box::new(m2026_01_05_000002_create_tenants::Migration),
            Box::new(m2026_01_05_000003_create_invitations::Migration),
            Box::new(m2026_01_12_000001_create_events::Migration),
            Box::new(m2026_01_19_000001_create_email_automation::Migration),
            Box::new(m2026_02_02_000001_create_image_templates::Migration),
        ]
    }
}
