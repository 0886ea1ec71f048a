//! Test utilities: in-memory database, fixtures and in-process
//! collaborators for mail and image loading.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use eventdesk::access::{GlobalRole, Plan};
use eventdesk::config::AppConfig;
use eventdesk::images::{ImageError, ImageSource, LoadedImage};
use eventdesk::mail::{MailError, Mailer, OutgoingEmail};
use eventdesk::models::{event, tenant, user};
use eventdesk::repositories::event::NewEvent;
use eventdesk::repositories::tenant::NewTenant;
use eventdesk::repositories::user::NewUser;
use eventdesk::repositories::{EventRepository, TenantRepository, UserRepository};
use eventdesk::server::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

pub const TEST_SECRET: &str = "test-secret-key-with-at-least-32-bytes!!";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        secret_key: Some(TEST_SECRET.to_string()),
        server_url: "https://events.test".to_string(),
        ..AppConfig::default()
    }
}

/// Mailer that keeps every message in memory. Recipients listed in
/// `reject` fail with a provider rejection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    reject: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, recipient: &str) {
        self.reject.lock().unwrap().push(recipient.to_string());
    }

    pub fn accept_all(&self) {
        self.reject.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<OutgoingEmail> {
        self.sent()
            .into_iter()
            .filter(|email| email.to == recipient)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.reject.lock().unwrap().iter().any(|r| r == &email.to) {
            return Err(MailError::Rejected {
                status: 550,
                body: "mailbox unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Serves a tiny PNG for every URL except those containing `broken`.
pub struct FakeImageSource;

pub const PIXEL_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn load(&self, url: &str) -> Result<LoadedImage, ImageError> {
        if url.contains("broken") {
            return Err(ImageError::Load {
                url: url.to_string(),
                message: "status 404".to_string(),
            });
        }
        Ok(LoadedImage {
            content_type: "image/png".to_string(),
            bytes: PIXEL_PNG.to_vec(),
        })
    }
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
}

pub async fn setup_context() -> Result<TestContext> {
    setup_context_with(test_config()).await
}

pub async fn setup_context_with(config: AppConfig) -> Result<TestContext> {
    let db = setup_test_db().await?;
    let config = Arc::new(config);
    let mailer = RecordingMailer::new();
    let state = AppState::new(
        config.clone(),
        db.clone(),
        mailer.clone(),
        Arc::new(FakeImageSource),
    );
    Ok(TestContext {
        db,
        config,
        mailer,
        state,
    })
}

pub async fn create_user(
    db: &DatabaseConnection,
    email: &str,
    roles: Vec<GlobalRole>,
) -> Result<user::Model> {
    let user = UserRepository::new(db)
        .create(NewUser {
            email: email.to_string(),
            name: None,
            password_hash: "not-a-real-hash".to_string(),
            roles,
            plan: Plan::Unlimited,
        })
        .await?;
    Ok(user)
}

pub async fn create_tenant(
    db: &DatabaseConnection,
    owner: &user::Model,
    name: &str,
) -> Result<tenant::Model> {
    let tenant = TenantRepository::new(db)
        .create(
            owner,
            NewTenant {
                name: name.to_string(),
                slug: None,
            },
        )
        .await?;
    Ok(tenant)
}

pub async fn create_event(
    db: &DatabaseConnection,
    tenant_id: uuid::Uuid,
    name: &str,
) -> Result<event::Model> {
    let event = EventRepository::new(db)
        .create(NewEvent {
            tenant_id,
            name: name.to_string(),
            slug: None,
            starts_at: None,
            ends_at: None,
            location: Some("Berlin".to_string()),
            status: Some("published".to_string()),
        })
        .await?;
    Ok(event)
}
