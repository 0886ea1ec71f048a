//! # Server Configuration
//!
//! Application state, router assembly and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::access::{AccessControl, SeaOrmMembershipResolver};
use crate::config::AppConfig;
use crate::events::EventBus;
use crate::handlers;
use crate::images::{HttpImageSource, ImageGenerator, ImageSource};
use crate::invitations::{InvitationAcceptanceSubscriber, InvitationService};
use crate::mail::automation::EmailAutomationSubscriber;
use crate::mail::{EmailAutomation, Mailer, build_mailer};
use crate::scheduler::DelayedEmailWorker;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub access: AccessControl,
    pub events: Arc<EventBus>,
    pub invitations: InvitationService,
    pub automation: EmailAutomation,
    pub images: ImageGenerator,
}

impl AppState {
    /// Wires services around explicit collaborators.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        mailer: Arc<dyn Mailer>,
        image_source: Arc<dyn ImageSource>,
    ) -> Self {
        let resolver = Arc::new(SeaOrmMembershipResolver::new(
            db.clone(),
            config.membership_query_limit,
        ));
        let invitations = InvitationService::new(db.clone(), mailer.clone(), config.clone());
        let automation = EmailAutomation::new(db.clone(), mailer, config.clone());

        let events = EventBus::new()
            .with_subscriber(Arc::new(InvitationAcceptanceSubscriber::new(
                invitations.clone(),
            )))
            .with_subscriber(Arc::new(EmailAutomationSubscriber::new(automation.clone())));

        Self {
            images: ImageGenerator::new(image_source, &config.images),
            access: AccessControl::new(resolver),
            events: Arc::new(events),
            invitations,
            automation,
            config,
            db,
        }
    }

    /// Builds the production mailer and image source from configuration.
    pub fn from_config(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<Self> {
        let mailer = build_mailer(&config.mail).context("Failed to build mailer")?;
        let image_source = Arc::new(
            HttpImageSource::new(
                Duration::from_secs(config.images.fetch_timeout_seconds),
                config.images.allow_private_hosts,
            )
            .context("Failed to build image HTTP client")?,
        );
        Ok(Self::new(config, db, mailer, image_source))
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/users", post(handlers::users::register))
        .route("/users/me", get(handlers::users::me))
        .route("/users/{id}/roles", put(handlers::users::update_roles))
        .route("/auth/login", post(handlers::users::login))
        .route(
            "/tenants",
            post(handlers::tenants::create_tenant).get(handlers::tenants::list_tenants),
        )
        .route(
            "/tenants/{id}",
            get(handlers::tenants::get_tenant)
                .patch(handlers::tenants::update_tenant)
                .delete(handlers::tenants::delete_tenant),
        )
        .route(
            "/tenants/{id}/email-config",
            put(handlers::tenants::update_email_config),
        )
        .route(
            "/tenants/{id}/members",
            get(handlers::tenants::list_members).post(handlers::tenants::add_member),
        )
        .route(
            "/tenants/{id}/members/{member_id}",
            delete(handlers::tenants::remove_member),
        )
        .route(
            "/tenants/{id}/invitations",
            post(handlers::invitations::create_invitation)
                .get(handlers::invitations::list_invitations),
        )
        .route(
            "/invitations/decline",
            post(handlers::invitations::decline_invitation),
        )
        .route(
            "/invitations/{token}",
            get(handlers::invitations::get_invitation),
        )
        .route(
            "/tenants/{id}/invitations/{invitation_id}",
            delete(handlers::invitations::revoke_invitation),
        )
        .route(
            "/public/events/{event_id}/participants",
            post(handlers::registrations::register_participant),
        )
        .route(
            "/public/events/{event_id}/partners",
            post(handlers::registrations::register_partner),
        )
        .route(
            "/events",
            post(handlers::records::create_event).get(handlers::records::list_events),
        )
        .route("/events/{id}", get(handlers::records::get_event))
        .route("/participants", get(handlers::records::list_participants))
        .route(
            "/participants/{id}",
            patch(handlers::records::update_participant),
        )
        .route("/partners", get(handlers::records::list_partners))
        .route("/partners/{id}", patch(handlers::records::update_partner))
        .route(
            "/email-templates",
            post(handlers::email::create_template).get(handlers::email::list_templates),
        )
        .route(
            "/email-templates/{id}",
            patch(handlers::email::update_template).delete(handlers::email::delete_template),
        )
        .route("/email-logs", get(handlers::email::list_logs))
        .route("/email-logs/{id}", delete(handlers::email::delete_log))
        .route(
            "/image-templates",
            post(handlers::images::create_image_template).get(handlers::images::list_image_templates),
        )
        .route(
            "/image-templates/{id}",
            delete(handlers::images::delete_image_template),
        )
        .route(
            "/image-templates/{id}/generate",
            post(handlers::images::generate_images),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API and runs the delayed email worker until Ctrl-C.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid bind address '{}'", config.api_bind_addr))?;

    let config = Arc::new(config);
    let state = AppState::from_config(config.clone(), db.clone())?;

    let shutdown = CancellationToken::new();
    let mut worker =
        DelayedEmailWorker::new(config.clone(), db, state.automation.clone());
    if config.invitation.sweep_enabled {
        worker = worker.with_invitation_sweep(state.invitations.clone());
    }
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, profile = %config.profile, "Server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    let _ = worker_handle.await;
    Ok(())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::users::register,
        crate::handlers::users::login,
        crate::handlers::users::me,
        crate::handlers::users::update_roles,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::update_tenant,
        crate::handlers::tenants::delete_tenant,
        crate::handlers::tenants::update_email_config,
        crate::handlers::tenants::list_members,
        crate::handlers::tenants::add_member,
        crate::handlers::tenants::remove_member,
        crate::handlers::invitations::create_invitation,
        crate::handlers::invitations::list_invitations,
        crate::handlers::invitations::get_invitation,
        crate::handlers::invitations::decline_invitation,
        crate::handlers::invitations::revoke_invitation,
        crate::handlers::registrations::register_participant,
        crate::handlers::registrations::register_partner,
        crate::handlers::records::create_event,
        crate::handlers::records::list_events,
        crate::handlers::records::get_event,
        crate::handlers::records::list_participants,
        crate::handlers::records::update_participant,
        crate::handlers::records::list_partners,
        crate::handlers::records::update_partner,
        crate::handlers::email::create_template,
        crate::handlers::email::list_templates,
        crate::handlers::email::update_template,
        crate::handlers::email::delete_template,
        crate::handlers::email::list_logs,
        crate::handlers::email::delete_log,
        crate::handlers::images::create_image_template,
        crate::handlers::images::list_image_templates,
        crate::handlers::images::delete_image_template,
        crate::handlers::images::generate_images,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::access::TenantRole,
            crate::access::GlobalRole,
            crate::access::Plan,
            crate::mail::template::TemplateConditions,
            crate::images::RenderedImage,
            crate::images::ImageRecord,
            crate::images::ImageResult,
        )
    ),
    modifiers(&BearerAuth),
    info(
        title = "Eventdesk API",
        description = "Multi-tenant event management: tenants, registrations, email automation and image generation",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
