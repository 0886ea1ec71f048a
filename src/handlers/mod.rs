//! # API Handlers
//!
//! HTTP endpoint handlers. Every handler asks the access predicates for a
//! decision first and only then touches a repository or service.

pub mod email;
pub mod images;
pub mod invitations;
pub mod records;
pub mod registrations;
pub mod tenants;
pub mod types;
pub mod users;

use axum::{extract::State, http::StatusCode, response::Json};
use uuid::Uuid;

use crate::access::AccessDecision;
use crate::error::{ApiError, forbidden};
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness plus database connectivity
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are healthy", body = ServiceInfo),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unavailable",
        )
    })?;
    Ok(Json(ServiceInfo::default()))
}

/// Rejects with 403 unless `decision` covers `tenant_id`.
pub(crate) fn ensure_permitted(decision: &AccessDecision, tenant_id: Uuid) -> Result<(), ApiError> {
    if decision.permits(tenant_id) {
        Ok(())
    } else {
        Err(forbidden(Some("Insufficient permissions for this tenant")))
    }
}

/// Rejects with 404 unless `decision` covers `tenant_id`, so unreadable
/// records are indistinguishable from missing ones.
pub(crate) fn ensure_visible(
    decision: &AccessDecision,
    tenant_id: Uuid,
    what: &str,
) -> Result<(), ApiError> {
    if decision.permits(tenant_id) {
        Ok(())
    } else {
        Err(crate::error::not_found(what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::TenantFilter;

    #[tokio::test]
    async fn root_reports_service_identity() {
        let Json(info) = root().await;
        assert_eq!(info.service, "eventdesk");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn filter_decisions_gate_by_tenant() {
        let allowed = Uuid::new_v4();
        let decision = AccessDecision::Filter(TenantFilter {
            tenant_ids: vec![allowed],
        });

        assert!(ensure_permitted(&decision, allowed).is_ok());
        let err = ensure_permitted(&decision, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = ensure_visible(&decision, Uuid::new_v4(), "Event").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(ensure_permitted(&AccessDecision::Deny, allowed).is_err());
    }
}
