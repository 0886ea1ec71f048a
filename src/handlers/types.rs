//! # Common API Types
//!
//! Shared response wrappers and the compact summaries used when a
//! relationship is returned populated.

use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Identified, event, tenant};

/// List endpoint wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T, M> FromIterator<M> for ListResponse<T>
where
    T: From<M>,
{
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(T::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TenantSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl Identified for TenantSummary {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl From<&tenant::Model> for TenantSummary {
    fn from(model: &tenant::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            slug: model.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
}

impl Identified for EventSummary {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl From<&event::Model> for EventSummary {
    fn from(model: &event::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            slug: model.slug.clone(),
            status: model.status.clone(),
        }
    }
}

/// RFC 3339 rendering used by every response timestamp.
pub fn timestamp(value: &DateTimeWithTimeZone) -> String {
    value.to_utc().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ref;

    #[test]
    fn tenant_reference_accepts_id_or_object() {
        let id = Uuid::new_v4();
        let bare: Ref<TenantSummary> = serde_json::from_value(serde_json::json!(id)).unwrap();
        assert_eq!(bare.id(), id);

        let populated: Ref<TenantSummary> = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "Acme",
            "slug": "acme"
        }))
        .unwrap();
        assert_eq!(populated.id(), id);
        assert_eq!(populated.populated().map(|t| t.slug.as_str()), Some("acme"));
    }
}
