//! # Data Models
//!
//! SeaORM entities for the eventdesk schema plus shared API value types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod email_log;
pub mod email_template;
pub mod event;
pub mod image_template;
pub mod invitation;
pub mod participant;
pub mod partner;
pub mod reference;
pub mod scheduled_email;
pub mod tenant;
pub mod tenant_member;
pub mod user;

pub use email_log::Entity as EmailLog;
pub use email_template::Entity as EmailTemplate;
pub use event::Entity as Event;
pub use image_template::Entity as ImageTemplate;
pub use invitation::Entity as Invitation;
pub use participant::Entity as Participant;
pub use partner::Entity as Partner;
pub use reference::{Identified, Ref};
pub use scheduled_email::Entity as ScheduledEmail;
pub use tenant::Entity as Tenant;
pub use tenant_member::Entity as TenantMember;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "eventdesk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
