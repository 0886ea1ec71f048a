//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! eventdesk entities. Validation of field values happens here, before any
//! write reaches the database.

pub mod email;
pub mod event;
pub mod image_template;
pub mod invitation;
pub mod participant;
pub mod partner;
pub mod tenant;
pub mod user;

pub use email::{EmailLogRepository, EmailTemplateRepository, ScheduledEmailRepository};
pub use event::EventRepository;
pub use image_template::ImageTemplateRepository;
pub use invitation::{InvitationRepository, InvitationStatus};
pub use participant::ParticipantRepository;
pub use partner::PartnerRepository;
pub use tenant::TenantRepository;
pub use user::UserRepository;

use crate::error::RepositoryError;

/// Record statuses shared by participants and partners.
pub const RECORD_STATUSES: &[&str] = &["not-approved", "approved", "declined"];

/// Status assigned to new registrations.
pub const DEFAULT_RECORD_STATUS: &str = "not-approved";

/// Lowercases `value` and joins alphanumeric runs with single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    slug
}

pub(crate) fn normalize_email(field: &'static str, email: &str) -> Result<String, RepositoryError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(RepositoryError::validation(field, "must be a valid email address")),
    }
}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<String, RepositoryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RepositoryError::validation(field, "is required"));
    }
    if value.chars().count() > max_len {
        return Err(RepositoryError::validation(
            field,
            format!("cannot exceed {max_len} characters"),
        ));
    }
    Ok(value.to_string())
}

pub(crate) fn validate_record_status(status: &str) -> Result<(), RepositoryError> {
    if RECORD_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(RepositoryError::validation(
            "status",
            format!("must be one of {}", RECORD_STATUSES.join(", ")),
        ))
    }
}
