//! # Eventdesk
//!
//! Multi-tenant event back office: tenant-scoped access control,
//! invitations, public registration, email automation and image generation
//! behind a JSON API.

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod images;
pub mod invitations;
pub mod mail;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub use migration;
