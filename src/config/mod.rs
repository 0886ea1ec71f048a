//! Configuration loading for the eventdesk back office.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `EVENTDESK_`, producing a typed [`AppConfig`] that is built once at
//! process start and injected everywhere else.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "EVENTDESK_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `EVENTDESK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    /// Public base URL used when building links sent to users
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// HMAC secret for signing session tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// Upper bound on tenants returned by a single membership lookup
    #[serde(default = "default_membership_query_limit")]
    pub membership_query_limit: u64,
    #[serde(default)]
    pub invitation: InvitationConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub images: ImageConfig,
}

/// Invitation lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct InvitationConfig {
    /// Days an invitation stays acceptable after issuance (default: 7)
    ///
    /// Environment variable: `EVENTDESK_INVITATION_TTL_DAYS`
    #[serde(default = "default_invitation_ttl_days")]
    pub ttl_days: i64,

    /// Whether the background worker marks past-due pending invitations
    /// `expired` proactively (default: false)
    ///
    /// Environment variable: `EVENTDESK_INVITATION_SWEEP_ENABLED`
    #[serde(default)]
    pub sweep_enabled: bool,
}

/// Outbound email configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MailConfig {
    /// Delivery backend: `log` (default) or `http`
    #[serde(default = "default_mail_provider")]
    pub provider: String,
    #[serde(default = "default_mail_from_address")]
    pub from_address: String,
    #[serde(default = "default_mail_from_name")]
    pub from_name: String,
    /// Endpoint of the HTTP email provider (required for `http`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_mail_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Delayed email worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_scheduler_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_scheduler_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_scheduler_retry_base_seconds")]
    pub retry_base_seconds: u64,
    /// A `running` job untouched for this long is returned to the queue
    #[serde(default = "default_scheduler_claim_timeout_seconds")]
    pub claim_timeout_seconds: u64,
}

/// Image generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ImageConfig {
    /// Records rendered concurrently per batch (default: 5)
    #[serde(default = "default_image_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_image_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    /// Number of decoded source images kept across a batch
    #[serde(default = "default_image_cache_capacity")]
    pub cache_capacity: usize,
    /// Permit fetching images from loopback, private and link-local
    /// addresses (default: false)
    ///
    /// Environment variable: `EVENTDESK_IMAGE_ALLOW_PRIVATE_HOSTS`
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            server_url: default_server_url(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            secret_key: None,
            session_ttl_hours: default_session_ttl_hours(),
            membership_query_limit: default_membership_query_limit(),
            invitation: InvitationConfig::default(),
            mail: MailConfig::default(),
            scheduler: SchedulerConfig::default(),
            images: ImageConfig::default(),
        }
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_invitation_ttl_days(),
            sweep_enabled: false,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            from_address: default_mail_from_address(),
            from_name: default_mail_from_name(),
            api_base: None,
            api_key: None,
            timeout_seconds: default_mail_timeout_seconds(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_scheduler_tick_interval_seconds(),
            batch_size: default_scheduler_batch_size(),
            max_attempts: default_scheduler_max_attempts(),
            retry_base_seconds: default_scheduler_retry_base_seconds(),
            claim_timeout_seconds: default_scheduler_claim_timeout_seconds(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            batch_size: default_image_batch_size(),
            fetch_timeout_seconds: default_image_fetch_timeout_seconds(),
            cache_capacity: default_image_cache_capacity(),
            allow_private_hosts: false,
        }
    }
}

impl InvitationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=90).contains(&self.ttl_days) {
            return Err(ConfigError::InvalidInvitationTtl {
                value: self.ttl_days,
            });
        }
        Ok(())
    }
}

impl MailConfig {
    /// Validate mail configuration, requiring provider credentials for `http`
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.as_str() {
            "log" => {}
            "http" => {
                let Some(api_base) = self.api_base.as_deref() else {
                    return Err(ConfigError::MissingMailApiBase);
                };
                Url::parse(api_base).map_err(|source| ConfigError::InvalidMailApiBase {
                    value: api_base.to_string(),
                    source,
                })?;
                if self.api_key.is_none() {
                    return Err(ConfigError::MissingMailApiKey);
                }
            }
            other => {
                return Err(ConfigError::UnknownMailProvider {
                    value: other.to_string(),
                });
            }
        }

        if !self.from_address.contains('@') {
            return Err(ConfigError::InvalidMailFromAddress {
                value: self.from_address.clone(),
            });
        }

        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate delayed email worker bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_seconds < 1 || self.tick_interval_seconds > 300 {
            return Err(ConfigError::InvalidSchedulerTickInterval {
                value: self.tick_interval_seconds,
            });
        }

        if self.batch_size == 0 || self.batch_size > 500 {
            return Err(ConfigError::InvalidSchedulerBatchSize {
                value: self.batch_size,
            });
        }

        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidSchedulerMaxAttempts {
                value: self.max_attempts,
            });
        }

        if self.claim_timeout_seconds < 10 {
            return Err(ConfigError::InvalidSchedulerClaimTimeout {
                value: self.claim_timeout_seconds,
            });
        }

        Ok(())
    }
}

impl ImageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > 32 {
            return Err(ConfigError::InvalidImageBatchSize {
                value: self.batch_size,
            });
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidImageCacheCapacity);
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns the public base URL with any trailing slash removed.
    pub fn public_base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.secret_key.is_some() {
            config.secret_key = Some(REDACTED.to_string());
        }
        if config.mail.api_key.is_some() {
            config.mail.api_key = Some(REDACTED.to_string());
        }
        if config.database_url.contains('@') {
            config.database_url = REDACTED.to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.secret_key.as_deref() {
            None => return Err(ConfigError::MissingSecretKey),
            Some(key) if key.len() < 32 => {
                return Err(ConfigError::SecretKeyTooShort { length: key.len() });
            }
            Some(_) => {}
        }

        Url::parse(&self.server_url).map_err(|source| ConfigError::InvalidServerUrl {
            value: self.server_url.clone(),
            source,
        })?;

        if self.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidSessionTtl {
                value: self.session_ttl_hours,
            });
        }

        if self.membership_query_limit == 0 {
            return Err(ConfigError::InvalidMembershipQueryLimit);
        }

        self.invitation.validate()?;
        self.mail.validate()?;
        self.scheduler.validate()?;
        self.images.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://eventdesk@localhost:5432/eventdesk".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_membership_query_limit() -> u64 {
    1000
}

fn default_invitation_ttl_days() -> i64 {
    7
}

fn default_mail_provider() -> String {
    "log".to_string()
}

fn default_mail_from_address() -> String {
    "no-reply@eventdesk.local".to_string()
}

fn default_mail_from_name() -> String {
    "Eventdesk".to_string()
}

fn default_mail_timeout_seconds() -> u64 {
    10
}

fn default_scheduler_tick_interval_seconds() -> u64 {
    30
}

fn default_scheduler_batch_size() -> u64 {
    50
}

fn default_scheduler_max_attempts() -> i32 {
    5
}

fn default_scheduler_retry_base_seconds() -> u64 {
    60
}

fn default_scheduler_claim_timeout_seconds() -> u64 {
    300
}

fn default_image_batch_size() -> usize {
    5
}

fn default_image_fetch_timeout_seconds() -> u64 {
    10
}

fn default_image_cache_capacity() -> usize {
    64
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid server url '{value}': {source}")]
    InvalidServerUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("secret key is missing; set EVENTDESK_SECRET_KEY")]
    MissingSecretKey,
    #[error("secret key must be at least 32 bytes, got {length}")]
    SecretKeyTooShort { length: usize },
    #[error("session ttl must be positive, got {value}")]
    InvalidSessionTtl { value: u64 },
    #[error("membership query limit must be positive")]
    InvalidMembershipQueryLimit,
    #[error("invitation ttl must be between 1 and 90 days, got {value}")]
    InvalidInvitationTtl { value: i64 },
    #[error("unknown mail provider '{value}'; expected 'log' or 'http'")]
    UnknownMailProvider { value: String },
    #[error("mail api base is missing; set EVENTDESK_MAIL_API_BASE")]
    MissingMailApiBase,
    #[error("invalid mail api base '{value}': {source}")]
    InvalidMailApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("mail api key is missing; set EVENTDESK_MAIL_API_KEY")]
    MissingMailApiKey,
    #[error("invalid mail from address: {value}")]
    InvalidMailFromAddress { value: String },
    #[error("scheduler tick interval must be between 1 and 300 seconds, got {value}")]
    InvalidSchedulerTickInterval { value: u64 },
    #[error("scheduler batch size must be between 1 and 500, got {value}")]
    InvalidSchedulerBatchSize { value: u64 },
    #[error("scheduler max attempts must be at least 1, got {value}")]
    InvalidSchedulerMaxAttempts { value: i32 },
    #[error("scheduler claim timeout must be at least 10 seconds, got {value}")]
    InvalidSchedulerClaimTimeout { value: u64 },
    #[error("image batch size must be between 1 and 32, got {value}")]
    InvalidImageBatchSize { value: usize },
    #[error("image cache capacity must be positive")]
    InvalidImageCacheCapacity,
}

/// Loads configuration using layered `.env` files and `EVENTDESK_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, validates and returns the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let config = Self::from_layered(&mut layered, profile_hint);
        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn from_layered(layered: &mut BTreeMap<String, String>, profile_hint: String) -> AppConfig {
        let profile = take_string(layered, "PROFILE").unwrap_or(profile_hint);

        let invitation = InvitationConfig {
            ttl_days: take_parsed(layered, "INVITATION_TTL_DAYS")
                .unwrap_or_else(default_invitation_ttl_days),
            sweep_enabled: take_bool(layered, "INVITATION_SWEEP_ENABLED").unwrap_or(false),
        };

        let mail = MailConfig {
            provider: take_string(layered, "MAIL_PROVIDER")
                .map(|v| v.to_lowercase())
                .unwrap_or_else(default_mail_provider),
            from_address: take_string(layered, "MAIL_FROM_ADDRESS")
                .unwrap_or_else(default_mail_from_address),
            from_name: take_string(layered, "MAIL_FROM_NAME").unwrap_or_else(default_mail_from_name),
            api_base: take_string(layered, "MAIL_API_BASE"),
            api_key: take_string(layered, "MAIL_API_KEY"),
            timeout_seconds: take_parsed(layered, "MAIL_TIMEOUT_SECONDS")
                .unwrap_or_else(default_mail_timeout_seconds),
        };

        let scheduler = SchedulerConfig {
            tick_interval_seconds: take_parsed(layered, "SCHEDULER_TICK_INTERVAL_SECONDS")
                .unwrap_or_else(default_scheduler_tick_interval_seconds),
            batch_size: take_parsed(layered, "SCHEDULER_BATCH_SIZE")
                .unwrap_or_else(default_scheduler_batch_size),
            max_attempts: take_parsed(layered, "SCHEDULER_MAX_ATTEMPTS")
                .unwrap_or_else(default_scheduler_max_attempts),
            retry_base_seconds: take_parsed(layered, "SCHEDULER_RETRY_BASE_SECONDS")
                .unwrap_or_else(default_scheduler_retry_base_seconds),
            claim_timeout_seconds: take_parsed(layered, "SCHEDULER_CLAIM_TIMEOUT_SECONDS")
                .unwrap_or_else(default_scheduler_claim_timeout_seconds),
        };

        let images = ImageConfig {
            batch_size: take_parsed(layered, "IMAGE_BATCH_SIZE")
                .unwrap_or_else(default_image_batch_size),
            fetch_timeout_seconds: take_parsed(layered, "IMAGE_FETCH_TIMEOUT_SECONDS")
                .unwrap_or_else(default_image_fetch_timeout_seconds),
            cache_capacity: take_parsed(layered, "IMAGE_CACHE_CAPACITY")
                .unwrap_or_else(default_image_cache_capacity),
            allow_private_hosts: take_bool(layered, "IMAGE_ALLOW_PRIVATE_HOSTS").unwrap_or(false),
        };

        AppConfig {
            profile,
            api_bind_addr: take_string(layered, "API_BIND_ADDR")
                .unwrap_or_else(default_api_bind_addr),
            server_url: take_string(layered, "SERVER_URL").unwrap_or_else(default_server_url),
            log_level: take_string(layered, "LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: take_string(layered, "LOG_FORMAT").unwrap_or_else(default_log_format),
            database_url: take_string(layered, "DATABASE_URL")
                .unwrap_or_else(default_database_url),
            db_max_connections: take_parsed(layered, "DB_MAX_CONNECTIONS")
                .unwrap_or_else(default_db_max_connections),
            db_acquire_timeout_ms: take_parsed(layered, "DB_ACQUIRE_TIMEOUT_MS")
                .unwrap_or_else(default_db_acquire_timeout_ms),
            secret_key: take_string(layered, "SECRET_KEY"),
            session_ttl_hours: take_parsed(layered, "SESSION_TTL_HOURS")
                .unwrap_or_else(default_session_ttl_hours),
            membership_query_limit: take_parsed(layered, "MEMBERSHIP_QUERY_LIMIT")
                .unwrap_or_else(default_membership_query_limit),
            invitation,
            mail,
            scheduler,
            images,
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: std::str::FromStr>(layered: &mut BTreeMap<String, String>, key: &str) -> Option<T> {
    take_string(layered, key).and_then(|v| v.parse().ok())
}

fn take_bool(layered: &mut BTreeMap<String, String>, key: &str) -> Option<bool> {
    take_string(layered, key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
