use eventdesk::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

const VARS: &[&str] = &[
    "EVENTDESK_PROFILE",
    "EVENTDESK_API_BIND_ADDR",
    "EVENTDESK_LOG_LEVEL",
    "EVENTDESK_SECRET_KEY",
    "EVENTDESK_SERVER_URL",
    "EVENTDESK_MAIL_PROVIDER",
    "EVENTDESK_MAIL_API_BASE",
    "EVENTDESK_MAIL_API_KEY",
    "EVENTDESK_INVITATION_TTL_DAYS",
    "EVENTDESK_IMAGE_BATCH_SIZE",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn set_secret() {
    unsafe {
        env::set_var("EVENTDESK_SECRET_KEY", SECRET);
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    set_secret();

    let dir = TempDir::new().unwrap();
    let cfg = loader(&dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.server_url, "http://localhost:8080");
    assert_eq!(cfg.mail.provider, "log");
    assert_eq!(cfg.invitation.ttl_days, 7);
    assert!(!cfg.invitation.sweep_enabled);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "EVENTDESK_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(&dir, ".env.test", "EVENTDESK_API_BIND_ADDR=192.168.0.10:5000\n");
    write_env_file(
        &dir,
        ".env.test.local",
        "EVENTDESK_API_BIND_ADDR=10.0.0.5:6000\n",
    );
    // Profile is selected in .env.local before profile files load
    write_env_file(
        &dir,
        ".env.local",
        &format!(
            "EVENTDESK_PROFILE=test\nEVENTDESK_API_BIND_ADDR=127.0.0.1:4000\nEVENTDESK_SECRET_KEY={SECRET}\n"
        ),
    );

    let cfg = loader(&dir).load().expect("config loads with layered env files");
    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();
    set_secret();

    let dir = TempDir::new().unwrap();
    write_env_file(
        &dir,
        ".env",
        "EVENTDESK_API_BIND_ADDR=127.0.0.1:3000\nEVENTDESK_INVITATION_TTL_DAYS=14\n",
    );
    unsafe {
        env::set_var("EVENTDESK_API_BIND_ADDR", "0.0.0.0:9090");
    }

    let cfg = loader(&dir).load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.invitation.ttl_days, 14);
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();
    set_secret();
    unsafe {
        env::set_var("EVENTDESK_API_BIND_ADDR", "not-an-addr");
    }

    let dir = TempDir::new().unwrap();
    let err = loader(&dir).load().expect_err("invalid bind addr should fail");
    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
    assert!(err.to_string().contains("invalid api bind address"));
    clear_env();
}

#[test]
fn missing_secret_key_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    let err = loader(&dir).load().expect_err("secret key is required");
    assert!(matches!(err, ConfigError::MissingSecretKey));
    clear_env();
}

#[test]
fn http_mail_provider_requires_credentials() {
    let _guard = env_guard();
    clear_env();
    set_secret();
    unsafe {
        env::set_var("EVENTDESK_MAIL_PROVIDER", "HTTP");
        env::set_var("EVENTDESK_MAIL_API_BASE", "https://mail.test/v1/send");
    }

    let dir = TempDir::new().unwrap();
    let err = loader(&dir).load().expect_err("api key is required");
    assert!(matches!(err, ConfigError::MissingMailApiKey));

    unsafe {
        env::set_var("EVENTDESK_MAIL_API_KEY", "key-123");
    }
    let cfg = loader(&dir).load().expect("http provider configured");
    assert_eq!(cfg.mail.provider, "http");
    clear_env();
}

#[test]
fn out_of_range_image_batch_size_is_rejected() {
    let _guard = env_guard();
    clear_env();
    set_secret();
    unsafe {
        env::set_var("EVENTDESK_IMAGE_BATCH_SIZE", "64");
    }

    let dir = TempDir::new().unwrap();
    let err = loader(&dir).load().expect_err("batch size bounded");
    assert!(matches!(err, ConfigError::InvalidImageBatchSize { value: 64 }));
    clear_env();
}
