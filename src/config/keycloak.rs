use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// Default Keycloak image repository.
pub const DEFAULT_IMAGE: &str = "quay.io/keycloak/keycloak";
/// Default Keycloak image tag.
pub const DEFAULT_VERSION: &str = "26.0";
/// Default bootstrap admin user and password.
pub const DEFAULT_ADMIN: &str = "admin";
/// Startup timeout tolerating a cold image pull.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 90;

/// Settings that seed a [`KeycloakBuilder`](crate::keycloak::KeycloakBuilder).
///
/// Everything here can be overridden per test through the builder; the
/// environment only moves the defaults (e.g. pinning a Keycloak version in CI).
#[derive(Debug, Clone)]
pub struct KeycloakSettings {
    /// Image repository.
    pub image: String,
    /// Image tag.
    pub version: String,
    /// Bootstrap admin user name.
    pub admin_username: String,
    /// Bootstrap admin password.
    pub admin_password: SecretString,
    /// Time allowed for the server to become ready.
    pub startup_timeout_secs: u64,
    /// Directory that relative realm import paths are resolved against.
    pub resource_dir: PathBuf,
    /// Leave containers running after the test (for debugging).
    pub keep_on_shutdown: bool,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            admin_username: DEFAULT_ADMIN.to_string(),
            admin_password: SecretString::from(DEFAULT_ADMIN),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            resource_dir: default_resource_dir(),
            keep_on_shutdown: false,
        }
    }
}

impl KeycloakSettings {
    /// Load `.env` (if present) and resolve settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::resolve()
    }

    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let startup_timeout_secs =
            parse_optional_env("KEYCLOAK_STARTUP_TIMEOUT_SECS", defaults.startup_timeout_secs)?;
        if startup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "KEYCLOAK_STARTUP_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            image: optional_env("KEYCLOAK_IMAGE")?.unwrap_or(defaults.image),
            version: optional_env("KEYCLOAK_VERSION")?.unwrap_or(defaults.version),
            admin_username: optional_env("KEYCLOAK_ADMIN_USERNAME")?
                .unwrap_or(defaults.admin_username),
            admin_password: optional_env("KEYCLOAK_ADMIN_PASSWORD")?
                .map(SecretString::from)
                .unwrap_or(defaults.admin_password),
            startup_timeout_secs,
            resource_dir: optional_env("KEYCLOAK_RESOURCE_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.resource_dir),
            keep_on_shutdown: parse_bool_env("TESTCONTAINERS_KEEP", defaults.keep_on_shutdown)?,
        })
    }

    /// Startup timeout as a duration.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Get the admin password (exposes the secret).
    pub fn admin_password(&self) -> &str {
        self.admin_password.expose_secret()
    }
}

/// The crate root under `cargo test`, otherwise the working directory.
fn default_resource_dir() -> PathBuf {
    std::env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
