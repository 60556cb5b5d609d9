//! Builder for a Keycloak test container.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::KeycloakSettings;
use crate::container::error::{ContainerError, Result};
use crate::container::{Container, ContainerRequest, ImageRef, WaitFor};
use crate::keycloak::container::KeycloakContainer;
use crate::runtime::ContainerRuntime;

/// HTTP port Keycloak listens on inside the container.
pub const HTTP_PORT: u16 = 8080;

/// Directory scanned by `--import-realm`.
pub const IMPORT_DIR: &str = "/opt/keycloak/data/import";

/// Collects Keycloak startup options. Nothing touches Docker until the built
/// container is started.
///
/// ```rust,no_run
/// use keycloak_container::keycloak::KeycloakBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut keycloak = KeycloakBuilder::new()
///     .with_realm_import_file("/test-realm.json")
///     .with_context_path("/auth/")
///     .build()?;
/// keycloak.start().await?;
/// println!("Keycloak at {}", keycloak.mapped_url()?);
/// # Ok(())
/// # }
/// ```
pub struct KeycloakBuilder {
    image: ImageRef,
    admin_username: String,
    admin_password: SecretString,
    context_path: String,
    realm_import_files: Vec<String>,
    startup_timeout: Duration,
    env: BTreeMap<String, String>,
    resource_root: PathBuf,
    keep_on_shutdown: bool,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl std::fmt::Debug for KeycloakBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakBuilder")
            .field("image", &self.image)
            .field("admin_username", &self.admin_username)
            .field("context_path", &self.context_path)
            .field("realm_import_files", &self.realm_import_files)
            .field("startup_timeout", &self.startup_timeout)
            .field("resource_root", &self.resource_root)
            .finish_non_exhaustive()
    }
}

impl Default for KeycloakBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeycloakBuilder {
    /// Builder with built-in defaults, ignoring the environment.
    pub fn new() -> Self {
        Self::from_settings(&KeycloakSettings::default())
    }

    /// Builder seeded from `.env` and `KEYCLOAK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_settings(&KeycloakSettings::from_env()?))
    }

    pub fn from_settings(settings: &KeycloakSettings) -> Self {
        Self {
            image: ImageRef::new(&settings.image, &settings.version),
            admin_username: settings.admin_username.clone(),
            admin_password: settings.admin_password.clone(),
            context_path: "/".to_string(),
            realm_import_files: Vec::new(),
            startup_timeout: settings.startup_timeout(),
            env: BTreeMap::new(),
            resource_root: settings.resource_dir.clone(),
            keep_on_shutdown: settings.keep_on_shutdown,
            runtime: None,
        }
    }

    /// Use another image, e.g. `quay.io/keycloak/keycloak:25.0`.
    pub fn with_image(mut self, image: impl Into<ImageRef>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_admin_username(mut self, username: impl Into<String>) -> Self {
        self.admin_username = username.into();
        self
    }

    pub fn with_admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = SecretString::from(password.into());
        self
    }

    /// HTTP context path, starting and ending with `/` (default `/`).
    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    /// Import a realm file at startup. Relative and `/`-prefixed paths are
    /// resolved against the resource root.
    pub fn with_realm_import_file(mut self, path: impl Into<String>) -> Self {
        self.realm_import_files.push(path.into());
        self
    }

    pub fn with_realm_import_files<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.realm_import_files
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Extra container environment. Admin credentials always come from
    /// the builder.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Directory realm import paths are resolved against.
    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_root = root.into();
        self
    }

    pub fn with_keep_on_shutdown(mut self, keep: bool) -> Self {
        self.keep_on_shutdown = keep;
        self
    }

    /// Run on this runtime instead of connecting to Docker.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<KeycloakContainer> {
        if !self.context_path.starts_with('/') || !self.context_path.ends_with('/') {
            return Err(ContainerError::Config {
                reason: format!(
                    "context path '{}' must start and end with '/'",
                    self.context_path
                ),
            });
        }
        if self.startup_timeout.is_zero() {
            return Err(ContainerError::Config {
                reason: "startup timeout must be positive".to_string(),
            });
        }

        let mut file_names = BTreeSet::new();
        let mut copies = Vec::with_capacity(self.realm_import_files.len());
        for file in &self.realm_import_files {
            let resolved = resolve_resource(&self.resource_root, file);
            if !resolved.is_file() {
                return Err(ContainerError::ResourceNotFound { path: resolved });
            }
            let name = resolved
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| ContainerError::Config {
                    reason: format!("'{file}' has no usable file name"),
                })?;
            if !file_names.insert(name.clone()) {
                return Err(ContainerError::Config {
                    reason: format!("two realm files are named '{name}'"),
                });
            }
            copies.push((resolved, format!("{IMPORT_DIR}/{name}")));
        }

        let mut cmd = vec!["start-dev".to_string()];
        if self.context_path != "/" {
            cmd.push(format!(
                "--http-relative-path={}",
                self.context_path.trim_end_matches('/')
            ));
        }
        if !copies.is_empty() {
            cmd.push("--import-realm".to_string());
        }

        let password = self.admin_password.expose_secret();
        let mut request = ContainerRequest::new(self.image.clone())
            .with_name_prefix("keycloak")
            .with_exposed_port(HTTP_PORT)
            .with_cmd(cmd)
            .with_wait_for(
                WaitFor::http(HTTP_PORT, format!("{}realms/master", self.context_path))
                    .with_status(200),
            )
            .with_startup_timeout(self.startup_timeout)
            .with_keep_on_shutdown(self.keep_on_shutdown);

        for (key, value) in &self.env {
            request = request.with_env(key, value);
        }
        request = request
            .with_env("KC_BOOTSTRAP_ADMIN_USERNAME", &self.admin_username)
            .with_env("KC_BOOTSTRAP_ADMIN_PASSWORD", password)
            .with_env("KEYCLOAK_ADMIN", &self.admin_username)
            .with_env("KEYCLOAK_ADMIN_PASSWORD", password);

        for (source, target) in copies {
            request = request.with_copy_file(source, target);
        }

        let container = match self.runtime {
            Some(runtime) => Container::with_runtime(request, runtime)?,
            None => Container::new(request)?,
        };

        Ok(KeycloakContainer::new(
            container,
            self.admin_username,
            self.admin_password,
            self.context_path,
            self.realm_import_files,
        ))
    }
}

/// Existing absolute paths are used as is. Anything else is taken relative
/// to `root`, so `/test-realm.json` means `{root}/test-realm.json`.
fn resolve_resource(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() && candidate.exists() {
        return candidate.to_path_buf();
    }
    root.join(path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubRuntime;
    use pretty_assertions::assert_eq;

    fn realm_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test-realm.json"), r#"{"realm":"test"}"#).unwrap();
        std::fs::write(
            dir.path().join("another-realm.json"),
            r#"{"realm":"another"}"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let keycloak = KeycloakBuilder::new().build().unwrap();
        let request = keycloak.container().request();

        assert_eq!(request.image().to_string(), "quay.io/keycloak/keycloak:26.0");
        assert_eq!(request.cmd().unwrap(), ["start-dev".to_string()]);
        assert!(request.exposed_ports().contains(&HTTP_PORT));
        assert!(request.copies().is_empty());
        assert_eq!(request.startup_timeout(), Duration::from_secs(90));
        assert_eq!(keycloak.admin_username(), "admin");
        assert_eq!(keycloak.admin_password(), "admin");
        assert_eq!(keycloak.context_path(), "/");
        assert_eq!(
            request.env().get("KC_BOOTSTRAP_ADMIN_USERNAME").map(String::as_str),
            Some("admin")
        );
    }

    #[test]
    fn test_realm_imports_and_context_path_shape_command() {
        let dir = realm_dir();
        let keycloak = KeycloakBuilder::new()
            .with_resource_root(dir.path())
            .with_realm_import_files(["/test-realm.json", "another-realm.json"])
            .with_context_path("/auth/")
            .build()
            .unwrap();
        let request = keycloak.container().request();

        assert_eq!(
            request.cmd().unwrap(),
            [
                "start-dev".to_string(),
                "--http-relative-path=/auth".to_string(),
                "--import-realm".to_string(),
            ]
        );
        let targets: Vec<&str> = request.copies().iter().map(|c| c.target.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "/opt/keycloak/data/import/test-realm.json",
                "/opt/keycloak/data/import/another-realm.json",
            ]
        );
        assert_eq!(request.copies()[0].source, dir.path().join("test-realm.json"));
        match request.wait_for() {
            WaitFor::Http { path, status, .. } => {
                assert_eq!(path, "/auth/realms/master");
                assert_eq!(*status, Some(200));
            }
            other => panic!("unexpected readiness check {other:?}"),
        }
        assert_eq!(
            keycloak.realm_import_files(),
            ["/test-realm.json".to_string(), "another-realm.json".to_string()]
        );
    }

    #[test]
    fn test_absolute_realm_path_used_verbatim() {
        let dir = realm_dir();
        let absolute = dir.path().join("test-realm.json");
        let keycloak = KeycloakBuilder::new()
            .with_resource_root("/nonexistent")
            .with_realm_import_file(absolute.to_string_lossy())
            .build()
            .unwrap();
        assert_eq!(keycloak.container().request().copies()[0].source, absolute);
    }

    #[test]
    fn test_missing_realm_file_rejected_at_build() {
        let dir = realm_dir();
        let err = KeycloakBuilder::new()
            .with_resource_root(dir.path())
            .with_realm_import_file("/missing-realm.json")
            .build()
            .unwrap_err();
        match err {
            ContainerError::ResourceNotFound { path } => {
                assert_eq!(path, dir.path().join("missing-realm.json"));
            }
            other => panic!("expected ResourceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_realm_file_names_rejected() {
        let dir = realm_dir();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("test-realm.json"), "{}").unwrap();

        let err = KeycloakBuilder::new()
            .with_resource_root(dir.path())
            .with_realm_import_files(["test-realm.json", "nested/test-realm.json"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("test-realm.json"));
    }

    #[test]
    fn test_invalid_context_paths() {
        for path in ["auth/", "/auth", ""] {
            let err = KeycloakBuilder::new()
                .with_context_path(path)
                .build()
                .unwrap_err();
            assert!(matches!(err, ContainerError::Config { .. }), "{path}");
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = KeycloakBuilder::new()
            .with_startup_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContainerError::Config { .. }));
    }

    #[test]
    fn test_admin_credentials_override_env() {
        let keycloak = KeycloakBuilder::new()
            .with_env("KEYCLOAK_ADMIN", "ignored")
            .with_env("KC_LOG_LEVEL", "debug")
            .with_admin_username("foo")
            .with_admin_password("bar")
            .with_runtime(Arc::new(StubRuntime::new()))
            .build()
            .unwrap();
        let env = keycloak.container().request().env();

        assert_eq!(env.get("KEYCLOAK_ADMIN").map(String::as_str), Some("foo"));
        assert_eq!(
            env.get("KC_BOOTSTRAP_ADMIN_PASSWORD").map(String::as_str),
            Some("bar")
        );
        assert_eq!(env.get("KC_LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(keycloak.admin_username(), "foo");
        assert_eq!(keycloak.admin_password(), "bar");
    }

    #[test]
    fn test_settings_seed_builder() {
        let settings = KeycloakSettings {
            version: "25.0".to_string(),
            startup_timeout_secs: 30,
            keep_on_shutdown: true,
            ..KeycloakSettings::default()
        };
        let keycloak = KeycloakBuilder::from_settings(&settings).build().unwrap();
        let request = keycloak.container().request();

        assert_eq!(request.image().tag(), "25.0");
        assert_eq!(request.startup_timeout(), Duration::from_secs(30));
        assert!(request.keep_on_shutdown());
    }
}
