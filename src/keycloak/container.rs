//! A running (or runnable) Keycloak server.

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;

use crate::container::error::Result;
use crate::container::{Container, ReadinessState};
use crate::keycloak::admin::{AdminApi, KeycloakAdminClient};
use crate::keycloak::builder::HTTP_PORT;

/// Keycloak server managed by a [`Container`].
///
/// Created by [`KeycloakBuilder::build`](crate::keycloak::KeycloakBuilder::build).
/// URL, admin client and version are only available while the server is
/// ready; the container is removed on [`stop`](Self::stop) or drop.
pub struct KeycloakContainer {
    container: Container,
    admin_username: String,
    admin_password: SecretString,
    context_path: String,
    realm_import_files: Vec<String>,
    version: OnceCell<String>,
}

impl std::fmt::Debug for KeycloakContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakContainer")
            .field("container", &self.container)
            .field("admin_username", &self.admin_username)
            .field("context_path", &self.context_path)
            .field("realm_import_files", &self.realm_import_files)
            .finish_non_exhaustive()
    }
}

impl KeycloakContainer {
    pub(crate) fn new(
        container: Container,
        admin_username: String,
        admin_password: SecretString,
        context_path: String,
        realm_import_files: Vec<String>,
    ) -> Self {
        Self {
            container,
            admin_username,
            admin_password,
            context_path,
            realm_import_files,
            version: OnceCell::new(),
        }
    }

    /// Start the server and wait until the master realm answers.
    pub async fn start(&mut self) -> Result<()> {
        self.container.start().await?;
        tracing::info!(
            "Keycloak ready at {}",
            self.mapped_url().unwrap_or_default()
        );
        Ok(())
    }

    /// Stop and remove the server. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.container.stop().await
    }

    pub fn state(&self) -> ReadinessState {
        self.container.state()
    }

    /// `http://{host}:{port}{context_path}`, always ending in `/`.
    pub fn mapped_url(&self) -> Result<String> {
        self.container.mapped_url(HTTP_PORT, &self.context_path)
    }

    pub fn host(&self) -> Result<&str> {
        self.container.host()
    }

    /// Host port published for Keycloak's HTTP port.
    pub fn http_port(&self) -> Result<u16> {
        self.container.mapped_port(HTTP_PORT)
    }

    /// Admin REST client logged in as the bootstrap admin.
    pub fn admin_client(&self) -> Result<KeycloakAdminClient> {
        KeycloakAdminClient::new(
            self.mapped_url()?,
            self.admin_username.clone(),
            self.admin_password.clone(),
        )
    }

    /// Server version as reported by `admin/serverinfo`. Fetched once.
    pub async fn version(&self) -> Result<&str> {
        self.container.handle()?;

        let version = self
            .version
            .get_or_try_init(|| async {
                let info = self.admin_client()?.server_info().await?;
                tracing::debug!("Keycloak reports version {}", info.system_info.version);
                Ok::<_, crate::container::ContainerError>(info.system_info.version)
            })
            .await?;
        Ok(version.as_str())
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    /// Get the admin password (exposes the secret).
    pub fn admin_password(&self) -> &str {
        self.admin_password.expose_secret()
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Realm files as given to the builder.
    pub fn realm_import_files(&self) -> &[String] {
        &self.realm_import_files
    }

    /// The underlying generic container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Container output; `tail` limits it to the last N lines.
    pub async fn logs(&self, tail: Option<usize>) -> Result<String> {
        self.container.logs(tail).await
    }
}
