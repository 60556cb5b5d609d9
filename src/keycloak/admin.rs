//! Minimal Keycloak admin REST client.
//!
//! Logs in against the master realm with the `admin-cli` client (password
//! grant) and reuses the access token until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::container::error::{ContainerError, Result};

/// Client id used for admin logins.
pub const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(10);

/// Response of `GET admin/serverinfo`. Only the fields this crate reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Server version, e.g. `26.0.7`.
    pub version: String,
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub java_version: Option<String>,
}

/// A realm as returned by `GET admin/realms`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    #[serde(default)]
    pub id: Option<String>,
    pub realm: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Admin operations used by tests.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn server_info(&self) -> Result<ServerInfo>;

    /// All realms visible to the admin user.
    async fn realms(&self) -> Result<Vec<RealmRepresentation>>;

    async fn realm(&self, name: &str) -> Result<RealmRepresentation>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Admin client bound to one server.
pub struct KeycloakAdminClient {
    client: Client,
    /// Server root including the context path, always ending in `/`.
    base_url: String,
    username: String,
    password: SecretString,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for KeycloakAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakAdminClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl KeycloakAdminClient {
    /// Create a client for the server at `base_url` (e.g.
    /// `http://localhost:32768/auth/`). No request is made until first use.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ContainerError::Http(format!("Failed to build HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            username: username.into(),
            password,
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Base URL extended with `segments`, each percent-encoded as a single
    /// path segment.
    fn segment_url(&self, segments: &[&str]) -> Result<String> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| ContainerError::Http(format!("Invalid base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ContainerError::Http(format!("Base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// A valid access token, logging in if none is cached or it is about
    /// to expire.
    pub async fn access_token(&self) -> Result<SecretString> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at
        {
            return Ok(token.token.clone());
        }

        let fresh = self.login().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn login(&self) -> Result<CachedToken> {
        let url = self.url("realms/master/protocol/openid-connect/token");
        tracing::debug!("Logging in to Keycloak admin as {} at {}", self.username, url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", ADMIN_CLIENT_ID),
                ("username", self.username.as_str()),
                ("password", self.password.expose_secret()),
            ])
            .send()
            .await?;

        let token: TokenResponse = read_json(&url, response).await?;
        Ok(CachedToken {
            token: SecretString::from(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .send()
            .await?;

        read_json(&url, response).await
    }
}

#[async_trait]
impl AdminApi for KeycloakAdminClient {
    async fn server_info(&self) -> Result<ServerInfo> {
        self.get_json(self.url("admin/serverinfo")).await
    }

    async fn realms(&self) -> Result<Vec<RealmRepresentation>> {
        self.get_json(self.url("admin/realms")).await
    }

    async fn realm(&self, name: &str) -> Result<RealmRepresentation> {
        let url = self.segment_url(&["admin", "realms", name])?;
        self.get_json(url).await
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(ContainerError::Admin {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ContainerError::Http(format!("Invalid JSON from {url}: {e}")))
}
