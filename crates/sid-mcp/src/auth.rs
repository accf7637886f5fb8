//! Bearer tokens for remote tool hosts
//!
//! ## Sources
//!
//! - Fixed token (`MCP_AUTH_TOKEN`)
//! - Google Application Default Credentials:
//!   - service account key file (`GOOGLE_APPLICATION_CREDENTIALS`), JWT bearer grant
//!   - authorized user file (`gcloud auth application-default login`), refresh token grant
//!   - compute metadata server (Cloud Run / GCE workload identity)
//!
//! Google tokens are cached and refreshed shortly before they expire.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sid_core::{Error, Result, ToolHostAuth};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Google auth endpoints
pub mod endpoints {
    /// OAuth2 token endpoint
    pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

    pub const METADATA_FLAVOR: &str = "Metadata-Flavor";
}

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const JWT_LIFETIME_SECS: u64 = 3600;
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies the bearer token for each request to the tool host
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A token that never changes
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Build the token source for a configured auth mode; `None` sends no
/// `Authorization` header.
pub fn token_source(auth: &ToolHostAuth) -> Result<Option<Arc<dyn TokenSource>>> {
    match auth {
        ToolHostAuth::None => Ok(None),
        ToolHostAuth::Bearer(token) => Ok(Some(Arc::new(StaticToken::new(token.clone())))),
        ToolHostAuth::GoogleDefault {
            credentials_file,
            metadata_url,
        } => {
            let credentials = match credentials_file {
                Some(path) => GoogleCredentials::from_file(path)?,
                None => GoogleCredentials::Metadata {
                    url: metadata_url.clone(),
                },
            };
            info!(source = credentials.kind(), "Using Google credentials for the tool host");
            Ok(Some(Arc::new(GoogleTokenSource::new(credentials)?)))
        }
    }
}

/// Service account key file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Authorized user file written by `gcloud auth application-default login`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Where Google access tokens come from
#[derive(Debug, Clone)]
pub enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    Metadata { url: String },
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
}

impl GoogleCredentials {
    /// Parse a credentials JSON document by its `type` field.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid Google credentials file: {}", e)))?;
        let parsed = match file.kind.as_str() {
            "service_account" => serde_json::from_str(json).map(GoogleCredentials::ServiceAccount),
            "authorized_user" => serde_json::from_str(json).map(GoogleCredentials::AuthorizedUser),
            other => {
                return Err(Error::config(format!(
                    "Unsupported Google credentials type: {}",
                    other
                )))
            }
        };
        parsed.map_err(|e| Error::config(format!("Invalid Google credentials file: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    fn kind(&self) -> &'static str {
        match self {
            GoogleCredentials::ServiceAccount(_) => "service_account",
            GoogleCredentials::AuthorizedUser(_) => "authorized_user",
            GoogleCredentials::Metadata { .. } => "metadata",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    JWT_LIFETIME_SECS
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    scope: &'a str,
    iat: u64,
    exp: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Google access tokens, fetched on demand and cached until near expiry
pub struct GoogleTokenSource {
    credentials: GoogleCredentials,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl GoogleTokenSource {
    pub fn new(credentials: GoogleCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            credentials,
            http,
            cache: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<TokenResponse> {
        let response = match &self.credentials {
            GoogleCredentials::ServiceAccount(key) => {
                let token_uri = key.token_uri.as_deref().unwrap_or(endpoints::OAUTH_TOKEN_URL);
                let assertion = service_account_jwt(key, token_uri)?;
                self.http
                    .post(token_uri)
                    .form(&[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await
            }
            GoogleCredentials::AuthorizedUser(user) => {
                let token_uri = user.token_uri.as_deref().unwrap_or(endpoints::OAUTH_TOKEN_URL);
                self.http
                    .post(token_uri)
                    .form(&[
                        ("client_id", user.client_id.as_str()),
                        ("client_secret", user.client_secret.as_str()),
                        ("refresh_token", user.refresh_token.as_str()),
                        ("grant_type", "refresh_token"),
                    ])
                    .send()
                    .await
            }
            GoogleCredentials::Metadata { url } => {
                self.http
                    .get(url)
                    .header(endpoints::METADATA_FLAVOR, "Google")
                    .send()
                    .await
            }
        }
        .map_err(|e| Error::authentication(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::authentication(format!(
                "Token request failed {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::authentication(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenSource for GoogleTokenSource {
    async fn token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() + EXPIRY_MARGIN {
                debug!("Using cached Google access token");
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        info!(
            source = self.credentials.kind(),
            "✅ Google access token obtained (expires in {}s)", fresh.expires_in
        );
        *cache = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        Ok(fresh.access_token)
    }
}

fn service_account_jwt(key: &ServiceAccountKey, audience: &str) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::internal(format!("Clock error: {}", e)))?
        .as_secs();

    let claims = JwtClaims {
        iss: &key.client_email,
        sub: &key.client_email,
        aud: audience,
        scope: endpoints::CLOUD_PLATFORM_SCOPE,
        iat: now,
        exp: now + JWT_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::authentication(format!("Invalid service account key: {}", e)))?;
    encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::authentication(format!("Failed to sign JWT: {}", e)))
}
