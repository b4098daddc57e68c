//! Access tokens and service-account impersonation.
//!
//! Ambient credentials on the hosting environment can upload objects but
//! cannot sign URLs. Signing goes through [`ImpersonatedCredentials`], which
//! exchanges the ambient token for a scoped token of a second service
//! account and signs bytes as that account via the IAM Credentials API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use adventuremap_shared::{AdventureMapError, Result};

/// Env var holding a pre-minted OAuth access token (local development).
pub const STATIC_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Scope requested for the impersonated identity.
const IMPERSONATION_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";

/// Lifetime requested for the impersonated token.
const IMPERSONATION_LIFETIME: Duration = Duration::from_secs(3600);

/// Refresh the impersonated token this long before it expires.
const EXPIRY_SKEW_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Supplies OAuth bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Signs raw bytes as a service account.
#[async_trait]
pub trait BlobSigner: Send + Sync {
    /// Email of the account whose key produces the signature.
    fn signer_email(&self) -> &str;

    async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Ambient token providers
// ---------------------------------------------------------------------------

/// A fixed token, e.g. from `gcloud auth print-access-token`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read [`STATIC_TOKEN_ENV`], if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var(STATIC_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Default service-account token from the GCE/Cloud Run metadata server.
pub struct MetadataTokenProvider {
    client: Client,
    base_url: String,
}

impl MetadataTokenProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    #[instrument(skip_all)]
    async fn access_token(&self) -> Result<String> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url.trim_end_matches('/')
        );
        debug!("fetching ambient token from metadata server");

        let token: MetadataToken = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdventureMapError::Signing(format!("metadata token request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AdventureMapError::parse(format!("metadata token response: {e}")))?;

        Ok(token.access_token)
    }
}

/// Pick the ambient provider: a static env token if present, else metadata.
pub fn ambient_token_provider(client: Client, metadata_url: &str) -> Arc<dyn TokenProvider> {
    match StaticTokenProvider::from_env() {
        Some(provider) => {
            debug!(env = STATIC_TOKEN_ENV, "using static access token");
            Arc::new(provider)
        }
        None => Arc::new(MetadataTokenProvider::new(client, metadata_url)),
    }
}

// ---------------------------------------------------------------------------
// Impersonation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    #[serde(default)]
    key_id: Option<String>,
    signed_blob: String,
}

#[derive(Debug, Clone)]
struct ScopedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Credentials of `target_principal`, obtained from a source identity.
pub struct ImpersonatedCredentials {
    client: Client,
    source: Arc<dyn TokenProvider>,
    target_principal: String,
    iam_base_url: String,
    scoped: Mutex<Option<ScopedToken>>,
}

impl ImpersonatedCredentials {
    pub fn new(
        client: Client,
        source: Arc<dyn TokenProvider>,
        target_principal: impl Into<String>,
        iam_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            source,
            target_principal: target_principal.into(),
            iam_base_url: iam_base_url.into(),
            scoped: Mutex::new(None),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/-/serviceAccounts/{}:{method}",
            self.iam_base_url.trim_end_matches('/'),
            self.target_principal
        )
    }

    /// The scoped token for the target account, exchanging if needed.
    #[instrument(skip_all, fields(target = %self.target_principal))]
    pub async fn access_token(&self) -> Result<String> {
        let mut scoped = self.scoped.lock().await;
        if let Some(current) = scoped.as_ref() {
            if current.expires_at - chrono::Duration::seconds(EXPIRY_SKEW_SECS) > Utc::now() {
                return Ok(current.token.clone());
            }
        }

        let source_token = self.source.access_token().await?;
        let body = serde_json::json!({
            "scope": [IMPERSONATION_SCOPE],
            "lifetime": format!("{}s", IMPERSONATION_LIFETIME.as_secs()),
        });

        let response: GenerateAccessTokenResponse = self
            .client
            .post(self.endpoint("generateAccessToken"))
            .bearer_auth(&source_token)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdventureMapError::Signing(format!("impersonation failed: {e}")))?
            .json()
            .await
            .map_err(|e| AdventureMapError::parse(format!("generateAccessToken response: {e}")))?;

        info!(expires_at = %response.expire_time, "obtained impersonated credentials");

        let token = response.access_token.clone();
        *scoped = Some(ScopedToken {
            token: response.access_token,
            expires_at: response.expire_time,
        });
        Ok(token)
    }
}

#[async_trait]
impl BlobSigner for ImpersonatedCredentials {
    fn signer_email(&self) -> &str {
        &self.target_principal
    }

    /// Sign as the target account. The exchange must succeed first; the
    /// signBlob call itself is authorized by the source identity.
    #[instrument(skip_all, fields(target = %self.target_principal, bytes = payload.len()))]
    async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.access_token().await?;
        let source_token = self.source.access_token().await?;

        let body = serde_json::json!({ "payload": STANDARD.encode(payload) });

        let response: SignBlobResponse = self
            .client
            .post(self.endpoint("signBlob"))
            .bearer_auth(&source_token)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdventureMapError::Signing(format!("signBlob failed: {e}")))?
            .json()
            .await
            .map_err(|e| AdventureMapError::parse(format!("signBlob response: {e}")))?;

        debug!(key_id = ?response.key_id, "blob signed");

        STANDARD
            .decode(response.signed_blob.as_bytes())
            .map_err(|e| AdventureMapError::Signing(format!("signBlob returned invalid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const SIGNER: &str = "kml-signer@demo-project.iam.gserviceaccount.com";

    fn impersonated(server: &MockServer) -> ImpersonatedCredentials {
        ImpersonatedCredentials::new(
            Client::new(),
            Arc::new(StaticTokenProvider::new("ambient-token")),
            SIGNER,
            server.uri(),
        )
    }

    async fn mount_generate_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1/projects/-/serviceAccounts/{SIGNER}:generateAccessToken"
            )))
            .and(header("authorization", "Bearer ambient-token"))
            .and(body_partial_json(serde_json::json!({
                "scope": [IMPERSONATION_SCOPE],
                "lifetime": "3600s"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "impersonated-token",
                "expireTime": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339()
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn metadata_provider_sends_flavor_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/computeMetadata/v1/instance/service-accounts/default/token",
            ))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.ambient",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::new(Client::new(), server.uri());
        assert_eq!(provider.access_token().await.unwrap(), "ya29.ambient");
    }

    #[tokio::test]
    async fn exchange_is_cached_until_expiry() {
        let server = MockServer::start().await;
        mount_generate_token(&server, 1).await;

        let creds = impersonated(&server);
        assert_eq!(creds.access_token().await.unwrap(), "impersonated-token");
        assert_eq!(creds.access_token().await.unwrap(), "impersonated-token");
    }

    #[tokio::test]
    async fn sign_blob_exchanges_then_signs() {
        let server = MockServer::start().await;
        mount_generate_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path(format!("/v1/projects/-/serviceAccounts/{SIGNER}:signBlob")))
            .and(body_partial_json(serde_json::json!({
                "payload": STANDARD.encode(b"string to sign")
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keyId": "abc123",
                "signedBlob": STANDARD.encode([0xde_u8, 0xad, 0xbe, 0xef])
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = impersonated(&server);
        let signature = creds.sign_blob(b"string to sign").await.unwrap();
        assert_eq!(signature, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(creds.signer_email(), SIGNER);
    }

    #[tokio::test]
    async fn failed_exchange_prevents_signing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1/projects/-/serviceAccounts/{SIGNER}:generateAccessToken"
            )))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/projects/-/serviceAccounts/{SIGNER}:signBlob")))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let creds = impersonated(&server);
        let err = creds.sign_blob(b"payload").await.unwrap_err();
        assert!(matches!(err, AdventureMapError::Signing(_)));
        assert!(err.to_string().contains("impersonation failed"));
    }
}
