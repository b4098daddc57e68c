//! Google Cloud Storage: media upload and V4 signed download URLs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use adventuremap_shared::{AdventureMapError, Result};

use crate::credentials::{BlobSigner, TokenProvider};

const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Durable object storage, one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, object: &str, content: &[u8], content_type: &str) -> Result<()>;
}

/// Mints time-limited download links for stored objects.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn signed_url(&self, object: &str, expires_in: Duration) -> Result<SignedUrl>;
}

/// A time-limited download link.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Uploads through the JSON API's simple media upload.
pub struct GcsObjectStore {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
    bucket: String,
}

impl GcsObjectStore {
    pub fn new(
        client: Client,
        tokens: Arc<dyn TokenProvider>,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            base_url: base_url.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip_all, fields(bucket = %self.bucket, object = %object))]
    async fn upload(&self, object: &str, content: &[u8], content_type: &str) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url.trim_end_matches('/'),
            self.bucket
        );

        self.client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content.to_vec())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdventureMapError::Storage(format!("upload of {object} failed: {e}")))?;

        info!(bytes = content.len(), "object uploaded");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// V4 signing
// ---------------------------------------------------------------------------

/// Produces V4 query-string signed URLs, delegating the RSA signature.
pub struct V4UrlSigner {
    signer: Arc<dyn BlobSigner>,
    base_url: Url,
    bucket: String,
}

impl V4UrlSigner {
    pub fn new(signer: Arc<dyn BlobSigner>, base_url: &str, bucket: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdventureMapError::config(format!("invalid storage URL '{base_url}': {e}")))?;
        if base_url.host_str().is_none() {
            return Err(AdventureMapError::config(format!(
                "storage URL has no host: {base_url}"
            )));
        }
        Ok(Self {
            signer,
            base_url,
            bucket: bucket.into(),
        })
    }

    fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Sign `object` as of `now`.
    pub async fn signed_url_at(
        &self,
        object: &str,
        expires_in: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl> {
        let request = CanonicalRequest::new(
            &self.host(),
            &self.bucket,
            object,
            self.signer.signer_email(),
            expires_in,
            now,
        );

        let signature = self.signer.sign_blob(request.string_to_sign().as_bytes()).await?;

        let url = format!(
            "{}://{}{}?{}&X-Goog-Signature={}",
            self.base_url.scheme(),
            self.host(),
            request.resource,
            request.query,
            hex(&signature)
        );

        let expires_at = now
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| AdventureMapError::Signing(format!("expiry out of range: {e}")))?;

        Ok(SignedUrl { url, expires_at })
    }
}

#[async_trait]
impl UrlSigner for V4UrlSigner {
    #[instrument(skip_all, fields(bucket = %self.bucket, object = %object))]
    async fn signed_url(&self, object: &str, expires_in: Duration) -> Result<SignedUrl> {
        let signed = self.signed_url_at(object, expires_in, Utc::now()).await?;
        debug!(expires_at = %signed.expires_at, "signed URL minted");
        Ok(signed)
    }
}

/// The pieces of a V4 signature that do not involve the key.
struct CanonicalRequest {
    resource: String,
    query: String,
    canonical: String,
    timestamp: String,
    scope: String,
}

impl CanonicalRequest {
    fn new(
        host: &str,
        bucket: &str,
        object: &str,
        signer_email: &str,
        expires_in: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{signer_email}/{scope}");

        let resource = format!("/{}/{}", uri_encode(bucket, true), uri_encode(object, false));

        // Parameters must be sorted by name; this order already is.
        let query = [
            ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
            ("X-Goog-Credential", credential),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", expires_in.as_secs().to_string()),
            ("X-Goog-SignedHeaders", "host".to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

        let canonical = format!("GET\n{resource}\n{query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD");

        Self {
            resource,
            query,
            canonical,
            timestamp,
            scope,
        }
    }

    fn string_to_sign(&self) -> String {
        let digest = Sha256::digest(self.canonical.as_bytes());
        format!(
            "{SIGNING_ALGORITHM}\n{}\n{}\n{:x}",
            self.timestamp, self.scope, digest
        )
    }
}

/// Percent-encode everything except RFC 3986 unreserved characters.
/// `/` is kept literal in object paths unless `encode_slash` is set.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::credentials::StaticTokenProvider;

    use super::*;

    struct FixedSigner;

    #[async_trait]
    impl BlobSigner for FixedSigner {
        fn signer_email(&self) -> &str {
            "signer@demo.iam.gserviceaccount.com"
        }

        async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>> {
            assert!(payload.starts_with(b"GOOG4-RSA-SHA256\n20240501T120000Z\n"));
            Ok(vec![0x01, 0xab, 0xff])
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn uri_encoding_rules() {
        assert_eq!(uri_encode("a b/c.kml", false), "a%20b/c.kml");
        assert_eq!(uri_encode("a b/c.kml", true), "a%20b%2Fc.kml");
        assert_eq!(uri_encode("x@y", true), "x%40y");
        assert_eq!(uri_encode("safe-_.~", true), "safe-_.~");
    }

    #[test]
    fn canonical_request_layout() {
        let request = CanonicalRequest::new(
            "storage.googleapis.com",
            "kml-bucket",
            "adventure_maps/s1/adventure_map_0123abcd.kml",
            "signer@demo.iam.gserviceaccount.com",
            Duration::from_secs(3600),
            fixed_now(),
        );

        assert_eq!(
            request.resource,
            "/kml-bucket/adventure_maps/s1/adventure_map_0123abcd.kml"
        );
        assert_eq!(
            request.query,
            "X-Goog-Algorithm=GOOG4-RSA-SHA256\
             &X-Goog-Credential=signer%40demo.iam.gserviceaccount.com%2F20240501%2Fauto%2Fstorage%2Fgoog4_request\
             &X-Goog-Date=20240501T120000Z\
             &X-Goog-Expires=3600\
             &X-Goog-SignedHeaders=host"
        );
        assert!(request.canonical.starts_with("GET\n/kml-bucket/"));
        assert!(request.canonical.ends_with("\nhost:storage.googleapis.com\n\nhost\nUNSIGNED-PAYLOAD"));

        let to_sign = request.string_to_sign();
        let lines: Vec<_> = to_sign.lines().collect();
        assert_eq!(lines[0], "GOOG4-RSA-SHA256");
        assert_eq!(lines[1], "20240501T120000Z");
        assert_eq!(lines[2], "20240501/auto/storage/goog4_request");
        assert_eq!(lines[3].len(), 64);
    }

    #[tokio::test]
    async fn signed_url_embeds_hex_signature_and_expiry() {
        let signer = V4UrlSigner::new(
            Arc::new(FixedSigner),
            "https://storage.googleapis.com",
            "kml-bucket",
        )
        .unwrap();

        let signed = signer
            .signed_url_at("maps/a.kml", Duration::from_secs(3600), fixed_now())
            .await
            .unwrap();

        assert!(
            signed
                .url
                .starts_with("https://storage.googleapis.com/kml-bucket/maps/a.kml?X-Goog-Algorithm=")
        );
        assert!(signed.url.ends_with("&X-Goog-Signature=01abff"));
        assert_eq!(signed.expires_at, fixed_now() + chrono::Duration::hours(1));
    }

    #[test]
    fn signer_rejects_hostless_url() {
        assert!(V4UrlSigner::new(Arc::new(FixedSigner), "not a url", "b").is_err());
    }

    #[tokio::test]
    async fn upload_posts_media_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/kml-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "adventure_maps/s1/map.kml"))
            .and(header("authorization", "Bearer ambient"))
            .and(header("content-type", "application/vnd.google-earth.kml+xml"))
            .and(body_string("<kml/>"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "adventure_maps/s1/map.kml"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcsObjectStore::new(
            Client::new(),
            Arc::new(StaticTokenProvider::new("ambient")),
            server.uri(),
            "kml-bucket",
        );

        store
            .upload(
                "adventure_maps/s1/map.kml",
                b"<kml/>",
                "application/vnd.google-earth.kml+xml",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_failure_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let store = GcsObjectStore::new(
            Client::new(),
            Arc::new(StaticTokenProvider::new("ambient")),
            server.uri(),
            "kml-bucket",
        );

        let err = store.upload("o.kml", b"x", "text/plain").await.unwrap_err();
        assert!(matches!(err, AdventureMapError::Storage(_)));
    }
}
