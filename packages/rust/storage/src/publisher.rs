//! Persist an encoded map file and describe where it went.
//!
//! Durable storage (upload + signed link) is tried when configured. Any
//! failure there falls back to the transient artifact store. No step is
//! retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, instrument, warn};

use adventuremap_kml::{KML_CONTENT_TYPE, KmlDocument};
use adventuremap_shared::{AdventureMapError, Result, SessionId, StorageConfig};

use crate::artifacts::{ArtifactStore, reference_name};
use crate::credentials::{BlobSigner, ImpersonatedCredentials, ambient_token_provider};
use crate::gcs::{GcsObjectStore, ObjectStore, SignedUrl, UrlSigner, V4UrlSigner};

/// Where a published document ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Uploaded, with a signed download link.
    Signed {
        object: String,
        link: SignedUrl,
        valid_for: Duration,
    },
    /// Durable storage failed; saved to the artifact store instead.
    Fallback { name: String, reason: String },
    /// Durable storage not configured; saved to the artifact store.
    Local { name: String },
    /// Nothing could be persisted.
    Failed { reason: String },
}

impl PublishOutcome {
    /// The user-facing status line.
    pub fn message(&self) -> String {
        match self {
            Self::Signed {
                link, valid_for, ..
            } => format!(
                "KML file generated and uploaded. Download it here (link valid for {} minutes): {}",
                valid_for.as_secs() / 60,
                link.url
            ),
            Self::Fallback { name, reason } => format!(
                "GCS operation failed ({reason}). KML file saved as artifact instead: {name}"
            ),
            Self::Local { name } => format!("KML file generated and saved as artifact: {name}"),
            Self::Failed { reason } => format!("Error saving KML artifact: {reason}"),
        }
    }

    /// The transient artifact name, when one was written.
    pub fn artifact_name(&self) -> Option<&str> {
        match self {
            Self::Fallback { name, .. } | Self::Local { name } => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Durable storage collaborators.
pub struct DurableStorage {
    pub store: Arc<dyn ObjectStore>,
    pub signer: Arc<dyn UrlSigner>,
    /// Objects land at `<prefix>/<session>/<name>`.
    pub object_prefix: String,
    pub link_lifetime: Duration,
}

/// Sole writer of persisted map files.
pub struct ArtifactPublisher {
    durable: Option<DurableStorage>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ArtifactPublisher {
    /// Publisher that only writes to the artifact store.
    pub fn transient(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            durable: None,
            artifacts,
        }
    }

    pub fn with_durable(durable: DurableStorage, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            durable: Some(durable),
            artifacts,
        }
    }

    /// Build from config: GCS with impersonated signing when bucket and
    /// project are real, artifact store only otherwise.
    pub fn from_config(config: &StorageConfig, artifacts: Arc<dyn ArtifactStore>) -> Result<Self> {
        if !config.durable_enabled() {
            warn!(
                "storage bucket or project not configured; map files will only be kept in memory"
            );
            return Ok(Self::transient(artifacts));
        }

        let client = Client::builder()
            .user_agent(concat!("AdventureMap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdventureMapError::Network(format!("failed to build HTTP client: {e}")))?;

        let ambient = ambient_token_provider(client.clone(), &config.metadata_url);

        let store = GcsObjectStore::new(
            client.clone(),
            ambient.clone(),
            &config.storage_url,
            &config.bucket,
        );

        let signer: Arc<dyn UrlSigner> = match &config.signer_service_account {
            Some(account) => {
                let creds: Arc<dyn BlobSigner> = Arc::new(ImpersonatedCredentials::new(
                    client,
                    ambient,
                    account,
                    &config.iam_credentials_url,
                ));
                Arc::new(V4UrlSigner::new(creds, &config.storage_url, &config.bucket)?)
            }
            None => Arc::new(UnconfiguredSigner),
        };

        info!(bucket = %config.bucket, project = %config.project_id, "durable storage enabled");

        Ok(Self::with_durable(
            DurableStorage {
                store: Arc::new(store),
                signer,
                object_prefix: config.object_prefix.clone(),
                link_lifetime: Duration::from_secs(config.signed_url_expiration_secs),
            },
            artifacts,
        ))
    }

    pub fn durable_enabled(&self) -> bool {
        self.durable.is_some()
    }

    /// Persist `document` for `session`. Never fails; the outcome says how.
    #[instrument(skip_all, fields(session = %session, placemarks = document.placemark_count()))]
    pub async fn publish(&self, document: KmlDocument, session: &SessionId) -> PublishOutcome {
        let name = reference_name();
        let content = document.into_string();

        let Some(durable) = &self.durable else {
            return self.save_artifact(session, name, &content, None).await;
        };

        match publish_durable(durable, session, &name, &content).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "durable storage failed, falling back to artifact store");
                self.save_artifact(session, name, &content, Some(e.to_string()))
                    .await
            }
        }
    }

    async fn save_artifact(
        &self,
        session: &SessionId,
        name: String,
        content: &str,
        durable_error: Option<String>,
    ) -> PublishOutcome {
        if let Err(e) = self.artifacts.save(session, &name, content).await {
            warn!(error = %e, %name, "artifact save failed");
            let reason = match durable_error {
                Some(first) => format!("{e} (after GCS failure: {first})"),
                None => e.to_string(),
            };
            return PublishOutcome::Failed { reason };
        }

        info!(%name, "map file saved as artifact");
        match durable_error {
            Some(reason) => PublishOutcome::Fallback { name, reason },
            None => PublishOutcome::Local { name },
        }
    }
}

async fn publish_durable(
    durable: &DurableStorage,
    session: &SessionId,
    name: &str,
    content: &str,
) -> Result<PublishOutcome> {
    let object = format!(
        "{}/{session}/{name}",
        durable.object_prefix.trim_end_matches('/')
    );

    durable
        .store
        .upload(&object, content.as_bytes(), KML_CONTENT_TYPE)
        .await?;

    let link = durable
        .signer
        .signed_url(&object, durable.link_lifetime)
        .await?;

    info!(%object, expires_at = %link.expires_at, "map file uploaded and signed");

    Ok(PublishOutcome::Signed {
        object,
        link,
        valid_for: durable.link_lifetime,
    })
}

/// Stands in when no service account is configured for impersonation.
struct UnconfiguredSigner;

#[async_trait::async_trait]
impl UrlSigner for UnconfiguredSigner {
    async fn signed_url(&self, _object: &str, _expires_in: Duration) -> Result<SignedUrl> {
        Err(AdventureMapError::Signing(
            "no signer service account configured for URL signing".into(),
        ))
    }
}
