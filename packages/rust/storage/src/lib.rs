//! Persistence for generated map files.
//!
//! - [`ArtifactPublisher`]: sole writer; durable storage first, artifact
//!   store as fallback
//! - [`gcs`]: bucket upload and V4 signed URLs
//! - [`credentials`]: ambient tokens and service-account impersonation
//! - [`artifacts`]: in-process, session-scoped artifact store

pub mod artifacts;
pub mod credentials;
pub mod gcs;
mod publisher;

pub use artifacts::{ArtifactStore, InMemoryArtifactStore, reference_name};
pub use credentials::{
    BlobSigner, ImpersonatedCredentials, MetadataTokenProvider, StaticTokenProvider, TokenProvider,
};
pub use gcs::{GcsObjectStore, ObjectStore, SignedUrl, UrlSigner, V4UrlSigner};
pub use publisher::{ArtifactPublisher, DurableStorage, PublishOutcome};
