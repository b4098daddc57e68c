//! Transient, session-scoped artifact store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use adventuremap_shared::{AdventureMapError, Result, SessionId};

/// Write-once store keyed by session and artifact name.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, session: &SessionId, name: &str, content: &str) -> Result<()>;
}

/// Generate a fresh reference name: `adventure_map_<8 hex>.kml`.
pub fn reference_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("adventure_map_{}.kml", &id[..8])
}

/// Process-local artifact store.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<(SessionId, String), String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an artifact back. The pipeline never does this; callers
    /// exporting a finished run do.
    pub async fn get(&self, session: &SessionId, name: &str) -> Option<String> {
        self.artifacts
            .lock()
            .await
            .get(&(session.clone(), name.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, session: &SessionId, name: &str, content: &str) -> Result<()> {
        let mut artifacts = self.artifacts.lock().await;
        let key = (session.clone(), name.to_string());
        if artifacts.contains_key(&key) {
            return Err(AdventureMapError::Storage(format!(
                "artifact {name} already exists in session {session}"
            )));
        }
        artifacts.insert(key, content.to_string());
        tracing::debug!(%session, name, bytes = content.len(), "artifact saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_names_match_pattern() {
        let re = regex::Regex::new(r"^adventure_map_[0-9a-f]{8}\.kml$").unwrap();
        for _ in 0..20 {
            let name = reference_name();
            assert!(re.is_match(&name), "{name}");
        }
    }

    #[tokio::test]
    async fn artifacts_are_session_scoped() {
        let store = InMemoryArtifactStore::new();
        let a = SessionId::new();
        let b = SessionId::new();

        store.save(&a, "map.kml", "<kml/>").await.unwrap();

        assert_eq!(store.get(&a, "map.kml").await.as_deref(), Some("<kml/>"));
        assert_eq!(store.get(&b, "map.kml").await, None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn names_are_write_once() {
        let store = InMemoryArtifactStore::new();
        let session = SessionId::new();

        store.save(&session, "map.kml", "first").await.unwrap();
        let err = store.save(&session, "map.kml", "second").await.unwrap_err();

        assert!(matches!(err, AdventureMapError::Storage(_)));
        assert_eq!(store.get(&session, "map.kml").await.as_deref(), Some("first"));
    }
}
