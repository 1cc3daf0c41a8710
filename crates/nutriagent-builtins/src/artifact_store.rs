//! Storage for generated label artifacts, addressed by `/labels/{name}`
//! locators.

use async_trait::async_trait;
use nutriagent_core::AgentResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Public path prefix under which stored artifacts are served.
pub const LABELS_PREFIX: &str = "/labels";

/// Locator string for an artifact name.
pub fn locator_for(name: &str) -> String {
    format!("{LABELS_PREFIX}/{name}")
}

/// Backend trait for artifact storage.
/// Implementations can be in-memory (default) or filesystem-based.
#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    /// Store `content` under `name` and return its public locator.
    async fn store(&self, name: &str, content: &str, kind: &str) -> AgentResult<String>;

    /// Fetch artifact content by name. `None` when nothing is stored
    /// under it.
    async fn retrieve(&self, name: &str) -> AgentResult<Option<String>>;

    /// List stored artifacts.
    async fn list(&self) -> AgentResult<Vec<ArtifactEntry>>;
}

/// Metadata about a stored artifact.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    /// Name the artifact is stored under.
    pub name: String,
    /// Content kind, e.g. "label".
    pub kind: String,
    /// Content size in bytes.
    pub size: usize,
}

/// In-memory artifact backend. Artifacts live for the process lifetime.
pub struct InMemoryArtifactBackend {
    store: RwLock<HashMap<String, (String, String)>>, // name → (content, kind)
}

impl InMemoryArtifactBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryArtifactBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactBackend for InMemoryArtifactBackend {
    async fn store(&self, name: &str, content: &str, kind: &str) -> AgentResult<String> {
        let mut store = self.store.write().await;
        store.insert(name.to_string(), (content.to_string(), kind.to_string()));
        Ok(locator_for(name))
    }

    async fn retrieve(&self, name: &str) -> AgentResult<Option<String>> {
        let store = self.store.read().await;
        Ok(store.get(name).map(|(content, _)| content.clone()))
    }

    async fn list(&self) -> AgentResult<Vec<ArtifactEntry>> {
        let store = self.store.read().await;
        Ok(store
            .iter()
            .map(|(name, (content, kind))| ArtifactEntry {
                name: name.clone(),
                kind: kind.clone(),
                size: content.len(),
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_returns_public_locator() {
        let backend = InMemoryArtifactBackend::new();
        let locator = backend.store("abc.txt", "label body", "label").await.unwrap();
        assert_eq!(locator, "/labels/abc.txt");
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let backend = InMemoryArtifactBackend::new();
        backend.store("abc.txt", "label body", "label").await.unwrap();
        let content = backend.retrieve("abc.txt").await.unwrap();
        assert_eq!(content, Some("label body".to_string()));
    }

    #[tokio::test]
    async fn test_retrieve_not_found() {
        let backend = InMemoryArtifactBackend::new();
        let content = backend.retrieve("nonexistent.txt").await.unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_list_reports_size_and_kind() {
        let backend = InMemoryArtifactBackend::new();
        backend.store("a.txt", "12345", "label").await.unwrap();
        backend.store("b.txt", "body", "label").await.unwrap();
        let mut entries = backend.list().await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].kind, "label");
        assert_eq!(entries[0].size, 5);
    }
}
