//! Discovery sources and inventory providers
//!
//! A source groups one or more providers (inventory scan, external query,
//! plugin enumeration). Refreshing a source runs every provider and merges
//! their lists, dropping duplicates by [`DiscoveredItem::key`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::executor::ExecutorDescriptor;

/// What a source inventories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Executors,
    Skills,
    Commands,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Executors => "executors",
            Self::Skills => "skills",
            Self::Commands => "commands",
        };
        f.write_str(name)
    }
}

/// One inventory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveredItem {
    Executor(ExecutorDescriptor),
    Skill {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    Command {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl DiscoveredItem {
    pub fn skill(name: impl Into<String>) -> Self {
        Self::Skill {
            name: name.into(),
            description: None,
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::Command {
            name: name.into(),
            description: None,
        }
    }

    /// Identity used for de-duplication
    pub fn key(&self) -> String {
        match self {
            Self::Executor(descriptor) => format!("executor:{}", descriptor.id),
            Self::Skill { name, .. } => format!("skill:{}", name),
            Self::Command { name, .. } => format!("command:{}", name),
        }
    }

    pub fn as_executor(&self) -> Option<&ExecutorDescriptor> {
        match self {
            Self::Executor(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// One discovery method of a source
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> anyhow::Result<Vec<DiscoveredItem>>;
}

/// Named source with its providers and refresh interval
pub struct DiscoverySource {
    pub kind: SourceKind,
    pub id: String,
    /// `None` uses the configured default
    pub refresh_interval: Option<Duration>,
    providers: Vec<Arc<dyn InventoryProvider>>,
}

impl DiscoverySource {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            refresh_interval: None,
            providers: Vec::new(),
        }
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn InventoryProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn InventoryProvider>] {
        &self.providers
    }
}

impl fmt::Debug for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySource")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("refresh_interval", &self.refresh_interval)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Built-in providers
// ============================================================================

/// Provider returning a fixed list
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    items: Vec<DiscoveredItem>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, items: Vec<DiscoveredItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

#[async_trait]
impl InventoryProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> anyhow::Result<Vec<DiscoveredItem>> {
        Ok(self.items.clone())
    }
}

/// Provider scanning a directory of `*.toml` executor manifests
///
/// Each file holds one [`ExecutorDescriptor`]. Files that fail to parse are
/// skipped with a warning; a missing directory is an error.
#[derive(Debug, Clone)]
pub struct ManifestProvider {
    name: String,
    directory: PathBuf,
}

impl ManifestProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            name: format!("manifests:{}", directory.display()),
            directory,
        }
    }

    /// Read every manifest in the directory, in file name order
    pub async fn load(&self) -> anyhow::Result<Vec<ExecutorDescriptor>> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .with_context(|| format!("Failed to read manifest directory {}", self.directory.display()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut descriptors = Vec::with_capacity(paths.len());
        for path in paths {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read manifest {}", path.display()))?;

            match toml::from_str::<ExecutorDescriptor>(&content) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!("Skipping invalid manifest {}: {}", path.display(), e),
            }
        }

        debug!(
            "Loaded {} executor manifests from {}",
            descriptors.len(),
            self.directory.display()
        );

        Ok(descriptors)
    }
}

#[async_trait]
impl InventoryProvider for ManifestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> anyhow::Result<Vec<DiscoveredItem>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(DiscoveredItem::Executor)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_item_keys() {
        let executor = DiscoveredItem::Executor(ExecutorDescriptor::new("E1", "w", "BackendDev"));
        assert_eq!(executor.key(), "executor:E1");
        assert_eq!(DiscoveredItem::skill("pdf").key(), "skill:pdf");
        assert_ne!(DiscoveredItem::skill("x").key(), DiscoveredItem::command("x").key());
        assert!(executor.as_executor().is_some());
    }

    #[test]
    fn test_item_json_is_tagged() {
        let value = serde_json::to_value(DiscoveredItem::command("deploy")).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["name"], "deploy");
    }

    #[tokio::test]
    async fn test_manifest_provider_scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.toml"),
            "id = \"E2\"\nname = \"ops\"\nrole = \"DevOps\"\ntools = [\"docker\"]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.toml"),
            "id = \"E1\"\nname = \"backend\"\nrole = \"BackendDev\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.toml"), "id = ").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let provider = ManifestProvider::new(dir.path());
        let items = provider.discover().await.unwrap();

        let keys: Vec<String> = items.iter().map(DiscoveredItem::key).collect();
        assert_eq!(keys, vec!["executor:E1", "executor:E2"]);
    }

    #[tokio::test]
    async fn test_manifest_provider_missing_directory() {
        let provider = ManifestProvider::new("/nonexistent/manifests");
        assert!(provider.discover().await.is_err());
    }
}
