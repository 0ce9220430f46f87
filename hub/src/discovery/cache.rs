//! Discovery cache with per-source TTL.
//!
//! Each source's merged inventory is cached under `(kind, id)`. An entry is
//! valid only while `now - timestamp < ttl`, where the TTL is the source's
//! refresh interval; reads never return an expired entry. A refresh is skipped
//! while the entry is still fresh, i.e. younger than `freshness_ratio * ttl`
//! (80% by default), which leaves headroom before the next scheduled tick.
//!
//! When a registry is attached, executors discovered for the first time are
//! registered automatically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{HubError, Result};
use crate::registry::ExecutorRegistry;
use crate::schedule::{spawn_periodic, ScheduleHandle};

use super::{DiscoveredItem, DiscoverySource, SourceKind};

/// Cache key of one source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub kind: SourceKind,
    pub id: String,
}

impl SourceKey {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

/// Cached inventory of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub items: Vec<DiscoveredItem>,
    pub timestamp: DateTime<Utc>,
    pub ttl: Duration,
}

impl CachedEntry {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or_default()
    }

    /// Whether the entry may still be served at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }

    /// Whether a refresh at `now` can be skipped
    pub fn is_fresh_at(&self, now: DateTime<Utc>, freshness_ratio: f64) -> bool {
        self.age(now) < self.ttl.mul_f64(freshness_ratio)
    }
}

/// Result of a refresh call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshOutcome {
    /// Entry was fresh; discovery did not run
    Skipped,

    Refreshed {
        items: usize,
        new_executors: usize,
    },
}

/// Outcome of refreshing every source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub refreshed: Vec<SourceKey>,
    pub failed: Vec<SourceKey>,
}

/// A source with its own refresh lock
///
/// The lock keeps one source from being discovered twice concurrently while
/// other sources refresh independently.
struct SourceSlot {
    source: DiscoverySource,
    refresh_lock: Mutex<()>,
}

impl SourceSlot {
    fn key(&self) -> SourceKey {
        SourceKey::new(self.source.kind, self.source.id.clone())
    }
}

/// TTL cache over all discovery sources
pub struct DiscoveryCache {
    config: DiscoveryConfig,

    sources: Vec<Arc<SourceSlot>>,

    entries: RwLock<HashMap<SourceKey, CachedEntry>>,

    registry: Option<Arc<ExecutorRegistry>>,
}

impl DiscoveryCache {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            entries: RwLock::new(HashMap::new()),
            registry: None,
        }
    }

    /// Register newly discovered executors in `registry`
    pub fn with_registry(mut self, registry: Arc<ExecutorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a source; a later source with the same key replaces the earlier one
    pub fn add_source(&mut self, source: DiscoverySource) {
        let key = SourceKey::new(source.kind, source.id.clone());
        self.sources.retain(|slot| slot.key() != key);
        self.sources.push(Arc::new(SourceSlot {
            source,
            refresh_lock: Mutex::new(()),
        }));
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.sources.iter().map(|slot| slot.key())
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn source(&self, kind: SourceKind, id: &str) -> Result<Arc<SourceSlot>> {
        self.sources
            .iter()
            .find(|slot| slot.source.kind == kind && slot.source.id == id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("discovery source {}/{}", kind, id)))
    }

    fn ttl_of(&self, source: &DiscoverySource) -> Duration {
        source
            .refresh_interval
            .unwrap_or(self.config.default_refresh_interval)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refresh a source unless its entry is still fresh
    pub async fn refresh(&self, kind: SourceKind, id: &str) -> Result<RefreshOutcome> {
        self.refresh_at(kind, id, Utc::now()).await
    }

    /// Refresh a source as if the clock read `now`
    pub async fn refresh_at(&self, kind: SourceKind, id: &str, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        let slot = self.source(kind, id)?;
        self.run_source(&slot, now, false).await
    }

    /// Refresh every source concurrently, regardless of freshness
    pub async fn refresh_all(&self) -> RefreshSummary {
        let now = Utc::now();
        let mut summary = RefreshSummary::default();

        let results = join_all(self.sources.iter().map(|slot| self.run_source(slot, now, true))).await;

        for (slot, result) in self.sources.iter().zip(results) {
            let key = slot.key();
            match result {
                Ok(_) => summary.refreshed.push(key),
                Err(e) => {
                    warn!("Refresh of {}/{} failed: {}", key.kind, key.id, e);
                    summary.failed.push(key);
                }
            }
        }

        summary
    }

    async fn run_source(&self, slot: &SourceSlot, now: DateTime<Utc>, force: bool) -> Result<RefreshOutcome> {
        let _guard = slot.refresh_lock.lock().await;
        let source = &slot.source;
        let key = slot.key();

        if !force {
            if let Some(entry) = self.entries.read().await.get(&key) {
                if entry.is_fresh_at(now, self.config.freshness_ratio) {
                    debug!("Discovery source {}/{} is fresh, skipping", key.kind, key.id);
                    return Ok(RefreshOutcome::Skipped);
                }
            }
        }

        let mut items = Vec::new();
        let mut succeeded = 0;
        let mut last_error = None;

        let timeout = self.config.provider_timeout;
        for provider in source.providers() {
            let discovered = match tokio::time::timeout(timeout, provider.discover()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("provider {} timed out after {:?}", provider.name(), timeout)),
            };

            match discovered {
                Ok(found) => {
                    succeeded += 1;
                    items.extend(found);
                }
                Err(e) => {
                    warn!("Provider {} of {}/{} failed: {}", provider.name(), key.kind, key.id, e);
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(HubError::Other(
                    e.context(format!("every provider of {}/{} failed", key.kind, key.id)),
                ));
            }
        }

        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.key()));

        let new_executors = self.register_new_executors(&items).await;
        let count = items.len();

        self.entries.write().await.insert(
            key.clone(),
            CachedEntry {
                items,
                timestamp: now,
                ttl: self.ttl_of(source),
            },
        );

        info!(
            "Discovery source {}/{} refreshed: {} items, {} new executors",
            key.kind, key.id, count, new_executors
        );

        Ok(RefreshOutcome::Refreshed {
            items: count,
            new_executors,
        })
    }

    async fn register_new_executors(&self, items: &[DiscoveredItem]) -> usize {
        let Some(registry) = &self.registry else {
            return 0;
        };

        let mut added = 0;
        for descriptor in items.iter().filter_map(DiscoveredItem::as_executor) {
            if registry.register_if_absent(descriptor.clone()).await {
                added += 1;
            }
        }
        added
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Cached items of a source, only while the entry is within its TTL
    pub async fn get(&self, kind: SourceKind, id: &str) -> Option<Vec<DiscoveredItem>> {
        self.get_at(kind, id, Utc::now()).await
    }

    pub async fn get_at(&self, kind: SourceKind, id: &str, now: DateTime<Utc>) -> Option<Vec<DiscoveredItem>> {
        self.entries
            .read()
            .await
            .get(&SourceKey::new(kind, id))
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.items.clone())
    }

    /// Cached items of a source, refreshing first when missing or expired
    pub async fn get_or_refresh(&self, kind: SourceKind, id: &str) -> Result<Vec<DiscoveredItem>> {
        let now = Utc::now();
        if let Some(items) = self.get_at(kind, id, now).await {
            return Ok(items);
        }

        let slot = self.source(kind, id)?;
        self.run_source(&slot, now, true).await?;

        self.entries
            .read()
            .await
            .get(&SourceKey::new(kind, id))
            .map(|entry| entry.items.clone())
            .ok_or_else(|| HubError::NotFound(format!("discovery source {}/{}", kind, id)))
    }

    /// Merged valid inventory of every source of `kind`
    pub async fn inventory(&self, kind: SourceKind) -> Vec<DiscoveredItem> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for slot in self.sources.iter().filter(|slot| slot.source.kind == kind) {
            let key = slot.key();
            if let Some(entry) = entries.get(&key).filter(|e| e.is_valid_at(now)) {
                items.extend(
                    entry
                        .items
                        .iter()
                        .filter(|item| seen.insert(item.key()))
                        .cloned(),
                );
            }
        }

        items
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let initial = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        initial - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Start one refresh loop per source, each on its own interval
    pub fn spawn(self: Arc<Self>) -> Vec<ScheduleHandle> {
        self.sources
            .iter()
            .map(|slot| {
                let cache = self.clone();
                let kind = slot.source.kind;
                let id = slot.source.id.clone();
                let period = self.ttl_of(&slot.source);

                spawn_periodic(format!("discovery:{}/{}", kind, id), period, true, move || {
                    let cache = cache.clone();
                    let id = id.clone();
                    async move {
                        if let Err(e) = cache.refresh(kind, &id).await {
                            warn!("Scheduled refresh of {}/{} failed: {}", kind, id, e);
                        }
                    }
                })
            })
            .collect()
    }
}
