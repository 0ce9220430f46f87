//! Executor Registry - Registration Table
//!
//! In-memory table of every known executor together with its live status and
//! rolling metrics. Supports filtered lookups for the router and keeps
//! registration order so that selection ties resolve deterministically.
//!
//! # Features
//!
//! - Registration / unregistration (re-registration replaces the record)
//! - Explicit status transitions and load-driven `active` / `busy` switching
//! - Filtered snapshots in registration order
//! - Health probe bookkeeping (see [`health`])
//! - Rolling success-rate and latency metrics (see [`metrics`])

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{HubConfig, MetricsConfig, RegistryConfig};
use crate::error::{HubError, Result};
use crate::executor::{Capabilities, ExecutorDescriptor, ExecutorId, ExecutorStatus};

pub mod filter;
pub mod health;
pub mod metrics;

pub use filter::*;
pub use health::*;
pub use metrics::*;

// ============================================================================
// Registration
// ============================================================================

/// Live record wrapping one executor descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub descriptor: ExecutorDescriptor,

    pub status: ExecutorStatus,

    pub registered_at: DateTime<Utc>,

    /// Last status change, load report or health probe
    pub last_activity: DateTime<Utc>,

    /// Completed tasks, successful or not; never decreases
    pub tasks_completed: u64,

    /// Rolling success rate (0-100)
    pub success_rate: f64,

    /// Reported load (0-100)
    pub current_load: f64,

    pub capabilities: Capabilities,

    /// Minimum time between two health probes
    pub health_check_interval: Duration,

    /// Registration order, used for deterministic tie-breaking
    sequence: u64,
}

impl Registration {
    pub(crate) fn new(
        descriptor: ExecutorDescriptor,
        sequence: u64,
        health_check_interval: Duration,
        default_max_concurrent_tasks: usize,
    ) -> Self {
        let now = Utc::now();
        let capabilities = Capabilities::derive(&descriptor, default_max_concurrent_tasks);

        Self {
            descriptor,
            status: ExecutorStatus::Active,
            registered_at: now,
            last_activity: now,
            tasks_completed: 0,
            success_rate: 100.0,
            current_load: 0.0,
            capabilities,
            health_check_interval,
            sequence,
        }
    }

    pub fn id(&self) -> &ExecutorId {
        &self.descriptor.id
    }

    /// Position in registration order (lower registered first)
    pub fn registration_order(&self) -> u64 {
        self.sequence
    }

    /// In-flight ceiling for this executor
    pub fn max_concurrent_tasks(&self) -> usize {
        self.capabilities.performance.max_concurrent_tasks
    }

    /// Whether a health probe is due at `now`
    pub fn is_health_check_due(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.last_activity);
        match elapsed.to_std() {
            Ok(elapsed) => elapsed >= self.health_check_interval,
            // last_activity in the future
            Err(_) => false,
        }
    }
}

// ============================================================================
// Executor Registry
// ============================================================================

/// Registry of known executors
///
/// Shared by handle (`Arc<ExecutorRegistry>`) between the router, the
/// orchestrator, the health monitor and the discovery cache. All mutation goes
/// through one `RwLock`, so writers are serialized.
pub struct ExecutorRegistry {
    /// Registrations indexed by executor ID
    registrations: RwLock<HashMap<ExecutorId, Registration>>,

    /// Next registration sequence number
    next_sequence: AtomicU64,

    config: RegistryConfig,

    metrics_config: MetricsConfig,
}

impl ExecutorRegistry {
    /// Create a new registry
    pub fn new(config: RegistryConfig, metrics_config: MetricsConfig) -> Self {
        info!("Initializing Executor Registry");

        Self {
            registrations: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            config,
            metrics_config,
        }
    }

    /// Create from the hub configuration
    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(config.registry.clone(), config.metrics.clone())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an executor, replacing any existing record with the same id
    pub async fn register(&self, descriptor: ExecutorDescriptor) -> Registration {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let registration = Registration::new(
            descriptor,
            sequence,
            self.config.default_health_check_interval,
            self.config.default_max_concurrent_tasks,
        );
        let id = registration.id().clone();

        let replaced = self
            .registrations
            .write()
            .await
            .insert(id.clone(), registration.clone());

        if replaced.is_some() {
            info!("Executor {} re-registered (previous record replaced)", id);
        } else {
            info!(
                "Executor {} registered ({}, {} tools)",
                id,
                registration.descriptor.role,
                registration.capabilities.tools.len()
            );
        }

        registration
    }

    /// Register only if the id is unknown; returns whether a record was added
    pub async fn register_if_absent(&self, descriptor: ExecutorDescriptor) -> bool {
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&descriptor.id) {
            return false;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let registration = Registration::new(
            descriptor,
            sequence,
            self.config.default_health_check_interval,
            self.config.default_max_concurrent_tasks,
        );
        info!("Executor {} registered from discovery", registration.id());
        registrations.insert(registration.id().clone(), registration);
        true
    }

    /// Unregister an executor; returns false if it was not registered
    pub async fn unregister(&self, id: &ExecutorId) -> bool {
        let removed = self.registrations.write().await.remove(id).is_some();

        if removed {
            info!("Executor {} unregistered", id);
        } else {
            debug!("Unregister ignored, executor {} not registered", id);
        }

        removed
    }

    /// Remove every registration
    pub async fn clear(&self) {
        self.registrations.write().await.clear();
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Set the status of an executor directly
    pub async fn update_status(&self, id: &ExecutorId, status: ExecutorStatus) -> Result<()> {
        let mut registrations = self.registrations.write().await;
        let registration = registrations
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?;

        if registration.status != status {
            debug!("Executor {} status {} -> {}", id, registration.status, status);
        }
        registration.status = status;
        registration.last_activity = Utc::now();

        Ok(())
    }

    /// Record the load an executor reports and apply the `active` / `busy` transition
    ///
    /// Load is clamped to 0-100. Executors in `error`, `inactive` or
    /// `maintenance` keep their status.
    pub async fn report_load(&self, id: &ExecutorId, load: f64) -> Result<ExecutorStatus> {
        let threshold = self.config.max_load_threshold;
        let mut registrations = self.registrations.write().await;
        let registration = registrations
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?;

        registration.current_load = clamp_percentage(load);
        registration.last_activity = Utc::now();

        if matches!(registration.status, ExecutorStatus::Active | ExecutorStatus::Busy) {
            let next = if registration.current_load > threshold {
                ExecutorStatus::Busy
            } else {
                ExecutorStatus::Active
            };
            if next != registration.status {
                debug!(
                    "Executor {} load {:.1} -> {}",
                    id, registration.current_load, next
                );
                registration.status = next;
            }
        }

        Ok(registration.status)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Get a snapshot of one registration
    pub async fn get(&self, id: &ExecutorId) -> Option<Registration> {
        self.registrations.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &ExecutorId) -> bool {
        self.registrations.read().await.contains_key(id)
    }

    /// All registrations matching `filter`, in registration order
    pub async fn find(&self, filter: &ExecutorFilter) -> Vec<Registration> {
        let mut matches: Vec<Registration> = self
            .registrations
            .read()
            .await
            .values()
            .filter(|registration| filter.matches(registration))
            .cloned()
            .collect();

        matches.sort_by_key(Registration::registration_order);
        matches
    }

    /// All registrations, in registration order
    pub async fn snapshot(&self) -> Vec<Registration> {
        self.find(&ExecutorFilter::default()).await
    }

    pub async fn len(&self) -> usize {
        self.registrations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registrations.read().await.is_empty()
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Aggregate counts and averages over all registrations
    pub async fn statistics(&self) -> RegistryStatistics {
        let registrations = self.registrations.read().await;

        let mut totals_by_status = BTreeMap::new();
        let mut totals_by_role = BTreeMap::new();
        for registration in registrations.values() {
            *totals_by_status.entry(registration.status).or_insert(0) += 1;
            *totals_by_role
                .entry(registration.descriptor.role.normalized())
                .or_insert(0) += 1;
        }

        let total = registrations.len();
        let averages = if total > 0 {
            let count = total as f64;
            SystemAverages {
                average_success_rate: registrations.values().map(|r| r.success_rate).sum::<f64>() / count,
                average_load: registrations.values().map(|r| r.current_load).sum::<f64>() / count,
                average_response_time_ms: registrations
                    .values()
                    .map(|r| r.capabilities.performance.avg_response_time_ms)
                    .sum::<f64>()
                    / count,
                total_tasks_completed: registrations.values().map(|r| r.tasks_completed).sum(),
            }
        } else {
            SystemAverages::default()
        };

        RegistryStatistics {
            total_executors: total,
            totals_by_status,
            totals_by_role,
            averages,
        }
    }

    // ========================================================================
    // Internal access for health / metrics
    // ========================================================================

    pub(crate) fn metrics_config(&self) -> &MetricsConfig {
        &self.metrics_config
    }

    pub(crate) fn registrations(&self) -> &RwLock<HashMap<ExecutorId, Registration>> {
        &self.registrations
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default(), MetricsConfig::default())
    }
}

/// Clamp a percentage into 0-100, mapping NaN to 0
pub(crate) fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        warn!("Ignoring NaN percentage");
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_executors: usize,
    pub totals_by_status: BTreeMap<ExecutorStatus, usize>,

    /// Keyed by normalized role, so `BackendDev` and `backend-dev` share a bucket
    pub totals_by_role: BTreeMap<String, usize>,

    pub averages: SystemAverages,
}

impl RegistryStatistics {
    pub fn count_with_status(&self, status: ExecutorStatus) -> usize {
        self.totals_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// System-wide averages over all registrations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemAverages {
    pub average_success_rate: f64,
    pub average_load: f64,
    pub average_response_time_ms: f64,
    pub total_tasks_completed: u64,
}
