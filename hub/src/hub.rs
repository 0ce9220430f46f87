//! Subagent Hub facade
//!
//! Wires the registry, router, delegation orchestrator, health monitor and
//! discovery cache together behind the consumer API.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use subagent_hub::{ExecutorDescriptor, SubagentHub, TaskExecutor};
//! # async fn example(executor: Arc<dyn TaskExecutor>) -> subagent_hub::Result<()> {
//! let hub = SubagentHub::builder().executor(executor).build()?;
//! hub.start().await;
//!
//! hub.register(ExecutorDescriptor::new("E1", "backend", "BackendDev").with_tools(["git"]))
//!     .await;
//!
//! let response = hub
//!     .delegate_task(hub.request("fix database migration").required_tools(["git"]))
//!     .await;
//! assert!(response.success);
//!
//! hub.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::HubConfig;
use crate::delegation::{
    DelegationOrchestrator, ExecutionMetadata, TaskExecutor, TaskId, TaskRequest, TaskResponse,
};
use crate::discovery::{DiscoveryCache, DiscoverySource};
use crate::error::{HubError, Result};
use crate::executor::{ExecutorDescriptor, ExecutorId, ExecutorStatus};
use crate::registry::{AlwaysHealthy, ExecutorRegistry, HealthMonitor, HealthProbe, Registration, SystemAverages};
use crate::routing::CapabilityRouter;
use crate::schedule::ScheduleHandle;

/// Hub-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubStatistics {
    pub total_executors: usize,
    pub totals_by_status: BTreeMap<ExecutorStatus, usize>,
    pub totals_by_role: BTreeMap<String, usize>,
    pub system_averages: SystemAverages,
    pub in_flight_tasks: usize,
}

/// Builder for [`SubagentHub`]
#[derive(Default)]
pub struct SubagentHubBuilder {
    config: HubConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    probe: Option<Arc<dyn HealthProbe>>,
    sources: Vec<DiscoverySource>,
}

impl SubagentHubBuilder {
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Execution seam used for every delegated task (required)
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Health probe; defaults to [`AlwaysHealthy`]
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn source(mut self, source: DiscoverySource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(self) -> Result<SubagentHub> {
        self.config.validate()?;

        let executor = self
            .executor
            .ok_or_else(|| HubError::Config("no task executor configured".to_string()))?;
        let probe = self.probe.unwrap_or_else(|| Arc::new(AlwaysHealthy));

        let registry = Arc::new(ExecutorRegistry::from_config(&self.config));
        let orchestrator = DelegationOrchestrator::new(
            registry.clone(),
            executor,
            self.config.delegation.clone(),
        );
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            probe,
            self.config.health.clone(),
        ));

        let mut discovery =
            DiscoveryCache::new(self.config.discovery.clone()).with_registry(registry.clone());
        for source in self.sources {
            discovery.add_source(source);
        }

        Ok(SubagentHub {
            config: self.config,
            registry,
            orchestrator,
            health,
            discovery: Arc::new(discovery),
            schedules: Mutex::new(Vec::new()),
        })
    }
}

/// Subagent hub: registration, routing, delegation and discovery
pub struct SubagentHub {
    config: HubConfig,
    registry: Arc<ExecutorRegistry>,
    orchestrator: DelegationOrchestrator,
    health: Arc<HealthMonitor>,
    discovery: Arc<DiscoveryCache>,
    schedules: Mutex<Vec<ScheduleHandle>>,
}

impl SubagentHub {
    pub fn builder() -> SubagentHubBuilder {
        SubagentHubBuilder::default()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &CapabilityRouter {
        self.orchestrator.router()
    }

    pub fn orchestrator(&self) -> &DelegationOrchestrator {
        &self.orchestrator
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn discovery(&self) -> &Arc<DiscoveryCache> {
        &self.discovery
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the health monitor and one refresh loop per discovery source
    ///
    /// Calling `start` on a running hub does nothing.
    pub async fn start(&self) {
        let mut schedules = self.schedules.lock().await;
        if !schedules.is_empty() {
            return;
        }

        schedules.push(self.health.clone().spawn());
        schedules.extend(self.discovery.clone().spawn());

        info!("Subagent hub started with {} schedules", schedules.len());
    }

    pub async fn is_running(&self) -> bool {
        self.schedules
            .lock()
            .await
            .iter()
            .any(ScheduleHandle::is_running)
    }

    /// Stop schedules, cancel in-flight tasks and clear every table
    pub async fn shutdown(&self) {
        let schedules: Vec<ScheduleHandle> = self.schedules.lock().await.drain(..).collect();
        for schedule in schedules {
            schedule.shutdown().await;
        }

        let cancelled = self.orchestrator.cancel_all().await;
        self.registry.clear().await;
        self.discovery.clear().await;

        info!("Subagent hub shut down ({} in-flight tasks cancelled)", cancelled);
    }

    // ========================================================================
    // Consumer API
    // ========================================================================

    pub async fn register(&self, descriptor: ExecutorDescriptor) -> Registration {
        self.registry.register(descriptor).await
    }

    pub async fn unregister(&self, id: &ExecutorId) -> bool {
        self.registry.unregister(id).await
    }

    /// New request for `task` carrying the configured default timeout
    pub fn request(&self, task: impl Into<String>) -> TaskRequest {
        TaskRequest::new(task).timeout(self.config.delegation.default_timeout)
    }

    pub async fn delegate_task(&self, request: TaskRequest) -> TaskResponse {
        self.orchestrator.delegate_task(request).await
    }

    /// Id of the best available executor for a task, if any
    pub async fn find_best_executor(&self, task: &str, required_tools: &[String]) -> Option<ExecutorId> {
        self.router()
            .find_best_executor(task, required_tools)
            .await
            .map(|registration| registration.descriptor.id)
    }

    pub async fn get_task_status(&self, task_id: &TaskId) -> Option<ExecutionMetadata> {
        self.orchestrator.get_task_status(task_id).await
    }

    pub async fn cancel_task(&self, task_id: &TaskId) -> bool {
        self.orchestrator.cancel_task(task_id).await
    }

    pub async fn statistics(&self) -> HubStatistics {
        let registry = self.registry.statistics().await;

        HubStatistics {
            total_executors: registry.total_executors,
            totals_by_status: registry.totals_by_status,
            totals_by_role: registry.totals_by_role,
            system_averages: registry.averages,
            in_flight_tasks: self.orchestrator.in_flight_count().await,
        }
    }
}
