//! Health Monitor
//!
//! Periodically probes executors whose last activity is older than their
//! health check interval. A healthy probe sets `busy` when the reported load
//! is above the threshold and `active` otherwise; an unhealthy probe (including
//! a probe error or timeout) sets `error`. Registrations are never removed by
//! a failed probe, and `last_activity` is stamped after every probe so failing
//! executors are re-probed at a steady cadence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::error::{HubError, Result};
use crate::executor::{ExecutorDescriptor, ExecutorId, ExecutorStatus};
use crate::schedule::{spawn_periodic, ScheduleHandle};

use super::ExecutorRegistry;

/// Liveness check for one executor
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(true)` when the executor is healthy
    async fn probe(&self, descriptor: &ExecutorDescriptor) -> anyhow::Result<bool>;
}

/// Probe that reports every executor healthy
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn probe(&self, _descriptor: &ExecutorDescriptor) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Outcome of one health tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: Vec<ExecutorId>,
    pub unhealthy: Vec<ExecutorId>,
}

impl HealthReport {
    pub fn probed(&self) -> usize {
        self.healthy.len() + self.unhealthy.len()
    }
}

impl ExecutorRegistry {
    /// Registrations eligible for a probe at `now`
    pub async fn due_for_health_check(&self, now: DateTime<Utc>) -> Vec<ExecutorDescriptor> {
        let mut due: Vec<_> = self
            .registrations()
            .read()
            .await
            .values()
            .filter(|r| r.status.is_probed() && r.is_health_check_due(now))
            .map(|r| (r.registration_order(), r.descriptor.clone()))
            .collect();

        due.sort_by_key(|(order, _)| *order);
        due.into_iter().map(|(_, descriptor)| descriptor).collect()
    }

    /// Apply a probe outcome and stamp `last_activity`
    ///
    /// Registrations moved to `inactive` or `maintenance` while the probe ran
    /// keep their status.
    pub async fn apply_probe_result(
        &self,
        id: &ExecutorId,
        healthy: bool,
        probed_at: DateTime<Utc>,
    ) -> Result<ExecutorStatus> {
        let threshold = self.config().max_load_threshold;
        let mut registrations = self.registrations().write().await;
        let registration = registrations
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?;

        registration.last_activity = probed_at;

        if registration.status.is_probed() {
            let next = match (healthy, registration.current_load > threshold) {
                (false, _) => ExecutorStatus::Error,
                (true, true) => ExecutorStatus::Busy,
                (true, false) => ExecutorStatus::Active,
            };

            if next != registration.status {
                if next == ExecutorStatus::Error {
                    warn!("Executor {} failed health check", id);
                } else if registration.status == ExecutorStatus::Error {
                    info!("Executor {} recovered ({})", id, next);
                }
                registration.status = next;
            }
        }

        Ok(registration.status)
    }
}

/// Periodic health checker for the registration table
pub struct HealthMonitor {
    registry: Arc<ExecutorRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ExecutorRegistry>, probe: Arc<dyn HealthProbe>, config: HealthConfig) -> Self {
        Self {
            registry,
            probe,
            config,
        }
    }

    /// Run one health tick now
    pub async fn run_once(&self) -> HealthReport {
        self.run_once_at(Utc::now()).await
    }

    /// Run one health tick as if the clock read `now`
    ///
    /// Due executors are probed concurrently; results are applied one by one.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> HealthReport {
        let due = self.registry.due_for_health_check(now).await;
        if due.is_empty() {
            return HealthReport::default();
        }

        debug!("Running health check on {} executors", due.len());

        let outcomes = join_all(due.iter().map(|descriptor| self.probe_one(descriptor))).await;

        let mut report = HealthReport::default();
        for (descriptor, healthy) in due.into_iter().zip(outcomes) {
            match self.registry.apply_probe_result(&descriptor.id, healthy, now).await {
                Ok(_) if healthy => report.healthy.push(descriptor.id),
                Ok(_) => report.unhealthy.push(descriptor.id),
                // unregistered while the probe ran
                Err(_) => debug!("Executor {} vanished during health check", descriptor.id),
            }
        }

        report
    }

    /// Probe in its own task so a panicking probe only fails its executor
    async fn probe_one(&self, descriptor: &ExecutorDescriptor) -> bool {
        let probe = self.probe.clone();
        let target = descriptor.clone();
        let mut handle = tokio::spawn(async move { probe.probe(&target).await });

        match tokio::time::timeout(self.config.probe_timeout, &mut handle).await {
            Ok(Ok(Ok(healthy))) => healthy,
            Ok(Ok(Err(e))) => {
                warn!("Health probe for {} failed: {}", descriptor.id, e);
                false
            }
            Ok(Err(e)) => {
                warn!("Health probe for {} panicked: {}", descriptor.id, e);
                false
            }
            Err(_) => {
                handle.abort();
                warn!(
                    "Health probe for {} timed out after {:?}",
                    descriptor.id, self.config.probe_timeout
                );
                false
            }
        }
    }

    /// Start the periodic loop
    pub fn spawn(self: Arc<Self>) -> ScheduleHandle {
        let tick = self.config.tick_interval;
        info!("Starting health monitor (tick {:?})", tick);

        spawn_periodic("health-monitor", tick, false, move || {
            let monitor = self.clone();
            async move {
                let report = monitor.run_once().await;
                if report.probed() > 0 {
                    debug!(
                        "Health tick: {} healthy, {} unhealthy",
                        report.healthy.len(),
                        report.unhealthy.len()
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, RegistryConfig};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Probe with a configurable set of failing executors
    #[derive(Default)]
    struct ScriptedProbe {
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        fn heal(&self, id: &str) {
            self.failing.lock().unwrap().remove(id);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, descriptor: &ExecutorDescriptor) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push(descriptor.id.to_string());
            if descriptor.id.as_str() == "broken" {
                anyhow::bail!("connection refused");
            }
            Ok(!self.failing.lock().unwrap().contains(descriptor.id.as_str()))
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self, _descriptor: &ExecutorDescriptor) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    struct PanickingCheck;

    #[async_trait]
    impl HealthProbe for PanickingCheck {
        async fn probe(&self, descriptor: &ExecutorDescriptor) -> anyhow::Result<bool> {
            if descriptor.id.as_str() == "E1" {
                panic!("health endpoint returned garbage");
            }
            Ok(true)
        }
    }

    async fn setup(ids: &[&str]) -> (Arc<ExecutorRegistry>, Arc<ScriptedProbe>, HealthMonitor) {
        let registry = Arc::new(ExecutorRegistry::default());
        for id in ids {
            registry
                .register(ExecutorDescriptor::new(*id, "worker", "BackendDev"))
                .await;
        }
        let probe = Arc::new(ScriptedProbe::default());
        let monitor = HealthMonitor::new(registry.clone(), probe.clone(), HealthConfig::default());
        (registry, probe, monitor)
    }

    fn later(seconds: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(seconds)
    }

    #[tokio::test]
    async fn test_fresh_registrations_are_not_probed() {
        let (_registry, probe, monitor) = setup(&["E1"]).await;

        let report = monitor.run_once_at(Utc::now()).await;

        assert_eq!(report.probed(), 0);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_quarantines_and_recovery_restores() {
        let (registry, probe, monitor) = setup(&["E1", "E2"]).await;
        let e1 = ExecutorId::from_string("E1");
        probe.fail("E1");

        let now = later(31);
        let report = monitor.run_once_at(now).await;
        assert_eq!(report.unhealthy, vec![e1.clone()]);
        assert_eq!(report.healthy, vec![ExecutorId::from_string("E2")]);

        let registration = registry.get(&e1).await.unwrap();
        assert_eq!(registration.status, ExecutorStatus::Error);
        assert_eq!(registration.last_activity, now);

        // not due again until another interval has passed
        assert_eq!(monitor.run_once_at(later(40)).await.probed(), 0);

        probe.heal("E1");
        monitor.run_once_at(later(62)).await;
        assert_eq!(registry.get(&e1).await.unwrap().status, ExecutorStatus::Active);
    }

    #[tokio::test]
    async fn test_healthy_probe_with_high_load_sets_busy() {
        let (registry, _probe, monitor) = setup(&["E1"]).await;
        let id = ExecutorId::from_string("E1");
        registry.report_load(&id, 90.0).await.unwrap();
        registry.update_status(&id, ExecutorStatus::Error).await.unwrap();

        monitor.run_once_at(later(31)).await;

        assert_eq!(registry.get(&id).await.unwrap().status, ExecutorStatus::Busy);
    }

    #[tokio::test]
    async fn test_probe_error_counts_as_unhealthy() {
        let (registry, _probe, monitor) = setup(&["broken"]).await;

        let report = monitor.run_once_at(later(31)).await;

        assert_eq!(report.unhealthy.len(), 1);
        let registration = registry.get(&ExecutorId::from_string("broken")).await.unwrap();
        assert_eq!(registration.status, ExecutorStatus::Error);
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_unhealthy() {
        let registry = Arc::new(ExecutorRegistry::default());
        registry
            .register(ExecutorDescriptor::new("slow", "worker", "BackendDev"))
            .await;
        let config = HealthConfig {
            probe_timeout: Duration::from_millis(20),
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(registry.clone(), Arc::new(HangingProbe), config);

        let report = monitor.run_once_at(later(31)).await;

        assert_eq!(report.unhealthy, vec![ExecutorId::from_string("slow")]);
    }

    #[tokio::test]
    async fn test_explicit_states_are_not_probed() {
        let (registry, probe, monitor) = setup(&["E1", "E2"]).await;
        registry
            .update_status(&ExecutorId::from_string("E1"), ExecutorStatus::Maintenance)
            .await
            .unwrap();
        registry
            .update_status(&ExecutorId::from_string("E2"), ExecutorStatus::Inactive)
            .await
            .unwrap();

        let report = monitor.run_once_at(later(31)).await;

        assert_eq!(report.probed(), 0);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_monitor_stops_on_shutdown() {
        let (_registry, _probe, monitor) = setup(&["E1"]).await;
        let handle = Arc::new(monitor).spawn();

        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_check_marks_only_that_executor() {
        let registry = Arc::new(ExecutorRegistry::default());
        for id in ["E1", "E2"] {
            registry
                .register(ExecutorDescriptor::new(id, "worker", "BackendDev"))
                .await;
        }
        let monitor = HealthMonitor::new(registry.clone(), Arc::new(PanickingCheck), HealthConfig::default());

        let report = monitor.run_once_at(later(31)).await;

        assert_eq!(report.unhealthy, vec![ExecutorId::from_string("E1")]);
        assert_eq!(report.healthy, vec![ExecutorId::from_string("E2")]);
        let e1 = registry.get(&ExecutorId::from_string("E1")).await.unwrap();
        assert_eq!(e1.status, ExecutorStatus::Error);
    }

    #[tokio::test]
    async fn test_spawned_monitor_survives_panicking_check() {
        let registry_config = RegistryConfig {
            default_health_check_interval: Duration::from_millis(1),
            ..RegistryConfig::default()
        };
        let registry = Arc::new(ExecutorRegistry::new(registry_config, MetricsConfig::default()));
        registry
            .register(ExecutorDescriptor::new("E1", "worker", "BackendDev"))
            .await;
        let config = HealthConfig {
            tick_interval: Duration::from_millis(10),
            ..HealthConfig::default()
        };
        let handle = Arc::new(HealthMonitor::new(registry.clone(), Arc::new(PanickingCheck), config)).spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.is_running());
        let e1 = registry.get(&ExecutorId::from_string("E1")).await.unwrap();
        assert_eq!(e1.status, ExecutorStatus::Error);
        handle.shutdown().await;
    }
}
