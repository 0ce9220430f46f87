//! Rolling metrics recorder
//!
//! Success rate and average response time are exponentially smoothed:
//! `next = current * (1 - w) + sample * w`. Memory is bounded and each update
//! is O(1); recent completions weigh more than old ones.

use tracing::debug;

use crate::error::{HubError, Result};
use crate::executor::ExecutorId;

use super::{clamp_percentage, ExecutorRegistry};

/// One smoothing step with weight `w` for the newest sample
pub fn smooth(current: f64, sample: f64, w: f64) -> f64 {
    current * (1.0 - w) + sample * w
}

impl ExecutorRegistry {
    /// Record one task completion for an executor
    ///
    /// Increments `tasks_completed` and folds the outcome into the rolling
    /// success rate and average response time.
    pub async fn record_completion(
        &self,
        id: &ExecutorId,
        success: bool,
        response_time_ms: u64,
    ) -> Result<()> {
        let w = self.metrics_config().smoothing_factor;
        let mut registrations = self.registrations().write().await;
        let registration = registrations
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?;

        registration.tasks_completed = registration.tasks_completed.saturating_add(1);

        let sample = if success { 100.0 } else { 0.0 };
        registration.success_rate = clamp_percentage(smooth(registration.success_rate, sample, w));

        let performance = &mut registration.capabilities.performance;
        performance.avg_response_time_ms = if registration.tasks_completed == 1
            && performance.avg_response_time_ms == 0.0
        {
            // no declared latency to smooth from
            response_time_ms as f64
        } else {
            smooth(performance.avg_response_time_ms, response_time_ms as f64, w)
        };

        debug!(
            "Executor {} completion recorded (success: {}, rate: {:.2}, avg: {:.1}ms)",
            id, success, registration.success_rate, performance.avg_response_time_ms
        );

        Ok(())
    }

    /// Seed rolling metrics, e.g. from statistics exported by a previous run
    pub async fn seed_metrics(
        &self,
        id: &ExecutorId,
        success_rate: f64,
        tasks_completed: u64,
    ) -> Result<()> {
        let mut registrations = self.registrations().write().await;
        let registration = registrations
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?;

        registration.success_rate = clamp_percentage(success_rate);
        registration.tasks_completed = registration.tasks_completed.max(tasks_completed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorDescriptor;
    use proptest::prelude::*;

    async fn registry_with(id: &str) -> (ExecutorRegistry, ExecutorId) {
        let registry = ExecutorRegistry::default();
        registry
            .register(ExecutorDescriptor::new(id, "worker", "BackendDev"))
            .await;
        (registry, ExecutorId::from_string(id))
    }

    #[test]
    fn test_smooth() {
        assert_eq!(smooth(100.0, 0.0, 0.1), 90.0);
        assert!((smooth(90.0, 100.0, 0.1) - 91.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_then_recovery() {
        let (registry, id) = registry_with("E1").await;

        registry.record_completion(&id, false, 200).await.unwrap();
        let registration = registry.get(&id).await.unwrap();
        assert!((registration.success_rate - 90.0).abs() < 1e-9);
        assert_eq!(registration.tasks_completed, 1);
        assert_eq!(registration.capabilities.performance.avg_response_time_ms, 200.0);

        registry.record_completion(&id, true, 100).await.unwrap();
        let registration = registry.get(&id).await.unwrap();
        assert!((registration.success_rate - 91.0).abs() < 1e-9);
        assert!((registration.capabilities.performance.avg_response_time_ms - 190.0).abs() < 1e-9);
        assert_eq!(registration.tasks_completed, 2);
    }

    #[tokio::test]
    async fn test_successes_converge_without_overshoot() {
        let (registry, id) = registry_with("E1").await;
        registry.seed_metrics(&id, 20.0, 0).await.unwrap();

        let mut previous = 20.0;
        for _ in 0..200 {
            registry.record_completion(&id, true, 50).await.unwrap();
            let rate = registry.get(&id).await.unwrap().success_rate;
            assert!(rate >= previous);
            assert!(rate <= 100.0);
            previous = rate;
        }
        assert!(previous > 99.9);
    }

    #[tokio::test]
    async fn test_unknown_executor() {
        let registry = ExecutorRegistry::default();
        let result = registry
            .record_completion(&ExecutorId::from_string("ghost"), true, 10)
            .await;
        assert!(matches!(result, Err(HubError::NotFound(_))));
    }

    proptest! {
        #[test]
        fn prop_rates_stay_in_bounds(outcomes in proptest::collection::vec((any::<bool>(), 0u64..100_000), 0..64)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let (registry, id) = registry_with("E1").await;
                let mut completed = 0;
                for (success, latency) in outcomes {
                    registry.record_completion(&id, success, latency).await.unwrap();
                    let registration = registry.get(&id).await.unwrap();
                    prop_assert!((0.0..=100.0).contains(&registration.success_rate));
                    prop_assert!((0.0..=100.0).contains(&registration.current_load));
                    prop_assert!(registration.tasks_completed > completed);
                    completed = registration.tasks_completed;
                }
                Ok(())
            })?;
        }
    }
}
