//! Delegation Orchestrator
//!
//! Validates a task request, resolves its executor (explicit target or
//! router pick), tracks the execution in the in-flight map, and turns every
//! outcome into a [`TaskResponse`]. Nothing raised by an executor escapes:
//! errors, panics, timeouts and cancellations all become failed responses.
//!
//! Per task: `submitted -> validating -> (rejected | executing) ->
//! (completed | failed | cancelled)`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DelegationConfig;
use crate::error::{ErrorKind, HubError, Result};
use crate::executor::{ExecutorId, ExecutorStatus};
use crate::registry::{ExecutorRegistry, Registration};
use crate::routing::CapabilityRouter;

use super::{ExecutionMetadata, ExecutionOutcome, TaskExecutor, TaskId, TaskRequest, TaskResponse};

/// Execution currently tracked by the orchestrator
#[derive(Debug, Clone)]
pub struct InFlightTask {
    pub metadata: ExecutionMetadata,
    cancel: CancellationToken,
}

type InFlightMap = Arc<RwLock<HashMap<TaskId, InFlightTask>>>;

/// Releases an in-flight slot when the delegating future is dropped mid-run
///
/// Cancels the token, aborts the spawned execution and removes the entry.
/// Disarmed once `run` has removed the entry itself.
struct InFlightGuard {
    in_flight: InFlightMap,
    task_id: TaskId,
    cancel: CancellationToken,
    abort: Option<AbortHandle>,
    armed: bool,
}

impl InFlightGuard {
    fn new(in_flight: InFlightMap, task_id: TaskId, cancel: CancellationToken) -> Self {
        Self {
            in_flight,
            task_id,
            cancel,
            abort: None,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.cancel.cancel();
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        warn!("Delegation of task {} abandoned by its caller", self.task_id);

        if let Ok(mut in_flight) = self.in_flight.try_write() {
            in_flight.remove(&self.task_id);
            return;
        }

        // lock is busy; finish the removal on the runtime
        let in_flight = self.in_flight.clone();
        let task_id = self.task_id.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                in_flight.write().await.remove(&task_id);
            });
        }
    }
}

/// How the execution race ended
enum Completion {
    Joined(std::result::Result<anyhow::Result<ExecutionOutcome>, JoinError>),
    TimedOut,
    Cancelled,
}

/// Validates, routes and runs delegated tasks
pub struct DelegationOrchestrator {
    registry: Arc<ExecutorRegistry>,
    router: CapabilityRouter,
    executor: Arc<dyn TaskExecutor>,
    in_flight: InFlightMap,
    config: DelegationConfig,
}

impl DelegationOrchestrator {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        executor: Arc<dyn TaskExecutor>,
        config: DelegationConfig,
    ) -> Self {
        Self {
            router: CapabilityRouter::new(registry.clone()),
            registry,
            executor,
            in_flight: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn router(&self) -> &CapabilityRouter {
        &self.router
    }

    // ========================================================================
    // Delegation
    // ========================================================================

    /// Run one delegation attempt; never fails, never panics
    pub async fn delegate_task(&self, request: TaskRequest) -> TaskResponse {
        if let Err(e) = request.validate() {
            warn!("Rejected malformed task request: {}", e);
            return TaskResponse::rejected(&e);
        }

        let (registration, metadata, cancel) = match self.admit(&request).await {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!("Task rejected: {}", e);
                return TaskResponse::rejected(&e);
            }
        };

        let guard = InFlightGuard::new(self.in_flight.clone(), metadata.task_id.clone(), cancel.clone());

        info!(
            "Delegating task {} to executor {}",
            metadata.task_id, metadata.executor_id
        );

        self.run(registration, metadata, cancel, request, guard).await
    }

    /// Resolve and validate the executor, then open an in-flight entry
    async fn admit(
        &self,
        request: &TaskRequest,
    ) -> Result<(Registration, ExecutionMetadata, CancellationToken)> {
        let registration = match &request.executor_id {
            Some(id) => self
                .registry
                .get(id)
                .await
                .ok_or_else(|| HubError::NotFound(format!("executor {}", id)))?,
            None => {
                let saturated = self.saturated_executors().await;
                self.router
                    .find_best_executor_where(&request.task, &request.required_tools, |r| {
                        !saturated.contains(r.id())
                    })
                    .await
                    .ok_or_else(|| {
                        HubError::Unavailable("no executor available for this task".to_string())
                    })?
            }
        };

        let id = registration.id().clone();
        let mut in_flight = self.in_flight.write().await;

        if registration.status != ExecutorStatus::Active {
            return Err(HubError::Unavailable(format!(
                "executor {} is {}",
                id, registration.status
            )));
        }

        let running = count_for(&in_flight, &id);
        if running >= registration.max_concurrent_tasks() {
            return Err(HubError::Unavailable(format!(
                "executor {} is at capacity ({} in flight)",
                id, running
            )));
        }

        let missing = registration.capabilities.missing_tools(&request.required_tools);
        if !missing.is_empty() {
            return Err(HubError::MissingTools {
                executor_id: id.to_string(),
                missing,
            });
        }

        let metadata = ExecutionMetadata::open(
            TaskId::new(),
            id,
            registration.descriptor.role.clone(),
        );
        let cancel = CancellationToken::new();
        in_flight.insert(
            metadata.task_id.clone(),
            InFlightTask {
                metadata: metadata.clone(),
                cancel: cancel.clone(),
            },
        );

        Ok((registration, metadata, cancel))
    }

    /// Execute and finalize an admitted task
    async fn run(
        &self,
        registration: Registration,
        mut metadata: ExecutionMetadata,
        cancel: CancellationToken,
        request: TaskRequest,
        mut guard: InFlightGuard,
    ) -> TaskResponse {
        let timeout = request.timeout;
        let executor = self.executor.clone();
        let descriptor = registration.descriptor;
        let token = cancel.clone();
        let call_request = request.clone();

        // spawned so that a panicking executor surfaces as a JoinError;
        // a cancelled task reports as cancelled even if the executor returned
        let mut handle =
            tokio::spawn(async move { executor.execute(&descriptor, &call_request, token).await });
        guard.abort = Some(handle.abort_handle());

        let completion = if self.config.enforce_timeouts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Completion::Cancelled,
                joined = &mut handle => Completion::Joined(joined),
                _ = tokio::time::sleep(timeout) => Completion::TimedOut,
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Completion::Cancelled,
                joined = &mut handle => Completion::Joined(joined),
            }
        };

        if !matches!(completion, Completion::Joined(_)) {
            cancel.cancel();
            handle.abort();
        }

        self.in_flight.write().await.remove(&metadata.task_id);
        guard.disarm();

        let executor_id = metadata.executor_id.clone();
        let response = match completion {
            Completion::Joined(Ok(Ok(outcome))) => finalize(metadata, outcome, timeout),
            Completion::Joined(Ok(Err(e))) => {
                metadata.fail(timeout);
                TaskResponse::failed(metadata, ErrorKind::ExecutionFailure, vec![e.to_string()])
            }
            Completion::Joined(Err(e)) => {
                let message = if e.is_panic() {
                    "executor panicked during execution".to_string()
                } else {
                    format!("executor task aborted: {}", e)
                };
                metadata.fail(timeout);
                TaskResponse::failed(metadata, ErrorKind::ExecutionFailure, vec![message])
            }
            Completion::TimedOut => {
                metadata.fail(timeout);
                let message = format!("task timed out after {}ms", timeout.as_millis());
                TaskResponse::failed(metadata, ErrorKind::ExecutionFailure, vec![message])
            }
            Completion::Cancelled => {
                metadata.fail(timeout);
                info!("Task {} cancelled", metadata.task_id);
                return TaskResponse::failed(
                    metadata,
                    ErrorKind::ExecutionFailure,
                    vec!["task cancelled".to_string()],
                );
            }
        };

        let duration_ms = response.metadata.as_ref().map_or(0, |m| m.duration_ms);
        if let Err(e) = self
            .registry
            .record_completion(&executor_id, response.success, duration_ms)
            .await
        {
            // unregistered while the task ran
            debug!("Completion for {} not recorded: {}", executor_id, e);
        }

        if response.success {
            info!("Task on {} completed in {}ms", executor_id, duration_ms);
        } else {
            warn!("Task on {} failed: {}", executor_id, response.errors.join("; "));
        }

        response
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Metadata of an in-flight task
    pub async fn get_task_status(&self, task_id: &TaskId) -> Option<ExecutionMetadata> {
        self.in_flight
            .read()
            .await
            .get(task_id)
            .map(|task| task.metadata.clone())
    }

    /// Stop tracking a task and signal its executor; false if not in flight
    pub async fn cancel_task(&self, task_id: &TaskId) -> bool {
        match self.in_flight.write().await.remove(task_id) {
            Some(task) => {
                task.cancel.cancel();
                info!("Cancelled task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight task; returns how many were cancelled
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<InFlightTask> = self.in_flight.write().await.drain().map(|(_, t)| t).collect();
        for task in &drained {
            task.cancel.cancel();
        }
        drained.len()
    }

    pub async fn in_flight_tasks(&self) -> Vec<ExecutionMetadata> {
        let mut tasks: Vec<ExecutionMetadata> = self
            .in_flight
            .read()
            .await
            .values()
            .map(|t| t.metadata.clone())
            .collect();
        tasks.sort_by_key(|m| m.started_at);
        tasks
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }

    /// Whether `id` is active and below its in-flight ceiling
    pub async fn is_available(&self, id: &ExecutorId) -> bool {
        let Some(registration) = self.registry.get(id).await else {
            return false;
        };

        registration.status == ExecutorStatus::Active
            && count_for(&*self.in_flight.read().await, id) < registration.max_concurrent_tasks()
    }

    /// Executors at their in-flight ceiling
    async fn saturated_executors(&self) -> HashSet<ExecutorId> {
        let counts: HashMap<ExecutorId, usize> = {
            let in_flight = self.in_flight.read().await;
            let mut counts = HashMap::new();
            for task in in_flight.values() {
                *counts.entry(task.metadata.executor_id.clone()).or_insert(0) += 1;
            }
            counts
        };

        let mut saturated = HashSet::new();
        for (id, running) in counts {
            if let Some(registration) = self.registry.get(&id).await {
                if running >= registration.max_concurrent_tasks() {
                    saturated.insert(id);
                }
            }
        }
        saturated
    }
}

fn count_for(in_flight: &HashMap<TaskId, InFlightTask>, id: &ExecutorId) -> usize {
    in_flight
        .values()
        .filter(|task| &task.metadata.executor_id == id)
        .count()
}

/// Build the response for an executor that returned normally
fn finalize(
    mut metadata: ExecutionMetadata,
    outcome: ExecutionOutcome,
    timeout: std::time::Duration,
) -> TaskResponse {
    metadata.close(timeout);
    metadata.tools_used = outcome.tools_used;
    metadata.tool_invocations = outcome.tool_invocations;
    metadata.collaboration_used = outcome.collaboration_used;
    metadata.confidence = outcome.confidence.min(100);

    if outcome.success {
        TaskResponse {
            success: true,
            partial: !outcome.errors.is_empty(),
            output: Some(outcome.output),
            metadata: Some(metadata),
            error_kind: None,
            errors: outcome.errors,
            warnings: outcome.warnings,
        }
    } else {
        let errors = if outcome.errors.is_empty() {
            vec!["executor reported failure".to_string()]
        } else {
            outcome.errors
        };
        TaskResponse {
            success: false,
            partial: false,
            output: Some(outcome.output),
            metadata: Some(metadata),
            error_kind: Some(ErrorKind::ExecutionFailure),
            errors,
            warnings: outcome.warnings,
        }
    }
}
