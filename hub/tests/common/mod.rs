//! Common test utilities for Subagent Hub tests
//!
//! Hand-written executors and probes implementing the hub's seam traits,
//! plus helpers for building hubs and descriptors.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use subagent_hub::*;

/// Build a hub around `executor` with default configuration
pub fn hub_with(executor: Arc<dyn TaskExecutor>) -> SubagentHub {
    SubagentHub::builder()
        .executor(executor)
        .build()
        .expect("default hub configuration is valid")
}

pub fn descriptor(id: &str, role: &str, tools: &[&str]) -> ExecutorDescriptor {
    ExecutorDescriptor::new(id, format!("{} executor", id), role).with_tools(tools.iter().copied())
}

pub fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Succeeds, echoing the task and reporting the required tools as used
#[derive(Default)]
pub struct EchoExecutor {
    calls: AtomicUsize,
}

impl EchoExecutor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(
        &self,
        descriptor: &ExecutorDescriptor,
        request: &TaskRequest,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionOutcome::succeeded(serde_json::json!({
            "executor": descriptor.id.to_string(),
            "task": request.task,
        }))
        .with_tools(request.required_tools.clone()))
    }
}

/// Blocks until its cancellation token fires
#[derive(Default)]
pub struct BlockingExecutor {
    pub started: Notify,
}

#[async_trait]
impl TaskExecutor for BlockingExecutor {
    async fn execute(
        &self,
        _descriptor: &ExecutorDescriptor,
        _request: &TaskRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome> {
        self.started.notify_one();
        cancel.cancelled().await;
        anyhow::bail!("stopped by cancellation")
    }
}

/// Sleeps for a fixed delay, then succeeds
pub struct SlowExecutor {
    pub delay: Duration,
}

#[async_trait]
impl TaskExecutor for SlowExecutor {
    async fn execute(
        &self,
        _descriptor: &ExecutorDescriptor,
        _request: &TaskRequest,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecutionOutcome::succeeded(serde_json::json!("late")))
    }
}

pub struct PanickingExecutor;

#[async_trait]
impl TaskExecutor for PanickingExecutor {
    async fn execute(
        &self,
        _descriptor: &ExecutorDescriptor,
        _request: &TaskRequest,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome> {
        panic!("executor crashed");
    }
}

/// Succeeds but reports internal errors
pub struct PartialExecutor;

#[async_trait]
impl TaskExecutor for PartialExecutor {
    async fn execute(
        &self,
        _descriptor: &ExecutorDescriptor,
        _request: &TaskRequest,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome> {
        let mut outcome = ExecutionOutcome::succeeded(serde_json::json!({"sections": 2})).with_confidence(60);
        outcome.errors.push("one section could not be generated".to_string());
        Ok(outcome)
    }
}

/// Reports the listed executors unhealthy, everything else healthy
pub struct ScriptedProbe {
    unhealthy: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn unhealthy(ids: &[&str]) -> Self {
        Self {
            unhealthy: ids.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, descriptor: &ExecutorDescriptor) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.unhealthy.contains(descriptor.id.as_str()))
    }
}
