//! Execution seam between the hub and executors
//!
//! How an executor performs a task is opaque to the hub. The orchestrator
//! only calls [`TaskExecutor::execute`] and interprets the returned
//! [`ExecutionOutcome`]; transport is the implementor's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::executor::ExecutorDescriptor;

use super::TaskRequest;

/// What an executor reports back for one task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,

    pub output: serde_json::Value,

    #[serde(default)]
    pub tools_used: Vec<String>,

    #[serde(default)]
    pub tool_invocations: u32,

    #[serde(default)]
    pub collaboration_used: bool,

    /// Confidence in the result (0-100, clamped by the orchestrator)
    pub confidence: u8,

    /// Internal errors; with `success` this makes the response partial
    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ExecutionOutcome {
    /// Successful outcome with full confidence
    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            confidence: 100,
            ..Self::default()
        }
    }

    /// Reported (not thrown) failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools_used = tools.into_iter().map(Into::into).collect();
        if self.tool_invocations == 0 {
            self.tool_invocations = u32::try_from(self.tools_used.len()).unwrap_or(u32::MAX);
        }
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Black-box execution call
///
/// Implementations should watch `cancel` and stop early when it fires; the
/// hub stops tracking a cancelled or timed-out task regardless.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        descriptor: &ExecutorDescriptor,
        request: &TaskRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_builders() {
        let outcome = ExecutionOutcome::succeeded(serde_json::json!({"ok": true}))
            .with_tools(["git", "cargo"])
            .with_confidence(80);

        assert!(outcome.success);
        assert_eq!(outcome.tool_invocations, 2);
        assert_eq!(outcome.confidence, 80);

        let failed = ExecutionOutcome::failed("lint errors");
        assert!(!failed.success);
        assert_eq!(failed.errors, vec!["lint errors"]);
    }
}
