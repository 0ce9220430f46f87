//! Task requests, responses and execution metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ErrorKind, HubError};
use crate::executor::{ExecutorId, ExecutorRole};

// ============================================================================
// Task Id
// ============================================================================

/// Identifier of one delegated task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Task Request
// ============================================================================

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Output shape the caller expects back
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    #[default]
    Text,
    Markdown,
    Json,
    /// Structured output with the named sections
    Sections(Vec<String>),
}

/// Unit of work submitted for delegation
///
/// `executor_id = None` asks the hub to pick the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub executor_id: Option<ExecutorId>,

    pub task: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    #[serde(default)]
    pub required_tools: Vec<String>,

    /// Whether the executor may involve other executors
    #[serde(default)]
    pub collaboration: bool,

    #[serde(default)]
    pub output_shape: OutputShape,
}

impl TaskRequest {
    /// Request routed automatically, with a five minute timeout
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            executor_id: None,
            task: task.into(),
            priority: Priority::default(),
            timeout: Duration::from_secs(300),
            required_tools: Vec::new(),
            collaboration: false,
            output_shape: OutputShape::default(),
        }
    }

    /// Target a specific executor
    pub fn to_executor(mut self, id: impl Into<ExecutorId>) -> Self {
        self.executor_id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn required_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn collaboration(mut self, enabled: bool) -> Self {
        self.collaboration = enabled;
        self
    }

    pub fn output_shape(mut self, shape: OutputShape) -> Self {
        self.output_shape = shape;
        self
    }

    /// Reject malformed requests
    pub fn validate(&self) -> Result<(), HubError> {
        if self.task.trim().is_empty() {
            return Err(HubError::ValidationFailure(
                "task description cannot be empty".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(HubError::ValidationFailure("timeout must be > 0".to_string()));
        }

        if self.required_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(HubError::ValidationFailure(
                "required tool names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Execution Metadata
// ============================================================================

/// Structured record of one execution
///
/// Opened when delegation begins, finalized at completion or failure, and
/// never changed after the response is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub task_id: TaskId,

    pub executor_id: ExecutorId,

    /// Role at the time of delegation
    pub executor_role: ExecutorRole,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub duration_ms: u64,

    pub completed_on_time: bool,

    pub tools_used: Vec<String>,

    pub tool_invocations: u32,

    pub collaboration_used: bool,

    /// Confidence in the result (0-100)
    pub confidence: u8,
}

impl ExecutionMetadata {
    /// Initial metadata for an execution that is about to start
    pub fn open(task_id: TaskId, executor_id: ExecutorId, executor_role: ExecutorRole) -> Self {
        Self {
            task_id,
            executor_id,
            executor_role,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            completed_on_time: true,
            tools_used: Vec::new(),
            tool_invocations: 0,
            collaboration_used: false,
            confidence: 100,
        }
    }

    /// Stamp end time and duration, judging timeliness against `timeout`
    pub(crate) fn close(&mut self, timeout: Duration) {
        let finished_at = Utc::now();
        let elapsed = finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default();

        self.finished_at = Some(finished_at);
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.completed_on_time = elapsed <= timeout;
    }

    /// Mark as failed: not on time and zero confidence
    pub(crate) fn fail(&mut self, timeout: Duration) {
        self.close(timeout);
        self.completed_on_time = false;
        self.confidence = 0;
    }
}

// ============================================================================
// Task Response
// ============================================================================

/// Result of one delegation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub success: bool,

    /// Succeeded, but the executor reported internal errors
    pub partial: bool,

    pub output: Option<serde_json::Value>,

    /// Present once execution started; absent for rejected requests
    pub metadata: Option<ExecutionMetadata>,

    /// Classification of the failure, if any
    pub error_kind: Option<ErrorKind>,

    pub errors: Vec<String>,

    pub warnings: Vec<String>,
}

impl TaskResponse {
    /// Response for a request rejected before execution
    pub fn rejected(error: &HubError) -> Self {
        Self {
            success: false,
            partial: false,
            output: None,
            metadata: None,
            error_kind: Some(error.kind()),
            errors: vec![error.to_string()],
            warnings: Vec::new(),
        }
    }

    /// Response for an execution that failed after it started
    pub fn failed(metadata: ExecutionMetadata, kind: ErrorKind, errors: Vec<String>) -> Self {
        Self {
            success: false,
            partial: false,
            output: None,
            metadata: Some(metadata),
            error_kind: Some(kind),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.metadata.as_ref().map(|m| &m.task_id)
    }
}

/// Serde adapter writing a `Duration` as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
