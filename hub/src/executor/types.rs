//! Core Executor Types and Data Structures

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    /// Create a new unique executor ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from string (for manifests/testing)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role / specialization tag of an executor (e.g. "BackendDev")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorRole(String);

impl ExecutorRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased alphanumeric form used for table lookups ("Backend-Dev" -> "backenddev")
    pub fn normalized(&self) -> String {
        self.0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }
}

impl fmt::Display for ExecutorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ExecutorRole {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current status of a registered executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStatus {
    /// Available for work
    Active,

    /// Reachable but above the load threshold
    Busy,

    /// Failed its last health check
    Error,

    /// Explicitly deactivated
    Inactive,

    /// Explicitly taken out for maintenance
    Maintenance,
}

impl ExecutorStatus {
    /// Whether the health monitor is allowed to probe and transition this status
    pub fn is_probed(&self) -> bool {
        matches!(self, Self::Active | Self::Busy | Self::Error)
    }
}

impl Default for ExecutorStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Inactive => "inactive",
            Self::Maintenance => "maintenance",
        };
        f.pad(name)
    }
}

/// Declared performance characteristics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceHints {
    /// Expected response time in milliseconds
    pub expected_latency_ms: Option<u64>,

    /// Maximum number of tasks this executor runs at once
    pub max_concurrent_tasks: Option<usize>,
}

/// Immutable identity and capability declaration of one executor
///
/// Never mutated after registration; re-registering the same id replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    pub id: ExecutorId,

    pub name: String,

    pub role: ExecutorRole,

    /// Declared specialization keywords
    #[serde(default)]
    pub specializations: Vec<String>,

    /// Declared tools
    #[serde(default)]
    pub tools: Vec<String>,

    /// External systems this executor integrates with
    #[serde(default)]
    pub integration_points: Vec<String>,

    #[serde(default)]
    pub performance: PerformanceHints,
}

impl ExecutorDescriptor {
    /// Create a descriptor with no tools or specializations
    pub fn new(id: impl Into<ExecutorId>, name: impl Into<String>, role: impl Into<ExecutorRole>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            specializations: Vec::new(),
            tools: Vec::new(),
            integration_points: Vec::new(),
            performance: PerformanceHints::default(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_specializations<I, S>(mut self, specializations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specializations = specializations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_integration_points<I, S>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.integration_points = points.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.performance.max_concurrent_tasks = Some(max);
        self
    }

    pub fn with_expected_latency_ms(mut self, latency_ms: u64) -> Self {
        self.performance.expected_latency_ms = Some(latency_ms);
        self
    }

    /// Whether the executor declares `tool`
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}
