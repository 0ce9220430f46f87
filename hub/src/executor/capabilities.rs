//! Executor Capabilities
//!
//! Derives the capability set of a registration from its descriptor: declared
//! tools and specializations, the task categories its role covers, and a
//! performance snapshot that the metrics recorder keeps current.

use serde::{Deserialize, Serialize};

use super::{ExecutorDescriptor, ExecutorRole};

/// Task categories per normalized role name
const ROLE_TASK_CATEGORIES: &[(&str, &[&str])] = &[
    ("backenddev", &["api-development", "database", "server-logic", "integration"]),
    ("frontenddev", &["ui-development", "styling", "accessibility", "client-state"]),
    ("fullstackdev", &["api-development", "ui-development", "database", "integration"]),
    ("devops", &["deployment", "infrastructure", "ci-cd", "monitoring"]),
    ("qaengineer", &["testing", "test-automation", "quality-assurance"]),
    ("tester", &["testing", "test-automation", "quality-assurance"]),
    ("securityauditor", &["security-review", "vulnerability-analysis", "compliance"]),
    ("architect", &["system-design", "architecture-review", "technical-planning"]),
    ("reviewer", &["code-review", "quality-assurance"]),
    ("documenter", &["documentation", "technical-writing"]),
    ("researcher", &["research", "analysis", "information-retrieval"]),
    ("dataengineer", &["data-pipelines", "database", "analytics"]),
    ("optimizer", &["performance-optimization", "profiling", "cost-optimization"]),
];

/// Category assigned to roles missing from the lookup table
pub const GENERAL_CATEGORY: &str = "general";

/// Task categories covered by `role`
pub fn task_categories_for_role(role: &ExecutorRole) -> Vec<String> {
    let normalized = role.normalized();

    ROLE_TASK_CATEGORIES
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, categories)| categories.iter().map(|c| c.to_string()).collect())
        .unwrap_or_else(|| vec![GENERAL_CATEGORY.to_string()])
}

/// Performance snapshot kept on each registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Smoothed response time in milliseconds
    pub avg_response_time_ms: f64,

    /// In-flight ceiling for this executor
    pub max_concurrent_tasks: usize,
}

/// Derived capability set of a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Specialization keywords matched against task descriptions
    pub specializations: Vec<String>,

    /// Task categories from the role lookup table
    pub task_categories: Vec<String>,

    /// Declared tools
    pub tools: Vec<String>,

    /// Declared integration points
    pub integration_points: Vec<String>,

    pub performance: PerformanceSnapshot,
}

impl Capabilities {
    /// Derive capabilities from a descriptor
    ///
    /// The role tag itself counts as a specialization. Duplicates are dropped,
    /// keeping declaration order.
    pub fn derive(descriptor: &ExecutorDescriptor, default_max_concurrent_tasks: usize) -> Self {
        let mut specializations = Vec::with_capacity(descriptor.specializations.len() + 1);
        for keyword in std::iter::once(descriptor.role.as_str())
            .chain(descriptor.specializations.iter().map(String::as_str))
        {
            let keyword = keyword.trim();
            if !keyword.is_empty() && !specializations.iter().any(|s: &String| s.eq_ignore_ascii_case(keyword)) {
                specializations.push(keyword.to_string());
            }
        }

        let mut tools: Vec<String> = Vec::with_capacity(descriptor.tools.len());
        for tool in &descriptor.tools {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }

        Self {
            specializations,
            task_categories: task_categories_for_role(&descriptor.role),
            tools,
            integration_points: descriptor.integration_points.clone(),
            performance: PerformanceSnapshot {
                avg_response_time_ms: descriptor.performance.expected_latency_ms.unwrap_or(0) as f64,
                max_concurrent_tasks: descriptor
                    .performance
                    .max_concurrent_tasks
                    .filter(|max| *max > 0)
                    .unwrap_or(default_max_concurrent_tasks),
            },
        }
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }

    /// Required tools this capability set does not declare, in request order
    pub fn missing_tools(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|tool| !self.has_tool(tool))
            .cloned()
            .collect()
    }

    /// Whether any specialization matches one of `wanted` (case-insensitive)
    pub fn has_any_specialization(&self, wanted: &[String]) -> bool {
        wanted.iter().any(|w| {
            self.specializations
                .iter()
                .any(|s| s.eq_ignore_ascii_case(w))
        })
    }

    /// Number of specializations appearing in the lowercased task text
    pub fn specialization_hits(&self, task: &str) -> usize {
        let task = task.to_lowercase();
        self.specializations
            .iter()
            .filter(|s| task.contains(&s.to_lowercase()))
            .count()
    }
}
