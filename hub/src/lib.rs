//! Subagent Hub - registration, routing and delegation for specialized executors
//!
//! The hub keeps a registry of executors ("subagents") with their capabilities
//! and live metrics, routes tasks to the best available one, runs delegated
//! tasks through a black-box execution seam with timeout and cancellation, and
//! caches discovered inventories per source.
//!
//! # Architecture
//!
//! - `executor` - Executor descriptors and derived capabilities
//! - `registry` - Registration table, filtered lookups, health checks, rolling metrics
//! - `routing` - Capability-based executor selection
//! - `delegation` - Task requests, the execution seam and the orchestrator
//! - `discovery` - Inventory providers and the TTL discovery cache
//! - `schedule` - Cancellable periodic background tasks
//! - `hub` - The [`SubagentHub`] facade tying everything together

pub mod config;
pub mod error;
pub mod schedule;

pub mod executor;
pub mod registry;
pub mod routing;
pub mod delegation;
pub mod discovery;

pub mod hub;

pub use config::HubConfig;
pub use error::{ErrorKind, HubError, Result};

pub use executor::{Capabilities, ExecutorDescriptor, ExecutorId, ExecutorRole, ExecutorStatus};
pub use registry::{
    AlwaysHealthy, ExecutorFilter, ExecutorRegistry, HealthMonitor, HealthProbe, Registration,
    RegistryStatistics,
};
pub use routing::CapabilityRouter;
pub use delegation::{
    DelegationOrchestrator, ExecutionMetadata, ExecutionOutcome, TaskExecutor, TaskId, TaskRequest,
    TaskResponse,
};
pub use discovery::{DiscoveredItem, DiscoveryCache, DiscoverySource, InventoryProvider, SourceKind};
pub use hub::{HubStatistics, SubagentHub, SubagentHubBuilder};

/// Subagent Hub version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
