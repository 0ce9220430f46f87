//! Executor Descriptors and Capabilities
//!
//! An executor ("subagent") is an external worker known to the hub only by
//! its declared identity, role, tools and performance hints. Its actual work
//! is a black box reached through [`TaskExecutor`](crate::delegation::TaskExecutor).

pub mod types;
pub mod capabilities;

pub use types::*;
pub use capabilities::*;
