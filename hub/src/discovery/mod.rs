//! Capability Discovery
//!
//! Inventories of executors, skills and commands gathered from pluggable
//! providers and cached per source with a TTL.

pub mod source;
pub mod cache;

pub use source::*;
pub use cache::*;
