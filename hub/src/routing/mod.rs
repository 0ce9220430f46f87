//! Task routing to the best available executor

pub mod router;

pub use router::*;
