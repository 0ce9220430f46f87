//! Task Delegation
//!
//! Request/response types, the black-box execution seam, and the
//! orchestrator that runs one delegation attempt per request. Callers that
//! want retries wrap `delegate_task` themselves.

pub mod request;
pub mod executor;
pub mod orchestrator;

pub use request::*;
pub use executor::*;
pub use orchestrator::*;
