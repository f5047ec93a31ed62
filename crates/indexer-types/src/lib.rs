//! Shared types for the AgentMesh task indexer.
//!
//! Holds the persisted task and accept records, the lifecycle transition
//! rules applied to them, the in-process event bus and the request and
//! response shapes exchanged over HTTP.

pub mod api;
pub mod chain;
pub mod events;
pub mod lifecycle;
pub mod task;
pub mod validation;

pub use api::*;
pub use chain::*;
pub use events::*;
pub use lifecycle::*;
pub use task::*;
pub use validation::*;
