//! HTTP surface of the AgentMesh indexer.

pub mod apis;
pub mod server;
