#![deny(missing_docs)]

//! Incremental ingestion of text documents into a temporal knowledge graph.

/// Environment-driven configuration management.
pub mod config;
/// Knowledge-graph engine client abstraction and HTTP adapter.
pub mod graph;
/// Structured logging and tracing setup.
pub mod logging;
/// Document chunking, content cache, and ingestion orchestration.
pub mod processing;
/// Progress events emitted by ingestion runs.
pub mod progress;
/// Fact search and the interactive query session.
pub mod query;
