//! Knowledge-graph engine integration.
//!
//! The engine builds the graph, extracts entities, and answers searches; this crate only feeds
//! it episodes and asks it for facts through [`GraphClient`].

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::HttpGraphClient;
pub use types::{Episode, EpisodeSource, FactResult, GraphError, SearchQuery};

/// Operations consumed from the knowledge-graph engine.
///
/// Every call is awaited to completion by the caller before the next one starts.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Build indices and constraints. Idempotent.
    async fn initialize_schema(&self) -> Result<(), GraphError>;

    /// Delete all graph data.
    async fn clear_all(&self) -> Result<(), GraphError>;

    /// Persist one episode.
    async fn add_episode(&self, episode: &Episode) -> Result<(), GraphError>;

    /// Return facts ranked against the query.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<FactResult>, GraphError>;

    /// Release the connection. Called on every exit path of a run.
    async fn close(&self) -> Result<(), GraphError>;
}
