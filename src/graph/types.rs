//! Shared types used by graph clients.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors returned while interacting with the graph engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Base URI failed to parse or uses an unsupported scheme.
    #[error("Invalid graph URI: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Graph engine responded with an unexpected status code.
    #[error("Unexpected graph engine response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the engine.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Episode could not be encoded for the wire.
    #[error("Invalid episode: {0}")]
    InvalidEpisode(String),
    /// The client was used after `close`.
    #[error("Graph client is closed")]
    Closed,
}

/// Kind of content carried by an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeSource {
    /// Free-form document text.
    Text,
}

/// Unit of content handed to the graph engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    /// Human-readable episode name.
    pub name: String,
    /// Episode content.
    pub body: String,
    /// Kind of content in `body`.
    pub source: EpisodeSource,
    /// Provenance of the episode.
    pub source_description: String,
    /// Position of the episode in the engine's timeline.
    pub reference_time: OffsetDateTime,
}

/// Parameters for a fact search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Natural language query text.
    pub text: String,
    /// Maximum number of facts to return.
    pub limit: usize,
    /// Optional node used to rerank results by graph distance.
    pub center_node_uuid: Option<String>,
}

/// Ranked fact returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FactResult {
    /// Identifier of the edge carrying the fact.
    pub uuid: String,
    /// Fact text.
    pub fact: String,
    /// Node the fact starts from.
    #[serde(default)]
    pub source_node_uuid: Option<String>,
    /// Node the fact points to.
    #[serde(default)]
    pub target_node_uuid: Option<String>,
    /// Start of the fact's validity window.
    #[serde(default)]
    pub valid_at: Option<String>,
    /// End of the fact's validity window.
    #[serde(default)]
    pub invalid_at: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub(crate) facts: Vec<FactResult>,
}
