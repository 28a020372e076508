//! HTTP client wrapper for a graph engine service.
//!
//! Endpoints, relative to the configured URI, all `POST` with HTTP basic auth:
//! `indices`, `clear`, `episodes`, and `search`.

use crate::config::GraphConfig;
use crate::graph::GraphClient;
use crate::graph::types::{Episode, FactResult, GraphError, SearchQuery, SearchResponse};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use time::format_description::well_known::Rfc3339;

/// Lightweight HTTP client for graph engine operations.
pub struct HttpGraphClient {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    closed: AtomicBool,
}

impl HttpGraphClient {
    /// Construct a new client from connection parameters.
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let client = Client::builder()
            .user_agent(concat!("kbingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = normalize_base_url(&config.uri).map_err(GraphError::InvalidUrl)?;
        tracing::debug!(url = %base_url, user = %config.user, "Initialized graph HTTP client");

        Ok(Self {
            client,
            base_url,
            user: config.user.clone(),
            password: config.password.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, GraphError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphError::Closed);
        }
        let url = format_endpoint(&self.base_url, path);
        Ok(self
            .client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password)))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, GraphError> {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = GraphError::UnexpectedStatus { status, body };
            tracing::error!(endpoint = path, error = %error, "Graph engine request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn initialize_schema(&self) -> Result<(), GraphError> {
        self.post("indices", &json!({})).await?;
        tracing::debug!("Graph indices and constraints ensured");
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), GraphError> {
        self.post("clear", &json!({})).await?;
        tracing::info!("Graph data cleared");
        Ok(())
    }

    async fn add_episode(&self, episode: &Episode) -> Result<(), GraphError> {
        let reference_time = episode
            .reference_time
            .format(&Rfc3339)
            .map_err(|err| GraphError::InvalidEpisode(format!("reference time: {err}")))?;
        let body = json!({
            "name": episode.name,
            "episode_body": episode.body,
            "source": episode.source,
            "source_description": episode.source_description,
            "reference_time": reference_time,
        });
        self.post("episodes", &body).await?;
        tracing::debug!(name = %episode.name, %reference_time, "Episode stored");
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FactResult>, GraphError> {
        let mut body = Map::new();
        body.insert("query".into(), Value::String(query.text.clone()));
        body.insert("num_results".into(), Value::from(query.limit));
        if let Some(center) = query
            .center_node_uuid
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            body.insert("center_node_uuid".into(), Value::String(center.to_string()));
        }

        let response = self.post("search", &Value::Object(body)).await?;
        let SearchResponse { facts } = response.json().await?;
        Ok(facts)
    }

    async fn close(&self) -> Result<(), GraphError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Connection closed");
        }
        Ok(())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url.trim()).map_err(|err| err.to_string())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!(
            "unsupported scheme '{}' (expected http or https)",
            parsed.scheme()
        ));
    }
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EpisodeSource;
    use httpmock::{Method::POST, MockServer};
    use time::macros::datetime;

    fn client_for(server: &MockServer) -> HttpGraphClient {
        HttpGraphClient::new(&GraphConfig {
            uri: server.base_url(),
            user: "neo4j".into(),
            password: "secret".into(),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn add_episode_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/episodes")
                    .header("authorization", "Basic bmVvNGo6c2VjcmV0")
                    .json_body(json!({
                        "name": "Chunk 4",
                        "episode_body": "Dorothy lived in Kansas.",
                        "source": "text",
                        "source_description": "Ingested from woo.txt",
                        "reference_time": "2025-01-01T00:00:30Z",
                    }));
                then.status(202).json_body(json!({ "status": "queued" }));
            })
            .await;

        let episode = Episode {
            name: "Chunk 4".into(),
            body: "Dorothy lived in Kansas.".into(),
            source: EpisodeSource::Text,
            source_description: "Ingested from woo.txt".into(),
            reference_time: datetime!(2025-01-01 00:00:30 UTC),
        };
        client_for(&server)
            .add_episode(&episode)
            .await
            .expect("episode accepted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_parses_facts_and_forwards_center_node() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/search").json_body(json!({
                    "query": "Who is Toto?",
                    "num_results": 3,
                    "center_node_uuid": "node-1",
                }));
                then.status(200).json_body(json!({
                    "facts": [
                        {
                            "uuid": "edge-1",
                            "fact": "Toto is Dorothy's dog",
                            "source_node_uuid": "node-2",
                            "target_node_uuid": "node-1",
                            "valid_at": "2025-01-01T00:00:00Z"
                        },
                        { "uuid": "edge-2", "fact": "Toto lives in Kansas" }
                    ]
                }));
            })
            .await;

        let facts = client_for(&server)
            .search(&SearchQuery {
                text: "Who is Toto?".into(),
                limit: 3,
                center_node_uuid: Some("node-1".into()),
            })
            .await
            .expect("search");

        mock.assert_async().await;
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].source_node_uuid.as_deref(), Some("node-2"));
        assert_eq!(facts[0].valid_at.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(facts[1].fact, "Toto lives in Kansas");
        assert!(facts[1].invalid_at.is_none());
    }

    #[tokio::test]
    async fn error_status_surfaces_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indices");
                then.status(503).body("database offline");
            })
            .await;

        let error = client_for(&server).initialize_schema().await.unwrap_err();
        match error {
            GraphError::UnexpectedStatus { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "database offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn closed_client_rejects_requests() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(matches!(
            client.clear_all().await.unwrap_err(),
            GraphError::Closed
        ));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let error = HttpGraphClient::new(&GraphConfig {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "secret".into(),
        })
        .err()
        .expect("bolt is rejected");
        assert!(matches!(error, GraphError::InvalidUrl(_)));
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        assert_eq!(
            format_endpoint("http://graph:8000/api/", "/episodes"),
            "http://graph:8000/api/episodes"
        );
        assert_eq!(
            normalize_base_url("http://graph:8000/api/").unwrap(),
            "http://graph:8000/api"
        );
    }
}
