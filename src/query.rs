//! Fact search against the knowledge graph, one-shot or interactive.

use crate::graph::{FactResult, GraphClient, GraphError, SearchQuery};
use std::fmt::Write as _;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

/// Number of facts shown when the caller does not ask for a specific amount.
pub const DEFAULT_RESULT_LIMIT: usize = 5;

const RULE: &str = "--------------------------------------------------";

/// Errors emitted while running a search.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query text was blank.
    #[error("query text must not be empty")]
    EmptyQuery,
    /// Result limit was zero.
    #[error("result limit must be at least 1")]
    InvalidLimit,
    /// Graph engine search failed.
    #[error("search failed: {0}")]
    Graph(#[from] GraphError),
    /// Interactive session could not read or write the terminal.
    #[error("terminal IO failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters supplied to [`search_facts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Natural language query text.
    pub text: String,
    /// Maximum number of facts to return.
    pub limit: usize,
    /// Optional node to rerank results around.
    pub center_node_uuid: Option<String>,
}

impl QueryRequest {
    /// Request with the default limit and no center node.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_RESULT_LIMIT,
            center_node_uuid: None,
        }
    }
}

/// Search the graph and return at most `request.limit` facts.
pub async fn search_facts(
    client: &dyn GraphClient,
    request: QueryRequest,
) -> Result<Vec<FactResult>, QueryError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(QueryError::EmptyQuery);
    }
    if request.limit == 0 {
        return Err(QueryError::InvalidLimit);
    }

    let center_node_uuid = request
        .center_node_uuid
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(center) = center_node_uuid.as_deref() {
        tracing::info!(center, "Using center node");
    }
    tracing::info!(query = text, limit = request.limit, "Querying knowledge base");

    let mut facts = client
        .search(&SearchQuery {
            text: text.to_string(),
            limit: request.limit,
            center_node_uuid,
        })
        .await?;
    facts.truncate(request.limit);
    Ok(facts)
}

/// Render facts as a numbered, human-readable listing.
pub fn format_results(results: &[FactResult]) -> String {
    let mut out = String::from("\n=== Search Results ===\n");
    if results.is_empty() {
        out.push_str("No results found.\n");
        return out;
    }

    for (idx, result) in results.iter().enumerate() {
        let _ = writeln!(out, "\nResult {}:", idx + 1);
        let _ = writeln!(out, "UUID: {}", result.uuid);
        let _ = writeln!(out, "Fact: {}", result.fact);
        let optional = [
            ("Source Node UUID", &result.source_node_uuid),
            ("Target Node UUID", &result.target_node_uuid),
            ("Valid from", &result.valid_at),
            ("Valid until", &result.invalid_at),
        ];
        for (label, value) in optional {
            if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
                let _ = writeln!(out, "{label}: {value}");
            }
        }
        out.push_str(RULE);
        out.push('\n');
    }
    out
}

/// Parse a user-supplied result limit. Blank input selects `default`.
pub fn parse_limit(input: &str, default: usize) -> Option<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(default);
    }
    trimmed.parse().ok().filter(|limit| *limit > 0)
}

/// Starting state of an [`interactive_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Limit used when the user leaves the limit prompt blank.
    pub default_limit: usize,
    /// Center node applied to the first query without asking.
    pub center_node_uuid: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_RESULT_LIMIT,
            center_node_uuid: None,
        }
    }
}

/// Run the prompt loop until the user types `exit`/`quit` or input ends.
///
/// After each search the user may pick a result whose source node becomes the center node of
/// the following query.
pub async fn interactive_session<R, W>(
    client: &dyn GraphClient,
    options: SessionOptions,
    input: &mut Lines<R>,
    output: &mut W,
) -> Result<(), QueryError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_out(
        output,
        "\n=== Knowledge Base Query Tool ===\nEnter your query below. Type 'exit' to quit.\n",
    )
    .await?;

    let default_limit = options.default_limit.max(1);
    let mut center_node_uuid = options
        .center_node_uuid
        .filter(|center| !center.trim().is_empty());
    let mut confirm_center = center_node_uuid.is_none();

    loop {
        let Some(query) = prompt(input, output, "\nEnter your query: ").await? else {
            break;
        };
        let query = query.trim().to_string();
        if matches!(query.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let limit_prompt = format!("Number of results to show (default: {default_limit}): ");
        let limit_input = prompt(input, output, &limit_prompt)
            .await?
            .unwrap_or_default();
        let limit = match parse_limit(&limit_input, default_limit) {
            Some(limit) => limit,
            None => {
                let notice = format!("Invalid number, using default limit of {default_limit}.\n");
                write_out(output, &notice).await?;
                default_limit
            }
        };

        if let Some(center) = center_node_uuid.take() {
            let keep = if confirm_center {
                prompt(
                    input,
                    output,
                    "Use previous result as center node? (y/n, default: n): ",
                )
                .await?
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("y")
            } else {
                true
            };
            if keep {
                write_out(output, &format!("Using center node: {center}\n")).await?;
                center_node_uuid = Some(center);
            }
        }
        confirm_center = true;

        let request = QueryRequest {
            text: query,
            limit,
            center_node_uuid: center_node_uuid.take(),
        };
        let results = match search_facts(client, request).await {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(%error, "Interactive search failed");
                write_out(output, &format!("Search failed: {error}\n")).await?;
                continue;
            }
        };
        write_out(output, &format_results(&results)).await?;

        if results.is_empty() {
            continue;
        }
        let choice = prompt(
            input,
            output,
            "\nSet a result as center node for next query? (Enter result number or 'n'): ",
        )
        .await?
        .unwrap_or_default();
        let picked = choice
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|number| (1..=results.len()).contains(number))
            .map(|number| &results[number - 1]);
        if let Some(result) = picked {
            match result.source_node_uuid.clone() {
                Some(node) => {
                    write_out(output, &format!("Center node set to {node}\n")).await?;
                    center_node_uuid = Some(node);
                }
                None => {
                    write_out(output, "That result has no source node; center unchanged.\n")
                        .await?;
                }
            }
        }
    }

    Ok(())
}

async fn prompt<R, W>(
    input: &mut Lines<R>,
    output: &mut W,
    message: &str,
) -> Result<Option<String>, QueryError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_out(output, message).await?;
    Ok(input.next_line().await?)
}

async fn write_out<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}
