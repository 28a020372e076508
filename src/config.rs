use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Paragraph-aggregation threshold used when `KBINGEST_CHUNK_SIZE` is not set.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Cache directory used when `KBINGEST_CACHE_DIR` is not set.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice in the same process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Connection parameters for the knowledge-graph engine.
#[derive(Clone, Deserialize)]
pub struct GraphConfig {
    /// Base URI of the graph engine.
    pub uri: String,
    /// Username presented to the graph engine.
    pub user: String,
    /// Password presented to the graph engine.
    pub password: String,
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration for the ingestion and query tools.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Graph engine connection parameters.
    pub graph: GraphConfig,
    /// Directory holding one cache file per ingested document.
    pub cache_dir: PathBuf,
    /// Soft size threshold, in characters, for paragraph aggregation.
    pub chunk_size: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            graph: GraphConfig {
                uri: load_env("GRAPH_URI")?,
                user: load_env("GRAPH_USER")?,
                password: load_env("GRAPH_PASSWORD")?,
            },
            cache_dir: load_env_optional("KBINGEST_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            chunk_size: load_env_optional("KBINGEST_CHUNK_SIZE")
                .map(|value| parse_chunk_size(&value))
                .transpose()?
                .unwrap_or(DEFAULT_CHUNK_SIZE),
        })
    }

    /// Apply command-line overrides on top of the environment-derived values.
    pub fn with_overrides(mut self, cache_dir: Option<PathBuf>, chunk_size: Option<usize>) -> Self {
        if let Some(dir) = cache_dir {
            self.cache_dir = dir;
        }
        if let Some(size) = chunk_size {
            self.chunk_size = size;
        }
        self
    }
}

fn parse_chunk_size(value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(ConfigError::InvalidValue("KBINGEST_CHUNK_SIZE".to_string())),
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// `.env` files are honored. Fails before any document or network work when a required
/// connection parameter is missing.
pub fn init_config(
    cache_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
) -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?.with_overrides(cache_dir, chunk_size);
    tracing::debug!(
        graph_uri = %config.graph.uri,
        graph_user = %config.graph.user,
        cache_dir = %config.cache_dir.display(),
        chunk_size = config.chunk_size,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_must_be_positive() {
        assert_eq!(parse_chunk_size("1500").unwrap(), 1500);
        assert_eq!(parse_chunk_size(" 42 ").unwrap(), 42);
        assert!(matches!(
            parse_chunk_size("0"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_chunk_size("big"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn overrides_replace_environment_values() {
        let config = Config {
            graph: GraphConfig {
                uri: "http://localhost:8000".into(),
                user: "neo4j".into(),
                password: "secret".into(),
            },
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
        .with_overrides(Some(PathBuf::from("/tmp/kb")), Some(250));

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.chunk_size, 250);
    }

    #[test]
    fn debug_output_redacts_password() {
        let graph = GraphConfig {
            uri: "http://localhost:8000".into(),
            user: "neo4j".into(),
            password: "secret".into(),
        };
        let rendered = format!("{graph:?}");
        assert!(rendered.contains("neo4j"));
        assert!(!rendered.contains("secret"));
    }
}
