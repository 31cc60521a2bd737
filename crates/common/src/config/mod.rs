//! Configuration management for RagForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values
//!
//! The defaults describe a fully local deployment: mock embedder,
//! in-memory vector index and in-memory event relay.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (event relay backend)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Hybrid search defaults
    #[serde(default)]
    pub search: SearchSettings,

    /// Event relay configuration
    #[serde(default)]
    pub events: EventsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL; when absent the in-memory document store is used
    pub url: Option<String>,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; index-time and query-time vectors must agree
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum inputs per upstream request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorIndexConfig {
    /// Vector index provider: pinecone, memory
    #[serde(default = "default_vector_provider")]
    pub provider: String,

    /// Index host URL (e.g. https://my-index-abc123.svc.us-east-1.pinecone.io)
    pub host: Option<String>,

    /// API key for the index service
    pub api_key: Option<String>,

    /// Index namespace
    #[serde(default)]
    pub namespace: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,

    /// Vectors per upsert request
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingSettings {
    /// Maximum tokens per chunk
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Tokens shared between consecutive chunks
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    #[serde(default = "default_top_k")]
    pub vector_top_k: usize,

    #[serde(default = "default_top_k")]
    pub text_top_k: usize,

    #[serde(default)]
    pub min_score: f64,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    #[serde(default = "default_text_weight")]
    pub text_weight: f64,

    /// RRF smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Chunks rendered into a prompt context block
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Event relay backend: redis, memory
    #[serde(default = "default_events_backend")]
    pub backend: String,

    /// Poll cadence for stream consumers in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// SSE heartbeat interval in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Retention of a session log in seconds (0 keeps logs forever)
    #[serde(default = "default_events_ttl")]
    pub ttl_secs: u64,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_embedding_provider() -> String { "mock".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 100 }
fn default_vector_provider() -> String { "memory".to_string() }
fn default_index_timeout() -> u64 { 15 }
fn default_upsert_batch_size() -> usize { 100 }
fn default_max_tokens() -> usize { 1000 }
fn default_overlap_tokens() -> usize { 200 }
fn default_top_k() -> usize { 20 }
fn default_vector_weight() -> f64 { 0.7 }
fn default_text_weight() -> f64 { 0.3 }
fn default_rrf_k() -> f64 { 60.0 }
fn default_max_chunks() -> usize { 5 }
fn default_max_query_chars() -> usize { 500 }
fn default_events_backend() -> String { "memory".to_string() }
fn default_poll_interval() -> u64 { 100 }
fn default_heartbeat() -> u64 { 30 }
fn default_events_ttl() -> u64 { 86_400 }
fn default_key_prefix() -> String { "ragforge".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "ragforge".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SEARCH__RRF_K=60
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl ObservabilityConfig {
    /// Prometheus listener address, `None` when `metrics_port` is 0
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port != 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }
}

impl EventsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_index: VectorIndexConfig::default(),
            chunking: ChunkingSettings::default(),
            search: SearchSettings::default(),
            events: EventsConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: default_redis_url() }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            host: None,
            api_key: None,
            namespace: String::new(),
            timeout_secs: default_index_timeout(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            vector_top_k: default_top_k(),
            text_top_k: default_top_k(),
            min_score: 0.0,
            vector_weight: default_vector_weight(),
            text_weight: default_text_weight(),
            rrf_k: default_rrf_k(),
            max_chunks: default_max_chunks(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            backend: default_events_backend(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_secs: default_heartbeat(),
            ttl_secs: default_events_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.chunking.max_tokens, 1000);
        assert_eq!(config.chunking.overlap_tokens, 200);
        assert_eq!(config.search.rrf_k, 60.0);
        assert_eq!(config.events.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_durations() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 5;
        config.events.heartbeat_secs = 15;
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.events.heartbeat(), Duration::from_secs(15));
    }

    #[test]
    fn test_metrics_port_zero_disables_exporter() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.observability.metrics_addr().map(|a| a.port()),
            Some(9090)
        );
        config.observability.metrics_port = 0;
        assert_eq!(config.observability.metrics_addr(), None);
    }

    #[test]
    fn test_partial_sections_deserialize() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "search": { "vector_weight": 0.5 },
            "events": { "backend": "redis" }
        }))
        .unwrap();

        assert_eq!(config.search.vector_weight, 0.5);
        assert_eq!(config.search.text_weight, 0.3);
        assert_eq!(config.events.backend, "redis");
        assert_eq!(config.events.heartbeat_secs, 30);
    }
}
