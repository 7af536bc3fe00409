//! Configuration loading, validation, and management for Kindred.
//!
//! Loads configuration from `kindred.toml` (or `$KINDRED_CONFIG`) with
//! environment variable overrides. Validates all settings at startup so bad
//! values fail the process fast instead of surfacing per-request.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `kindred.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relational store connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Vector index connection string (kept separate from the relational
    /// store so it can scale and be rebuilt independently)
    #[serde(default = "default_vector_database_url")]
    pub vector_database_url: String,

    /// LLM endpoint configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chat pipeline tuning
    #[serde(default)]
    pub chat: ChatConfig,

    /// HTTP/WebSocket gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Session cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingest: IngestConfig,
}

fn default_database_url() -> String {
    "sqlite://kindred.db".into()
}
fn default_vector_database_url() -> String {
    "sqlite://kindred-vectors.db".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            vector_database_url: default_vector_database_url(),
            llm: LlmConfig::default(),
            chat: ChatConfig::default(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("vector_database_url", &self.vector_database_url)
            .field("llm", &self.llm)
            .field("chat", &self.chat)
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .field("cache", &self.cache)
            .field("ingest", &self.ingest)
            .finish()
    }
}

/// LLM endpoint settings — one OpenAI-compatible endpoint serves chat
/// completions (generation + classification) and embeddings.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key; usually supplied via environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for streamed reply generation
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Sampling temperature for reply generation
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,

    /// Model used for the intent classification pass
    #[serde(default = "default_chat_model")]
    pub classifier_model: String,

    /// Near-deterministic sampling for structured classification output
    #[serde(default = "default_classifier_temperature")]
    pub classifier_temperature: f32,

    /// Model used to embed both documents and queries — ingestion and
    /// retrieval must agree on this
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Max tokens per generated reply
    #[serde(default = "default_max_reply_tokens")]
    pub max_reply_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_chat_model() -> String {
    "deepseek-chat".into()
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_classifier_temperature() -> f32 {
    0.1
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_max_reply_tokens() -> u32 {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            chat_temperature: default_chat_temperature(),
            classifier_model: default_chat_model(),
            classifier_temperature: default_classifier_temperature(),
            embedding_model: default_embedding_model(),
            max_reply_tokens: default_max_reply_tokens(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("chat_temperature", &self.chat_temperature)
            .field("classifier_model", &self.classifier_model)
            .field("classifier_temperature", &self.classifier_temperature)
            .field("embedding_model", &self.embedding_model)
            .field("max_reply_tokens", &self.max_reply_tokens)
            .finish()
    }
}

/// Chat pipeline tuning knobs. These were magic constants in earlier
/// iterations; they are configuration, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Below this classifier confidence the reply seeks clarification
    /// instead of answering directly
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: f32,

    /// Rolling session-memory window, in turns
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Session-memory TTL in seconds
    #[serde(default = "default_memory_ttl_secs")]
    pub memory_ttl_secs: u64,

    /// How many knowledge snippets to retrieve per message
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// How many recent turns the classifier sees
    #[serde(default = "default_classifier_history_window")]
    pub classifier_history_window: usize,
}

fn default_confidence_gate() -> f32 {
    0.4
}
fn default_memory_window() -> usize {
    30
}
fn default_memory_ttl_secs() -> u64 {
    60 * 60 * 24 * 7
}
fn default_retrieval_top_k() -> usize {
    3
}
fn default_classifier_history_window() -> usize {
    6
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            confidence_gate: default_confidence_gate(),
            memory_window: default_memory_window(),
            memory_ttl_secs: default_memory_ttl_secs(),
            retrieval_top_k: default_retrieval_top_k(),
            classifier_history_window: default_classifier_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret; must be overridden outside development
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Access token lifetime in minutes
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,
}

fn default_token_ttl_minutes() -> u64 {
    60 * 24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL; when absent, the in-process TTL cache is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root directory for uploaded documents
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks, in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// How many chunks to embed and upsert per batch
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_upload_dir() -> String {
    "uploads".into()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_embed_batch_size() -> usize {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration: `$KINDRED_CONFIG` or `./kindred.toml`, then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KINDRED_CONFIG").unwrap_or_else(|_| "kindred.toml".into());
        let mut config = Self::load_from(Path::new(&path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("KINDRED_DATABASE_URL") {
            self.database_url = url;
        }
        self.llm.api_key = std::env::var("KINDRED_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or(self.llm.api_key.take());
        if let Ok(url) = std::env::var("KINDRED_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(secret) = std::env::var("KINDRED_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Ok(url) = std::env::var("KINDRED_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
    }

    /// Reject values that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.chat.confidence_gate) {
            return Err(ConfigError::Invalid(format!(
                "chat.confidence_gate must be within [0, 1], got {}",
                self.chat.confidence_gate
            )));
        }
        if self.chat.memory_window == 0 {
            return Err(ConfigError::Invalid(
                "chat.memory_window must be at least 1".into(),
            ));
        }
        if self.chat.retrieval_top_k == 0 {
            return Err(ConfigError::Invalid(
                "chat.retrieval_top_k must be at least 1".into(),
            ));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.embed_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "ingest.embed_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
