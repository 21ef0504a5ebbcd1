// src/config.rs - Central configuration & hard invariants
// Every limit that the adjudication pipeline refuses to bend at runtime
// is enforced here, once, before the listener binds.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

// ==================== HARD INVARIANTS ====================

/// Queries longer than this are refused by the input guard.
pub const MAX_QUERY_LENGTH: usize = 2000;

/// The adversarial loop must be allowed at least this many rounds.
pub const MIN_ADVERSARIAL_ROUNDS: u32 = 3;

/// The judge quorum must contain at least this many independent models.
pub const MIN_QUORUM_SIZE: usize = 3;

/// Critic rotation must cover at least this many logical slots.
pub const DRIFT_VARIANTS_COUNT: u64 = 8;

/// Floor for the fraction of the accept decision contributed by the
/// non-LLM layer (ledger hits and the deterministic guard).
pub const MIN_MECHANICAL_WEIGHT: f64 = 0.4;

/// Refusal diagnostics are clipped to this many characters before they
/// leave the process.
pub const MAX_DIAGNOSTIC_CHARS: usize = 300;

/// Default cosine-similarity floor for a ledger hit.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.92;

/// Default certification lifetime: 30 days.
pub const DEFAULT_LEDGER_TTL_SECS: u64 = 2_592_000;

// ==================== CONFIGURATION ====================

/// Which embedding provider backs the semantic ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// Deterministic in-process feature hashing. Never fails, needs no
    /// sidecar, collides exactly on duplicate queries.
    Hashed,

    /// Local Ollama embedding endpoint for true semantic vectors.
    Ollama,
}

/// Process configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model that produces and defends answers.
    pub generator_model: String,

    /// Model that attacks answers under rotating hostile personas.
    pub critic_model: String,

    /// Independent judge models polled in parallel for the quorum vote.
    pub judge_models: Vec<String>,

    /// Upper bound on critic/defense rounds per request.
    pub max_rounds: u32,

    /// Cosine-similarity floor for a ledger hit (hit iff
    /// `distance <= 1 - similarity_threshold`).
    pub similarity_threshold: f32,

    /// On-disk location of the certification ledger.
    pub ledger_path: PathBuf,

    /// Lifetime of a stored certification in seconds.
    pub ledger_ttl_secs: u64,

    /// Base URL of the OpenAI-compatible chat-completions provider.
    pub llm_api_base: String,

    /// Provider API key. Opaque to the engine.
    pub llm_api_key: String,

    /// Serper search key. Absent key disables web context entirely.
    pub web_search_api_key: Option<String>,

    /// Embedding provider selection.
    pub embedding_provider: EmbeddingProviderKind,

    /// Embedding model name (Ollama provider only).
    pub embedding_model: String,

    /// Embedding endpoint base URL (Ollama provider only).
    pub embedding_api_base: String,

    /// Master API key required on /verify.
    pub master_key: String,

    /// Listen address for the HTTP surface.
    pub bind_addr: String,

    /// Fraction of the accept decision owned by the mechanical layer.
    pub mechanical_weight: f64,

    /// Per-call oracle timeout.
    pub oracle_timeout: Duration,

    /// Web-context fetch timeout.
    pub context_timeout: Duration,

    /// Token-bucket capacity per identity per minute on /verify.
    pub rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator_model: "llama-3.3-70b-versatile".to_string(),
            critic_model: "llama-3.1-8b-instant".to_string(),
            judge_models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "mixtral-8x22b-2404".to_string(),
                "gemma2-27b-it".to_string(),
            ],
            max_rounds: 5,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ledger_path: PathBuf::from("./ceti_ledger"),
            ledger_ttl_secs: DEFAULT_LEDGER_TTL_SECS,
            llm_api_base: "https://api.groq.com/openai/v1".to_string(),
            llm_api_key: String::new(),
            web_search_api_key: None,
            embedding_provider: EmbeddingProviderKind::Hashed,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_api_base: "http://127.0.0.1:11434".to_string(),
            master_key: "default-master-key".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            mechanical_weight: 0.5,
            oracle_timeout: Duration::from_secs(30),
            context_timeout: Duration::from_secs(10),
            rate_limit_per_minute: 10,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Malformed numeric values are a hard error: a process that silently
    /// substitutes a default for a typo'd `MAX_ROUNDS` would run with
    /// invariants the operator never chose.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(v) = std::env::var("GENERATOR_MODEL") {
            config.generator_model = v;
        }
        if let Ok(v) = std::env::var("CRITIC_MODEL") {
            config.critic_model = v;
        }
        if let Ok(v) = std::env::var("JUDGE_MODELS") {
            config.judge_models = v
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("MAX_ROUNDS") {
            config.max_rounds = v
                .parse()
                .map_err(|_| ConfigError::Parse("MAX_ROUNDS".into(), v))?;
        }
        if let Ok(v) = std::env::var("SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v
                .parse()
                .map_err(|_| ConfigError::Parse("SIMILARITY_THRESHOLD".into(), v))?;
        }
        if let Ok(v) = std::env::var("LEDGER_PATH") {
            config.ledger_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LEDGER_TTL_SECS") {
            config.ledger_ttl_secs = v
                .parse()
                .map_err(|_| ConfigError::Parse("LEDGER_TTL_SECS".into(), v))?;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE") {
            config.llm_api_base = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            config.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("WEB_SEARCH_API_KEY") {
            if !v.is_empty() {
                config.web_search_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding_provider = match v.to_ascii_lowercase().as_str() {
                "hashed" => EmbeddingProviderKind::Hashed,
                "ollama" => EmbeddingProviderKind::Ollama,
                _ => return Err(ConfigError::Parse("EMBEDDING_PROVIDER".into(), v)),
            };
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_API_BASE") {
            config.embedding_api_base = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("CETI_MASTER_KEY") {
            config.master_key = v;
        }
        if let Ok(v) = std::env::var("CETI_BIND") {
            config.bind_addr = v;
        }

        Ok(config)
    }

    /// Validate every hard invariant. Called once at startup; any failure
    /// aborts the process before it accepts traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds < MIN_ADVERSARIAL_ROUNDS {
            return Err(ConfigError::InvariantViolation(format!(
                "MAX_ROUNDS must be >= {} (got {})",
                MIN_ADVERSARIAL_ROUNDS, self.max_rounds
            )));
        }

        if self.judge_models.len() < MIN_QUORUM_SIZE {
            return Err(ConfigError::InvariantViolation(format!(
                "At least {} judge models required (got {})",
                MIN_QUORUM_SIZE,
                self.judge_models.len()
            )));
        }

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold < 1.0) {
            return Err(ConfigError::InvariantViolation(format!(
                "SIMILARITY_THRESHOLD must be in (0, 1) (got {})",
                self.similarity_threshold
            )));
        }

        if self.mechanical_weight < MIN_MECHANICAL_WEIGHT || self.mechanical_weight > 1.0 {
            return Err(ConfigError::InvariantViolation(format!(
                "Mechanical orthogonality weight must be in [{}, 1.0] (got {})",
                MIN_MECHANICAL_WEIGHT, self.mechanical_weight
            )));
        }

        if DRIFT_VARIANTS_COUNT < 8 {
            return Err(ConfigError::InvariantViolation(
                "Critic drift must rotate across at least 8 logical slots".into(),
            ));
        }

        if self.ledger_ttl_secs == 0 {
            return Err(ConfigError::InvariantViolation(
                "LEDGER_TTL_SECS must be nonzero".into(),
            ));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::InvariantViolation(
                "Rate limit must allow at least one request per minute".into(),
            ));
        }

        Ok(())
    }

    /// Fail-fast invariant enforcement with an operator-visible trace.
    pub fn enforce_invariants(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.master_key == "default-master-key" {
            warn!("CETI_MASTER_KEY is unset - /verify is protected by the default key");
        }
        if self.llm_api_key.is_empty() {
            warn!("LLM_API_KEY is unset - oracle calls will be rejected by the provider");
        }

        info!(
            max_rounds = self.max_rounds,
            judges = self.judge_models.len(),
            similarity_threshold = self.similarity_threshold,
            mechanical_weight = self.mechanical_weight,
            "CETI invariants enforced successfully"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid value for {0}: {1:?}")]
    Parse(String, String),
}
