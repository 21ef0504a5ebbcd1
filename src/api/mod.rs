// src/api/mod.rs - HTTP surface for the adjudication layer
// Thin, replaceable plumbing: auth, rate limiting and schema validation
// happen here; every adjudication decision happens in the engine. Both
// GRANTED and DENIED travel as HTTP 200 - only structural failures
// (bad body, bad tier, bad key) become 4xx.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, EmbeddingProviderKind};
use crate::context::{ContextFetcher, NoContext, SerperContext};
use crate::critics::CriticPool;
use crate::embedding::{Embedder, HashedEmbedder, OllamaEmbedder};
use crate::engine::{Clock, SystemClock, Verifier, VerifierConfig};
use crate::error::CetiError;
use crate::ledger::SemanticLedger;
use crate::metrics::AdjudicationMetrics;
use crate::oracle::{HttpOracle, Oracle};
use crate::schema::RiskTier;

// ==================== RATE LIMITING ====================

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter keyed by caller identity.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: per_minute as f64,
            refill_per_sec: per_minute as f64 / 60.0,
        }
    }

    /// Take one token for this identity if available.
    pub fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// ==================== APP STATE ====================

/// Shared application state handed to every handler.
pub struct AppState {
    pub verifier: Arc<Verifier>,
    master_key: String,
    rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(verifier: Arc<Verifier>, master_key: String, rate_limit_per_minute: u32) -> Self {
        Self {
            verifier,
            master_key,
            rate_limiter: RateLimiter::new(rate_limit_per_minute),
        }
    }
}

/// Composition root: wire providers, ledger, critics and the engine from
/// configuration. Fails before the listener binds; request-path failures
/// never reach this error type.
pub fn build_state(config: &Config) -> Result<AppState, CetiError> {
    let oracle: Arc<dyn Oracle> = Arc::new(HttpOracle::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        config.oracle_timeout,
    )?);

    let embedder: Arc<dyn Embedder> = match config.embedding_provider {
        EmbeddingProviderKind::Hashed => Arc::new(HashedEmbedder::new()),
        EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbedder::new(
            config.embedding_api_base.clone(),
            config.embedding_model.clone(),
            config.context_timeout,
        )?),
    };

    let ledger = Arc::new(SemanticLedger::open(
        &config.ledger_path,
        embedder,
        config.similarity_threshold,
        config.ledger_ttl_secs,
    )?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    ledger.purge_expired(clock.now_unix())?;

    let context: Arc<dyn ContextFetcher> = match &config.web_search_api_key {
        Some(key) => Arc::new(SerperContext::new(key.clone(), config.context_timeout)),
        None => Arc::new(NoContext),
    };

    let verifier = Verifier::new(
        oracle,
        ledger,
        context,
        CriticPool::new(),
        clock,
        AdjudicationMetrics::new(),
        VerifierConfig::from_config(config),
    );

    Ok(AppState::new(
        Arc::new(verifier),
        config.master_key.clone(),
        config.rate_limit_per_minute,
    ))
}

// ==================== HANDLERS ====================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerifyRequest {
    query: String,

    #[serde(default)]
    risk_tier: Option<RiskTier>,
}

/// GET / - status document with the invariant attestation.
async fn root_status() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "operational",
        "invariants_enforced": true,
        "version": crate::VERSION,
        "message": "CETI adjudication layer - grants scoped authorization, never asserts truth.",
    }))
}

/// GET /health - liveness probe with adjudication counters.
async fn health(state: Option<web::Data<AppState>>) -> impl Responder {
    let mut body = serde_json::json!({
        "status": "ok",
        "service": "ceti-core",
        "version": crate::VERSION,
    });

    if let Some(state) = state {
        let stats = state.verifier.metrics().snapshot();
        body["stats"] = serde_json::json!({
            "uptime_secs": stats.uptime_secs,
            "requests_total": stats.requests_total,
            "granted_total": stats.granted_total,
            "denied_total": stats.denied_total,
            "ledger_hits": stats.ledger_hits,
            "oracle_errors": stats.oracle_errors,
        });
    }

    HttpResponse::Ok().json(body)
}

fn extract_api_key(req: &HttpRequest) -> Option<String> {
    if let Some(value) = req.headers().get("X-API-Key") {
        return value.to_str().ok().map(str::to_string);
    }

    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// POST /verify - the adjudication endpoint.
async fn verify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<VerifyRequest>,
) -> impl Responder {
    let api_key = match extract_api_key(&req) {
        Some(key) if key == state.master_key => key,
        Some(_) | None => {
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "Invalid API key"}));
        }
    };

    if !state.rate_limiter.allow(&api_key) {
        debug!("rate limit exhausted for identity");
        return HttpResponse::TooManyRequests()
            .json(serde_json::json!({"error": "Rate limit exceeded"}));
    }

    if body.query.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "Missing 'query' in request body"}));
    }

    let tier = body.risk_tier.unwrap_or(RiskTier::Medium);
    let response = state.verifier.verify(&body.query, tier).await;
    HttpResponse::Ok().json(response)
}

/// Route table, shared by the binary and the test harness.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root_status))
        .route("/health", web::get().to(health))
        .route("/verify", web::post().to(verify));
}
