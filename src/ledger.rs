// src/ledger.rs - Persistent semantic certification ledger
// Sled-backed store of prior GRANTED verdicts, keyed by certification id
// and searched by embedding similarity. The ledger is the pipeline's
// mechanical short-circuit: a sufficiently similar, unexpired,
// tier-compatible certification answers the request with zero oracle
// calls.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::{cosine_distance, Embedder, EmbeddingError};
use crate::schema::{AuthorizationScope, RiskTier};

/// One certified verdict at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Primary key: 64 lowercase hex chars.
    pub certification_id: String,

    /// Query embedding under the ledger's provider; secondary index.
    pub embedding: Vec<f32>,

    /// Tier the certification was issued at. Lookups at a higher tier
    /// must not reuse this entry.
    pub risk_tier: RiskTier,

    pub response_content: String,
    pub scope: AuthorizationScope,

    /// Unix seconds at issuance.
    pub issued_at: u64,

    pub ttl_seconds: u64,
}

impl LedgerEntry {
    pub fn is_expired(&self, now_unix: u64) -> bool {
        now_unix.saturating_sub(self.issued_at) > self.ttl_seconds
    }
}

/// A freshly adjudicated grant headed for the ledger.
#[derive(Debug, Clone)]
pub struct Certification {
    pub certification_id: String,
    pub risk_tier: RiskTier,
    pub response_content: String,
    pub scope: AuthorizationScope,
}

/// Outcome of a store attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Written (or idempotently re-written under the same id).
    Recorded,

    /// A near-neighbor with different content already holds this region
    /// of the space; the prior entry wins until it expires.
    ConflictSuppressed,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("ledger codec failure: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl LedgerError {
    /// Stable error class for refusal diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            LedgerError::Storage(_) => "ledger_storage",
            LedgerError::Codec(_) => "ledger_codec",
            LedgerError::Embedding(_) => "embedding_provider",
        }
    }
}

/// Sled-backed semantic ledger.
///
/// Reads are concurrent; writes serialize behind a mutex (single-writer
/// per process). Nearest-neighbor retrieval is a linear scan over the
/// certification tree, which is exact and comfortably fast at the entry
/// counts a single adjudication node accumulates inside one TTL window.
pub struct SemanticLedger {
    db: sled::Db,
    tree: sled::Tree,
    embedder: Arc<dyn Embedder>,
    similarity_threshold: f32,
    ttl_seconds: u64,
    write_lock: Mutex<()>,
}

impl SemanticLedger {
    const TREE_NAME: &'static str = "certifications";

    pub fn open(
        path: impl AsRef<std::path::Path>,
        embedder: Arc<dyn Embedder>,
        similarity_threshold: f32,
        ttl_seconds: u64,
    ) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(Self::TREE_NAME)?;
        info!(
            entries = tree.len(),
            model = embedder.model_id(),
            "semantic ledger opened"
        );

        Ok(Self {
            db,
            tree,
            embedder,
            similarity_threshold,
            ttl_seconds,
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Default certification lifetime applied to stored entries.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Nearest stored entry to the given embedding, with its distance.
    fn nearest(&self, embedding: &[f32]) -> Result<Option<(LedgerEntry, f32)>, LedgerError> {
        let mut best: Option<(LedgerEntry, f32)> = None;

        for item in self.tree.iter() {
            let (_, raw) = item?;
            let entry: LedgerEntry = bincode::deserialize(&raw)?;
            let distance = cosine_distance(embedding, &entry.embedding);
            match &best {
                Some((_, best_distance)) if distance >= *best_distance => {}
                _ => best = Some((entry, distance)),
            }
        }

        Ok(best)
    }

    /// Ledger lookup contract: return the single nearest neighbor iff it
    /// is (a) within the similarity threshold, (b) unexpired, and
    /// (c) issued at a tier >= the requested tier.
    pub async fn lookup(
        &self,
        query: &str,
        tier: RiskTier,
        now_unix: u64,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let embedding = self.embedder.embed(query).await?;

        let (entry, distance) = match self.nearest(&embedding)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let max_distance = 1.0 - self.similarity_threshold;
        if distance > max_distance {
            debug!(distance, max_distance, "ledger miss: nearest too far");
            return Ok(None);
        }
        if entry.is_expired(now_unix) {
            debug!(certification_id = %entry.certification_id, "ledger miss: entry expired");
            return Ok(None);
        }
        if tier > entry.risk_tier {
            debug!(
                requested = %tier,
                cached = %entry.risk_tier,
                "ledger miss: tier monotonicity refused reuse"
            );
            return Ok(None);
        }

        info!(
            certification_id = %entry.certification_id,
            distance,
            "ledger hit"
        );
        Ok(Some(entry))
    }

    /// Ledger store contract: write the certification unless a
    /// near-neighbor with different content already covers this query
    /// (conflict suppression). Same-id writes are idempotent upserts.
    pub async fn store(
        &self,
        query: &str,
        certification: Certification,
        now_unix: u64,
    ) -> Result<StoreOutcome, LedgerError> {
        let embedding = self.embedder.embed(query).await?;

        if let Some((neighbor, distance)) = self.nearest(&embedding)? {
            let max_distance = 1.0 - self.similarity_threshold;
            if distance <= max_distance
                && !neighbor.is_expired(now_unix)
                && neighbor.certification_id != certification.certification_id
                && neighbor.response_content != certification.response_content
            {
                warn!(
                    incumbent = %neighbor.certification_id,
                    suppressed = %certification.certification_id,
                    "conflicting near-neighbor certification suppressed"
                );
                return Ok(StoreOutcome::ConflictSuppressed);
            }
        }

        let entry = LedgerEntry {
            certification_id: certification.certification_id,
            embedding,
            risk_tier: certification.risk_tier,
            response_content: certification.response_content,
            scope: certification.scope,
            issued_at: now_unix,
            ttl_seconds: self.ttl_seconds,
        };

        let encoded = bincode::serialize(&entry)?;
        {
            let _guard = self.write_lock.lock();
            self.tree.insert(entry.certification_id.as_bytes(), encoded)?;
        }
        self.db.flush_async().await?;

        debug!(certification_id = %entry.certification_id, "certification recorded");
        Ok(StoreOutcome::Recorded)
    }

    /// Drop expired entries. Run at startup; the lookup path never
    /// returns expired entries either way.
    pub fn purge_expired(&self, now_unix: u64) -> Result<usize, LedgerError> {
        let mut expired_keys = Vec::new();
        for item in self.tree.iter() {
            let (key, raw) = item?;
            let entry: LedgerEntry = bincode::deserialize(&raw)?;
            if entry.is_expired(now_unix) {
                expired_keys.push(key);
            }
        }

        let _guard = self.write_lock.lock();
        for key in &expired_keys {
            self.tree.remove(key)?;
        }
        if !expired_keys.is_empty() {
            info!(purged = expired_keys.len(), "expired certifications purged");
        }
        Ok(expired_keys.len())
    }
}
