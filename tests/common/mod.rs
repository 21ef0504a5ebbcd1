//! Shared test harness: scripted oracle, planted embeddings, fixed clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ceti_core::context::NoContext;
use ceti_core::critics::CriticPool;
use ceti_core::embedding::{Embedder, EmbeddingError, HashedEmbedder};
use ceti_core::engine::{Clock, Verifier, VerifierConfig};
use ceti_core::ledger::SemanticLedger;
use ceti_core::metrics::AdjudicationMetrics;
use ceti_core::oracle::{ChatMessage, Oracle, OracleError};

pub const GEN: &str = "gen-model";
pub const CRITIC: &str = "critic-model";
pub const JUDGES: [&str; 3] = ["judge-1", "judge-2", "judge-3"];

/// 2026-01-01T12:00:00Z
pub const NOW: u64 = 1_767_268_800;

// ==================== CLOCK ====================

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_unix(&self) -> u64 {
        self.0
    }
}

// ==================== SCRIPTED ORACLE ====================

#[derive(Clone)]
pub enum Step {
    Reply(&'static str),
    Fail,
}

/// Per-model reply script. The final step of each script is sticky: once
/// the queue drains, the last step repeats forever. Call counts and the
/// prompts each call received are recorded for assertions.
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, u32>>,
    prompts: Mutex<HashMap<String, Vec<String>>>,
    total: AtomicU32,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            prompts: Mutex::new(HashMap::new()),
            total: AtomicU32::new(0),
        }
    }

    pub fn script(self, model: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), steps.into());
        self
    }

    pub fn calls(&self, model: &str) -> u32 {
        *self.calls.lock().unwrap().get(model).unwrap_or(&0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    /// Joined message contents of the nth call made to `model`.
    pub fn prompt(&self, model: &str, call: usize) -> String {
        self.prompts.lock().unwrap()[model][call].clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> Result<String, OracleError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_insert(0) += 1;
        self.prompts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push(
                messages
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n---\n"),
            );

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(model)
            .unwrap_or_else(|| panic!("no script for model {}", model));
        let step = queue.pop_front().unwrap_or_else(|| panic!("script for {} drained", model));
        if queue.is_empty() {
            queue.push_back(step.clone()); // sticky last step
        }

        match step {
            Step::Reply(content) => Ok(content.to_string()),
            Step::Fail => Err(OracleError::Timeout),
        }
    }
}

/// Oracle that accepts everything, for flows where the reply text is
/// irrelevant.
pub fn accept_all() -> ScriptedOracle {
    let mut oracle = ScriptedOracle::new()
        .script(GEN, vec![Step::Reply("42")])
        .script(CRITIC, vec![Step::Reply("VERDICT: ACCEPT")]);
    for judge in JUDGES {
        oracle = oracle.script(judge, vec![Step::Reply("VERDICT: ACCEPT")]);
    }
    oracle
}

// ==================== PLANTED EMBEDDER ====================

/// Embedder with hand-planted vectors for exact distance control.
pub struct PlantedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl PlantedEmbedder {
    pub fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: vectors
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Embedder for PlantedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .vectors
            .get(text)
            .unwrap_or_else(|| panic!("no planted vector for {:?}", text))
            .clone())
    }

    fn model_id(&self) -> &str {
        "planted"
    }
}

// ==================== HARNESS ====================

pub struct Harness {
    pub oracle: Arc<ScriptedOracle>,
    pub verifier: Verifier,
    // Held so the sled directory outlives the test body.
    _dir: TempDir,
}

pub fn verifier_config(max_rounds: u32) -> VerifierConfig {
    VerifierConfig {
        generator_model: GEN.to_string(),
        critic_model: CRITIC.to_string(),
        judge_models: JUDGES.iter().map(|j| j.to_string()).collect(),
        max_rounds,
        ..Default::default()
    }
}

pub fn harness(oracle: ScriptedOracle, max_rounds: u32) -> Harness {
    harness_with_embedder(oracle, max_rounds, Arc::new(HashedEmbedder::new()))
}

pub fn harness_with_embedder(
    oracle: ScriptedOracle,
    max_rounds: u32,
    embedder: Arc<dyn Embedder>,
) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let ledger = Arc::new(
        SemanticLedger::open(dir.path().join("ledger"), embedder, 0.92, 3_600)
            .expect("ledger must open"),
    );
    let oracle = Arc::new(oracle);

    let verifier = Verifier::new(
        oracle.clone(),
        ledger,
        Arc::new(NoContext),
        CriticPool::new(),
        Arc::new(FixedClock(NOW)),
        AdjudicationMetrics::new(),
        verifier_config(max_rounds),
    );

    Harness {
        oracle,
        verifier,
        _dir: dir,
    }
}
