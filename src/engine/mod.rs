// src/engine/mod.rs - The adjudication state machine
// Entry -> Guarded -> CacheChecked -> Generated -> (CriticAttack <-> Defense)*
//   -> QuorumVote -> Terminal(Granted | Denied)
//
// The public entry never returns an error: every infrastructure fault is
// mapped to a structured refusal at the point it occurs. Nothing in the
// request path is spawned detached, so dropping the future (client
// disconnect, deadline) cancels all in-flight oracle calls and the ledger
// is never written for a cancelled or denied request.

pub mod quorum;
pub mod transcript;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::context::ContextFetcher;
use crate::critics::CriticPool;
use crate::ledger::{Certification, SemanticLedger};
use crate::metrics::AdjudicationMetrics;
use crate::oracle::{ChatMessage, Oracle};
use crate::schema::{
    AuthorizationScope, CetiResponse, FailureType, RefusalDiagnostics, ResponseMeta, RiskTier,
};
use quorum::quorum_vote;
use transcript::{Transcript, TurnRole};

/// Literal accept-token test, case-insensitive. A bare "ACCEPT" does not
/// count; the full `VERDICT: ACCEPT` marker must appear. Empty content
/// therefore classifies as REJECT.
pub fn contains_accept_verdict(content: &str) -> bool {
    content.to_uppercase().contains("VERDICT: ACCEPT")
}

// ==================== CLOCK ====================

/// Time source injected into the engine so critic drift, scope bounds and
/// ledger TTL checks are reproducible under test.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

// ==================== CONFIGURATION ====================

/// Engine-facing slice of the process configuration.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub generator_model: String,
    pub critic_model: String,
    pub judge_models: Vec<String>,
    pub max_rounds: u32,
    pub generation_max_tokens: u32,
    pub critic_max_tokens: u32,
    pub judge_max_tokens: u32,
}

impl VerifierConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            generator_model: config.generator_model.clone(),
            critic_model: config.critic_model.clone(),
            judge_models: config.judge_models.clone(),
            max_rounds: config.max_rounds,
            ..Default::default()
        }
    }
}

impl Default for VerifierConfig {
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
            generation_max_tokens: 500,
            critic_max_tokens: 400,
            judge_max_tokens: 100,
        }
    }
}

// ==================== VERIFIER ====================

/// The adjudication engine. All collaborators are injected, immutable and
/// shared; one `Verifier` serves every concurrent request.
pub struct Verifier {
    oracle: Arc<dyn Oracle>,
    ledger: Arc<SemanticLedger>,
    context: Arc<dyn ContextFetcher>,
    critics: CriticPool,
    clock: Arc<dyn Clock>,
    metrics: AdjudicationMetrics,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        ledger: Arc<SemanticLedger>,
        context: Arc<dyn ContextFetcher>,
        critics: CriticPool,
        clock: Arc<dyn Clock>,
        metrics: AdjudicationMetrics,
        config: VerifierConfig,
    ) -> Self {
        Self {
            oracle,
            ledger,
            context,
            critics,
            clock,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &AdjudicationMetrics {
        &self.metrics
    }

    /// Adjudicate one query. Always terminates in exactly one of GRANTED
    /// or DENIED; never raises.
    pub async fn verify(&self, query: &str, tier: RiskTier) -> CetiResponse {
        self.metrics.record_request();
        let response = self.adjudicate(query, tier).await;

        if response.is_granted() {
            self.metrics.record_grant();
            info!(tier = %tier, cached = response.meta.cached, "authorization GRANTED");
        } else {
            self.metrics.record_denial();
            let failure = response
                .refusal_diagnostics
                .as_ref()
                .map(|d| format!("{:?}", d.failure_type))
                .unwrap_or_default();
            info!(tier = %tier, failure = %failure, "authorization DENIED");
        }
        response
    }

    async fn adjudicate(&self, query: &str, tier: RiskTier) -> CetiResponse {
        // ---- Guard ----
        if let Some(reason) = crate::guard::screen_query(query) {
            debug!("input guard blocked query");
            return CetiResponse::denied(
                "Query rejected — potential governance gaming detected.",
                RefusalDiagnostics::new(FailureType::GamingSuspicion, reason)
                    .with_requirements("Rephrase without meta-instructions or governance references."),
                ResponseMeta::default(),
            );
        }

        let now = self.clock.now_unix();

        // ---- Ledger read ----
        match self.ledger.lookup(query, tier, now).await {
            Ok(Some(entry)) => {
                self.metrics.record_ledger_hit();
                return CetiResponse::granted(
                    entry.response_content,
                    entry.scope,
                    entry.certification_id,
                    ResponseMeta::ledger_hit(),
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(class = e.class(), "ledger lookup failed");
                return self.deny_infrastructure(&format!("ledger failure: {}", e.class()));
            }
        }

        // ---- Web context (best-effort, never fatal) ----
        let web_context = self.context.fetch(query).await;

        // ---- Initial generation ----
        let initial_prompt = if web_context.is_empty() {
            format!("Provide accurate, complete, and supported answer: {}", query)
        } else {
            format!(
                "{}\nProvide accurate, complete, and supported answer: {}",
                web_context, query
            )
        };

        let mut transcript = Transcript::new();
        transcript.push(TurnRole::User, &self.config.generator_model, 0, &initial_prompt);

        let mut gen_messages = vec![ChatMessage::user(initial_prompt)];

        let mut current_answer = match self
            .oracle
            .complete(
                &self.config.generator_model,
                &gen_messages,
                self.config.generation_max_tokens,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                self.metrics.record_oracle_error();
                warn!(class = e.class(), "initial generation failed");
                return CetiResponse::denied(
                    "Authorization denied — oracle instability.",
                    RefusalDiagnostics::new(FailureType::Instability, e.class())
                        .with_requirements("Retry later."),
                    ResponseMeta::default(),
                );
            }
        };

        transcript.push(TurnRole::Assistant, &self.config.generator_model, 0, &current_answer);
        gen_messages.push(ChatMessage::assistant(current_answer.clone()));

        // ---- Adversarial loop ----
        let mut consensus_reached = false;
        let mut rounds_completed = 0u32;
        let mut last_critique = String::new();

        for round in 1..=self.config.max_rounds {
            rounds_completed = round;

            let persona = self.critics.select(round, now);
            let critic_prompt = format!(
                "{}\n\nOriginal query: {}\n\nProposed answer:\n{}\n\n\
                 VERDICT: ACCEPT only if the answer is PERFECT - zero flaws, ambiguities, \
                 risks, or gaps.\nOtherwise VERDICT: REJECT followed by exhaustive \
                 destruction of every issue.",
                persona.system_prompt, query, current_answer
            );

            // Fail-closed: an unreachable critic is a rejecting critic.
            let critique = match self
                .oracle
                .complete(
                    &self.config.critic_model,
                    &[ChatMessage::system(critic_prompt)],
                    self.config.critic_max_tokens,
                )
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    self.metrics.record_oracle_error();
                    warn!(round, class = e.class(), "critic call failed, synthesizing REJECT");
                    format!("CRITIC FAILURE ({}) - VERDICT: REJECT", e.class())
                }
            };

            transcript.push(TurnRole::Critic, &self.config.critic_model, round, &critique);
            debug!(round, persona = persona.id, "critic verdict recorded");

            if contains_accept_verdict(&critique) {
                consensus_reached = true;
                break;
            }
            last_critique = critique.clone();

            // ---- Defense ----
            let defense_prompt = format!(
                "Your previous answer was attacked by a hostile critic:\n\n{}\n\n\
                 Address every point raised. Provide updated answer to the original query.",
                critique
            );
            gen_messages.push(ChatMessage::user(defense_prompt));

            match self
                .oracle
                .complete(
                    &self.config.generator_model,
                    &gen_messages,
                    self.config.generation_max_tokens,
                )
                .await
            {
                Ok(revised) => {
                    current_answer = revised;
                    transcript.push(
                        TurnRole::Assistant,
                        &self.config.generator_model,
                        round,
                        &current_answer,
                    );
                    gen_messages.push(ChatMessage::assistant(current_answer.clone()));
                }
                Err(e) => {
                    // The answer stands; the next round attacks it again.
                    self.metrics.record_oracle_error();
                    warn!(round, class = e.class(), "defense call failed, answer unchanged");
                    gen_messages.pop();
                }
            }
        }

        if !consensus_reached {
            return CetiResponse::denied(
                "Authorization denied — output not safe for action.",
                RefusalDiagnostics::new(FailureType::Instability, last_critique)
                    .with_requirements("Achieve perfect ACCEPT in all rounds and quorum consensus."),
                ResponseMeta {
                    cached: false,
                    source: None,
                    rounds_completed,
                    transcript_hash: Some(transcript.hash()),
                },
            );
        }

        // ---- Judge quorum ----
        let outcome = quorum_vote(
            &self.oracle,
            &self.config.judge_models,
            query,
            &current_answer,
            tier,
            self.config.judge_max_tokens,
        )
        .await;

        for ballot in &outcome.ballots {
            transcript.push(TurnRole::Judge, &ballot.model, rounds_completed, &ballot.justification);
        }

        let meta = ResponseMeta {
            cached: false,
            source: None,
            rounds_completed,
            transcript_hash: Some(transcript.hash()),
        };

        if !outcome.passed {
            return CetiResponse::denied(
                "Authorization denied — output not safe for action.",
                RefusalDiagnostics::new(
                    FailureType::Instability,
                    format!(
                        "Judge quorum rejected: {} of {} required accepts among {} judges.",
                        outcome.accepts,
                        outcome.required,
                        outcome.ballots.len()
                    ),
                )
                .with_requirements("Achieve perfect ACCEPT in all rounds and quorum consensus."),
                meta,
            );
        }

        if outcome.correlated {
            return CetiResponse::denied(
                "Authorization denied — output not safe for action.",
                RefusalDiagnostics::new(
                    FailureType::CorrelationSuspicion,
                    "Accepting judges share an identical assumption fingerprint.",
                )
                .with_requirements("Obtain accepts grounded in independent assumptions."),
                meta,
            );
        }

        // ---- Certification ----
        let certification_id = transcript.certification_id();
        let scope =
            AuthorizationScope::for_query(query, tier, now, self.ledger.ttl_seconds());

        let certification = Certification {
            certification_id: certification_id.clone(),
            risk_tier: tier,
            response_content: current_answer.clone(),
            scope: scope.clone(),
        };

        if let Err(e) = self.ledger.store(query, certification, now).await {
            warn!(class = e.class(), "certification store failed");
            return self.deny_infrastructure(&format!("ledger failure: {}", e.class()));
        }

        CetiResponse::granted(current_answer, scope, certification_id, meta)
    }

    fn deny_infrastructure(&self, details: &str) -> CetiResponse {
        CetiResponse::denied(
            "Authorization denied — oracle instability.",
            RefusalDiagnostics::new(FailureType::Instability, details)
                .with_requirements("Retry later."),
            ResponseMeta::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_verdict_is_literal_and_case_insensitive() {
        assert!(contains_accept_verdict("VERDICT: ACCEPT"));
        assert!(contains_accept_verdict("verdict: accept, with reservations"));
        assert!(contains_accept_verdict("Preamble... Verdict: Accept"));
    }

    #[test]
    fn test_bare_accept_does_not_count() {
        assert!(!contains_accept_verdict("ACCEPT"));
        assert!(!contains_accept_verdict("I accept this answer"));
        assert!(!contains_accept_verdict("VERDICT: REJECT"));
        assert!(!contains_accept_verdict(""));
    }

    #[test]
    fn test_mixed_tokens_resolve_to_accept_only_on_literal_marker() {
        assert!(contains_accept_verdict("VERDICT: REJECT... no wait. VERDICT: ACCEPT"));
        assert!(!contains_accept_verdict("REJECT or ACCEPT, pick one"));
    }

    #[test]
    fn test_system_clock_is_past_2024() {
        assert!(SystemClock.now_unix() > 1_704_067_200);
    }
}
