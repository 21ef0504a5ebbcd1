// src/engine/quorum.rs - Parallel judge quorum
// Fan-out/fan-in vote across independent judge models. Each judge sees
// the same arbiter prompt; a strict supermajority of literal
// `VERDICT: ACCEPT` replies is required. Judge failures count as REJECT,
// and correlated accept justifications downgrade the vote.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use super::contains_accept_verdict;
use crate::oracle::{ChatMessage, Oracle};
use crate::schema::RiskTier;
use crate::sha256_hex;

/// One judge's reply.
#[derive(Debug, Clone)]
pub struct JudgeBallot {
    pub model: String,
    pub accepted: bool,
    pub justification: String,
}

/// Joined quorum result.
#[derive(Debug, Clone)]
pub struct QuorumOutcome {
    pub ballots: Vec<JudgeBallot>,
    pub accepts: u32,
    pub required: u32,
    pub passed: bool,

    /// True when every accepting justification rests on the identical
    /// assumption set - independent judges that reason in lockstep are
    /// evidence of correlation, not of consensus.
    pub correlated: bool,
}

/// Strict supermajority: floor(2N/3) + 1.
pub fn required_accepts(judge_count: usize) -> u32 {
    (judge_count as u32 * 2) / 3 + 1
}

fn judge_prompt(query: &str, answer: &str, tier: RiskTier) -> String {
    format!(
        "You are an impartial Arbiter. Evaluate this final answer for the query:\n\n\
         Query: {}\n\n\
         Final answer:\n{}\n\n\
         Is this answer flawless for {} risk? VERDICT: ACCEPT or REJECT.",
        query, answer, tier
    )
}

/// Run the quorum vote: one parallel oracle call per judge model.
///
/// The fan-out is owned by the returned future - dropping it (client
/// disconnect, deadline) drops every in-flight judge call with it.
pub async fn quorum_vote(
    oracle: &Arc<dyn Oracle>,
    judge_models: &[String],
    query: &str,
    answer: &str,
    tier: RiskTier,
    max_tokens: u32,
) -> QuorumOutcome {
    let prompt = judge_prompt(query, answer, tier);

    let votes = judge_models.iter().map(|model| {
        let oracle = Arc::clone(oracle);
        let messages = vec![ChatMessage::system(prompt.clone())];
        let model = model.clone();
        async move {
            match oracle.complete(&model, &messages, max_tokens).await {
                Ok(content) => {
                    let accepted = contains_accept_verdict(&content);
                    debug!(model = %model, accepted, "judge ballot received");
                    JudgeBallot {
                        model,
                        accepted,
                        justification: content,
                    }
                }
                Err(e) => {
                    // Fail-closed: an unreachable judge is a rejecting judge.
                    warn!(model = %model, class = e.class(), "judge call failed, counting as REJECT");
                    JudgeBallot {
                        model,
                        accepted: false,
                        justification: format!("JUDGE FAILURE ({}) - VERDICT: REJECT", e.class()),
                    }
                }
            }
        }
    });

    let ballots = join_all(votes).await;
    let accepts = ballots.iter().filter(|b| b.accepted).count() as u32;
    let required = required_accepts(judge_models.len());
    let passed = accepts >= required;
    let correlated = passed && accept_justifications_correlated(&ballots);

    QuorumOutcome {
        ballots,
        accepts,
        required,
        passed,
        correlated,
    }
}

// ==================== ASSUMPTION ORTHOGONALITY ====================

/// Lines a judge marked as load-bearing premises.
fn extract_assumptions(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| {
            line.starts_with("assume ")
                || line.starts_with("assumption ")
                || line.starts_with("premise ")
        })
        .collect()
}

/// Order-insensitive fingerprint of a normalized assumption set.
fn assumptions_fingerprint(assumptions: &[String]) -> String {
    let mut normalized: Vec<&str> = assumptions.iter().map(|a| a.trim()).collect();
    normalized.sort_unstable();
    normalized.dedup();
    sha256_hex(normalized.join("\n").as_bytes())
}

/// True when at least two judges accepted, every accepting justification
/// carries the same assumption fingerprint, and at least one of them
/// actually stated an assumption. Judges that state no assumptions are
/// indistinguishable, not correlated.
fn accept_justifications_correlated(ballots: &[JudgeBallot]) -> bool {
    let accepting: Vec<&JudgeBallot> = ballots.iter().filter(|b| b.accepted).collect();
    if accepting.len() < 2 {
        return false;
    }

    let assumption_sets: Vec<Vec<String>> = accepting
        .iter()
        .map(|b| extract_assumptions(&b.justification))
        .collect();
    if assumption_sets.iter().all(|set| set.is_empty()) {
        return false;
    }

    let fingerprints: Vec<String> = assumption_sets
        .iter()
        .map(|set| assumptions_fingerprint(set))
        .collect();
    fingerprints.windows(2).all(|pair| pair[0] == pair[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(model: &str, accepted: bool, justification: &str) -> JudgeBallot {
        JudgeBallot {
            model: model.to_string(),
            accepted,
            justification: justification.to_string(),
        }
    }

    #[test]
    fn test_required_accepts_is_strict_supermajority() {
        assert_eq!(required_accepts(3), 3);
        assert_eq!(required_accepts(4), 3);
        assert_eq!(required_accepts(5), 4);
        assert_eq!(required_accepts(6), 5);
        assert_eq!(required_accepts(9), 7);
    }

    #[test]
    fn test_extract_assumptions_matches_premise_lines() {
        let text = "VERDICT: ACCEPT\nAssume the input is UTF-8.\nPremise one holds.\nOther line.";
        let assumptions = extract_assumptions(text);
        assert_eq!(
            assumptions,
            vec!["assume the input is utf-8.", "premise one holds."]
        );
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let a = assumptions_fingerprint(&["assume x".into(), "assume y".into()]);
        let b = assumptions_fingerprint(&["assume y".into(), "assume x".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_assumption_sets_are_correlated() {
        let ballots = vec![
            ballot("j1", true, "VERDICT: ACCEPT\nassume the source is current"),
            ballot("j2", true, "VERDICT: ACCEPT\nAssume the source is current"),
            ballot("j3", false, "VERDICT: REJECT"),
        ];
        assert!(accept_justifications_correlated(&ballots));
    }

    #[test]
    fn test_distinct_assumption_sets_are_not_correlated() {
        let ballots = vec![
            ballot("j1", true, "VERDICT: ACCEPT\nassume the source is current"),
            ballot("j2", true, "VERDICT: ACCEPT\nassume units are metric"),
        ];
        assert!(!accept_justifications_correlated(&ballots));
    }

    #[test]
    fn test_assumption_free_justifications_are_not_correlated() {
        let ballots = vec![
            ballot("j1", true, "VERDICT: ACCEPT"),
            ballot("j2", true, "VERDICT: ACCEPT"),
        ];
        assert!(!accept_justifications_correlated(&ballots));
    }

    #[test]
    fn test_single_accept_is_never_correlated() {
        let ballots = vec![
            ballot("j1", true, "VERDICT: ACCEPT\nassume x"),
            ballot("j2", false, "VERDICT: REJECT\nassume x"),
        ];
        assert!(!accept_justifications_correlated(&ballots));
    }
}
