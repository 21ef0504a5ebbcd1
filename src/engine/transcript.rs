// src/engine/transcript.rs - Append-only adjudication transcript
// The transcript is the sole input to the certification hash. Turns are
// appended in generation order and the whole structure is discarded once
// the response is emitted; only its hash survives in the ledger.

use crate::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    Critic,
    Judge,
}

impl TurnRole {
    fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Critic => "critic",
            TurnRole::Judge => "judge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub model_id: String,
    pub round_index: u32,
    pub content: String,
}

impl TranscriptTurn {
    /// Canonical single-record encoding fed to the certification hash.
    fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.role.as_str(),
            self.model_id,
            self.round_index,
            self.content
        )
    }
}

/// Ordered turn sequence for one adjudication.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: TurnRole, model_id: &str, round_index: u32, content: &str) {
        self.turns.push(TranscriptTurn {
            role,
            model_id: model_id.to_string(),
            round_index,
            content: content.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// SHA-256 over the newline-joined canonical turn records.
    pub fn hash(&self) -> String {
        let joined = self
            .turns
            .iter()
            .map(TranscriptTurn::canonical)
            .collect::<Vec<_>>()
            .join("\n");
        sha256_hex(joined.as_bytes())
    }

    /// Certification id: SHA-256 of the transcript hash. Two runs with
    /// identical transcripts certify identically.
    pub fn certification_id(&self) -> String {
        sha256_hex(self.hash().as_bytes())
    }
}
