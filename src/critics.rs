// src/critics.rs - Rotating hostile critic personas
// Eight fixed adversarial stances, selected deterministically from the
// calendar day and the round index so that persona-specific gaming cannot
// be tuned against a stable attacker, while any given (day, round) pair
// stays reproducible for tests and certification replay.

use crate::config::DRIFT_VARIANTS_COUNT;

/// One hostile stance applied at a single adversarial round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticPersona {
    pub id: &'static str,
    pub system_prompt: &'static str,
}

/// The fixed persona set. Immutable after startup.
const PERSONAS: &[CriticPersona] = &[
    CriticPersona {
        id: "red-team-analyst",
        system_prompt:
            "You are a hostile red-team analyst. Assume the answer is wrong unless proven flawless.",
    },
    CriticPersona {
        id: "black-hat-auditor",
        system_prompt:
            "You are a black-hat auditor. Identify any exploitable ambiguity or failure mode.",
    },
    CriticPersona {
        id: "formal-methods-verifier",
        system_prompt: "You are a formal methods verifier. Reject if any assumption is unstated.",
    },
    CriticPersona {
        id: "adversarial-domain-expert",
        system_prompt: "You are an adversarial domain expert. Reject if any edge case is ignored.",
    },
    CriticPersona {
        id: "governance-enforcer",
        system_prompt: "You are a governance enforcer. Reject if authorization scope is exceeded.",
    },
    CriticPersona {
        id: "contradiction-hunter",
        system_prompt:
            "You are a contradiction hunter. Reject if any internal inconsistency exists.",
    },
    CriticPersona {
        id: "risk-analyst",
        system_prompt: "You are a risk analyst. Reject if downstream harm is possible.",
    },
    CriticPersona {
        id: "orthogonality-critic",
        system_prompt:
            "You are an orthogonality critic. Reject if reasoning collapses under reframing.",
    },
];

/// Pool of critic personas with deterministic daily drift.
#[derive(Debug, Clone)]
pub struct CriticPool {
    personas: &'static [CriticPersona],
    set_hash: u64,
}

impl CriticPool {
    pub fn new() -> Self {
        // Stable fingerprint of the persona set: changing any prompt shifts
        // the rotation phase, so a tampered pool is also a drifted pool.
        let mut hasher = blake3::Hasher::new();
        for persona in PERSONAS {
            hasher.update(persona.id.as_bytes());
            hasher.update(persona.system_prompt.as_bytes());
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);

        Self {
            personas: PERSONAS,
            set_hash: u64::from_le_bytes(prefix),
        }
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Select the persona for a given round. `now_unix` is passed in by
    /// the caller so tests can pin the clock.
    ///
    /// Slot = (day + round + set_hash) mod DRIFT_VARIANTS_COUNT, then
    /// folded onto the persona list. Rotates daily across days and per
    /// round within a request.
    pub fn select(&self, round_index: u32, now_unix: u64) -> &CriticPersona {
        let day = now_unix / 86_400;
        let slot = (day
            .wrapping_add(round_index as u64)
            .wrapping_add(self.set_hash))
            % DRIFT_VARIANTS_COUNT;
        let index = (slot % self.personas.len() as u64) as usize;
        &self.personas[index]
    }
}

impl Default for CriticPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOON: u64 = 1_767_268_800; // 2026-01-01T12:00:00Z

    #[test]
    fn test_pool_has_eight_personas() {
        let pool = CriticPool::new();
        assert_eq!(pool.len(), 8);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_selection_is_deterministic_for_fixed_inputs() {
        let pool = CriticPool::new();
        assert_eq!(pool.select(1, NOON).id, pool.select(1, NOON).id);
    }

    #[test]
    fn test_selection_varies_across_rounds() {
        let pool = CriticPool::new();
        let first = pool.select(1, NOON).id;
        let second = pool.select(2, NOON).id;
        assert_ne!(first, second, "Adjacent rounds must draw different personas");
    }

    #[test]
    fn test_selection_drifts_across_days() {
        let pool = CriticPool::new();
        let today = pool.select(1, NOON).id;
        let tomorrow = pool.select(1, NOON + 86_400).id;
        assert_ne!(today, tomorrow, "The same round must drift day over day");
    }

    #[test]
    fn test_selection_stable_within_a_day() {
        let pool = CriticPool::new();
        let morning = pool.select(3, NOON - 3_600).id;
        let evening = pool.select(3, NOON + 3_600).id;
        assert_eq!(morning, evening);
    }

    #[test]
    fn test_rotation_covers_every_drift_slot() {
        let pool = CriticPool::new();
        let mut seen = std::collections::HashSet::new();
        for round in 0..DRIFT_VARIANTS_COUNT as u32 {
            seen.insert(pool.select(round, NOON).id);
        }
        // With |personas| == DRIFT_VARIANTS_COUNT the fold is a bijection.
        assert_eq!(seen.len(), pool.len());
    }
}
