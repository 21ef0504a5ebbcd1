// src/schema.rs - Wire schemas for the adjudication layer
// Every response is a scoped authorization or a structured refusal,
// never a truth assertion. The field set is frozen: clients may depend
// on it, so unknown fields are forbidden at the boundary.

use serde::{Deserialize, Serialize};

use crate::config::MAX_DIAGNOSTIC_CHARS;
use crate::sha256_hex;

// ==================== RISK TIERS ====================

/// Client-declared sensitivity tier. Total-ordered: a higher-tier request
/// never accepts a certification issued at a lower tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a grant permits the caller to do with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Informational,
    DecisionSupport,
}

impl ActionClass {
    /// LOW and MEDIUM grants are informational; HIGH and CRITICAL grants
    /// carry decision-support weight.
    pub fn for_tier(tier: RiskTier) -> Self {
        if tier <= RiskTier::Medium {
            ActionClass::Informational
        } else {
            ActionClass::DecisionSupport
        }
    }
}

// ==================== SCOPE & DIAGNOSTICS ====================

/// Scoped bounds of a granted authorization: what, until when, and at
/// what declared risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationScope {
    /// SHA-256 of the query text.
    pub context_hash: String,

    /// Human-readable validity bound, e.g. "valid until 2026-08-31".
    pub temporal_bounds: String,

    pub action_class: ActionClass,

    /// Tier the certification was issued at.
    pub risk_tier_applied: RiskTier,
}

impl AuthorizationScope {
    /// Build the scope for a fresh grant.
    pub fn for_query(query: &str, tier: RiskTier, now_unix: u64, ttl_seconds: u64) -> Self {
        let expiry = chrono::DateTime::from_timestamp(now_unix as i64 + ttl_seconds as i64, 0)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            context_hash: sha256_hex(query.as_bytes()),
            temporal_bounds: format!("valid until {}", expiry),
            action_class: ActionClass::for_tier(tier),
            risk_tier_applied: tier,
        }
    }
}

/// Refusal classification, ordered roughly by diagnostic specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    CorrelationSuspicion,
    Contradiction,
    GamingSuspicion,
    MissingEvidence,
    Instability,
    Other,
}

/// Structured diagnostics for DENIED responses, actionable by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefusalDiagnostics {
    pub failure_type: FailureType,

    /// What failed. Clipped to 300 chars; never raw provider output.
    pub details: String,

    /// What would allow certification, when actionable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_for_certification: Option<String>,
}

impl RefusalDiagnostics {
    /// Construct diagnostics with the details clip applied. All refusal
    /// construction funnels through here so no call site can leak an
    /// unbounded provider string.
    pub fn new(failure_type: FailureType, details: impl Into<String>) -> Self {
        Self {
            failure_type,
            details: clip_details(details.into()),
            requirements_for_certification: None,
        }
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements_for_certification = Some(requirements.into());
        self
    }
}

fn clip_details(details: String) -> String {
    if details.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        details
    } else {
        details.chars().take(MAX_DIAGNOSTIC_CHARS).collect()
    }
}

// ==================== RESPONSE ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Authorization {
    Granted,
    Denied,
}

/// Non-authoritative metadata attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseMeta {
    /// True when the response was served from the ledger.
    pub cached: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Critic/defense rounds executed (0 for ledger hits and guard blocks).
    pub rounds_completed: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_hash: Option<String>,
}

impl ResponseMeta {
    pub fn ledger_hit() -> Self {
        Self {
            cached: true,
            source: Some("ledger_hit".to_string()),
            rounds_completed: 0,
            transcript_hash: None,
        }
    }
}

/// Final adjudication response: permission or denial, never truth.
///
/// Construct through [`CetiResponse::granted`] / [`CetiResponse::denied`];
/// those are the only paths that keep the field invariants (a grant always
/// carries scope and certification id, a denial never does).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CetiResponse {
    pub authorization: Authorization,
    pub response_content: String,
    pub scope: Option<AuthorizationScope>,
    pub refusal_diagnostics: Option<RefusalDiagnostics>,
    pub certification_id: Option<String>,
    pub meta: ResponseMeta,
}

impl CetiResponse {
    pub fn granted(
        response_content: impl Into<String>,
        scope: AuthorizationScope,
        certification_id: impl Into<String>,
        meta: ResponseMeta,
    ) -> Self {
        Self {
            authorization: Authorization::Granted,
            response_content: response_content.into(),
            scope: Some(scope),
            refusal_diagnostics: None,
            certification_id: Some(certification_id.into()),
            meta,
        }
    }

    pub fn denied(
        response_content: impl Into<String>,
        diagnostics: RefusalDiagnostics,
        meta: ResponseMeta,
    ) -> Self {
        Self {
            authorization: Authorization::Denied,
            response_content: response_content.into(),
            scope: None,
            refusal_diagnostics: Some(diagnostics),
            certification_id: None,
            meta,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.authorization == Authorization::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_tier_total_order() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn test_risk_tier_wire_names() {
        assert_eq!(serde_json::to_string(&RiskTier::Critical).unwrap(), "\"CRITICAL\"");
        let tier: RiskTier = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(tier, RiskTier::Low);
        assert!(serde_json::from_str::<RiskTier>("\"EXTREME\"").is_err());
    }

    #[test]
    fn test_action_class_tier_split() {
        assert_eq!(ActionClass::for_tier(RiskTier::Low), ActionClass::Informational);
        assert_eq!(ActionClass::for_tier(RiskTier::Medium), ActionClass::Informational);
        assert_eq!(ActionClass::for_tier(RiskTier::High), ActionClass::DecisionSupport);
        assert_eq!(ActionClass::for_tier(RiskTier::Critical), ActionClass::DecisionSupport);
    }

    #[test]
    fn test_scope_temporal_bounds_format() {
        // 2026-01-01 00:00:00 UTC plus a 30-day TTL lands on 2026-01-31.
        let scope = AuthorizationScope::for_query("q", RiskTier::Medium, 1_767_225_600, 2_592_000);
        assert_eq!(scope.temporal_bounds, "valid until 2026-01-31");
        assert_eq!(scope.context_hash.len(), 64);
    }

    #[test]
    fn test_granted_carries_scope_and_certification() {
        let scope = AuthorizationScope::for_query("q", RiskTier::Low, 0, 60);
        let response = CetiResponse::granted("answer", scope, "a".repeat(64), ResponseMeta::default());
        assert!(response.is_granted());
        assert!(response.scope.is_some());
        assert!(response.certification_id.is_some());
        assert!(response.refusal_diagnostics.is_none());
    }

    #[test]
    fn test_denied_never_carries_scope_or_certification() {
        let response = CetiResponse::denied(
            "no",
            RefusalDiagnostics::new(FailureType::Instability, "oracle timeout"),
            ResponseMeta::default(),
        );
        assert!(!response.is_granted());
        assert!(response.scope.is_none());
        assert!(response.certification_id.is_none());
        assert!(response.refusal_diagnostics.is_some());
    }

    #[test]
    fn test_details_clipped_to_300_chars() {
        let diagnostics = RefusalDiagnostics::new(FailureType::Other, "x".repeat(900));
        assert_eq!(diagnostics.details.chars().count(), 300);
    }

    #[test]
    fn test_response_round_trip_and_unknown_fields_forbidden() {
        let response = CetiResponse::denied(
            "no",
            RefusalDiagnostics::new(FailureType::GamingSuspicion, "pattern")
                .with_requirements("rephrase"),
            ResponseMeta::default(),
        );
        let json = serde_json::to_string(&response).unwrap();
        let back: CetiResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["surprise"] = serde_json::json!(true);
        assert!(serde_json::from_value::<CetiResponse>(value).is_err());
    }
}
