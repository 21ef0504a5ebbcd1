use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::ledger::LedgerError;
use crate::oracle::OracleError;

/// Top-level error for process bootstrap and wiring.
///
/// Request-path failures never surface through this type: the verification
/// engine maps every infrastructure fault into a structured `DENIED`
/// response instead. `CetiError` exists for the phase before the listener
/// binds: configuration, ledger open, provider client construction.
#[derive(Debug, thiserror::Error)]
pub enum CetiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Oracle client error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Embedding provider error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
