//! Policy engine error types.

/// Errors that can occur in the policy engine.
///
/// Store failures are surfaced, not swallowed: a spending check that
/// cannot read its history must deny, so the caller needs to see the
/// failure rather than an empty total.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("trust oracle error: {0}")]
    Oracle(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}
