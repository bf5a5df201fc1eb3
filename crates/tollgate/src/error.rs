use thiserror::Error;

/// Errors returned by tollgate operations.
///
/// The variants map one-to-one onto the failure classes the protocol
/// distinguishes: a malformed challenge is not an expired challenge is
/// not a policy denial, and callers branch on which one they got.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Missing or malformed challenge body on a 402 response. Fatal to
    /// the current request; never retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The challenge's expiry is already in the past.
    #[error("challenge expired at {expires} (now {now})")]
    ChallengeExpired { expires: u64, now: u64 },

    /// Trust Gate or Spending Limit Engine refused the payment.
    #[error("payment denied by policy: {0}")]
    PolicyDenied(String),

    /// The payment executor itself failed. Surfaced verbatim; no
    /// spending record is created.
    #[error("payment executor failed: {0}")]
    ExecutorFailure(String),

    /// Server-side proof verification rejected the payment.
    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    /// Transport-level failure talking to a remote party.
    #[error("http error: {0}")]
    HttpError(String),

    /// Persistent store failure (ledger, receipt cache).
    #[error("store error: {0}")]
    StoreError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
