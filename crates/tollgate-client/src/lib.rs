//! Payment-aware HTTP client for autonomous agents.
//!
//! Wraps `reqwest` so a 402 response is handled automatically: parse
//! the challenge, ask the policy gate for permission, pay through the
//! configured executor, and retry once with the derived proof attached.
//! Receipts are cached per request signature, so paying twice for the
//! same resource within a challenge's lifetime never happens.
//!
//! # Quick example
//!
//! ```no_run
//! use tollgate_client::{ClientConfig, PayingClient};
//! # use tollgate_client::{PaymentExecutor, PaymentOutcome};
//! # use tollgate_policy::{Ledger, PolicyGate, PolicyError, TrustGateConfig, SpendingConfig, TrustOracle};
//! # use std::sync::Arc;
//! # struct MyExecutor;
//! # impl PaymentExecutor for MyExecutor {
//! #     async fn pay(&self, _: &str, _: &str, _: &str) -> Result<PaymentOutcome, tollgate::TollgateError> {
//! #         Ok(PaymentOutcome { execution_id: "tx".into() })
//! #     }
//! # }
//! # struct MyOracle;
//! # impl TrustOracle for MyOracle {
//! #     async fn get_score(&self, _: &str) -> Result<u32, PolicyError> { Ok(800) }
//! # }
//! # #[tokio::main]
//! # async fn main() {
//! let ledger = Arc::new(Ledger::open_in_memory().unwrap());
//! let policy = PolicyGate::new(
//!     MyOracle,
//!     ledger,
//!     TrustGateConfig::default(),
//!     SpendingConfig::default(),
//! );
//! let client = PayingClient::new(MyExecutor, policy, ClientConfig::default());
//!
//! let resp = client
//!     .fetch("https://api.example.com/data", reqwest::Method::GET)
//!     .await
//!     .unwrap();
//! # }
//! ```

mod config;
mod executor;
mod http_client;
mod receipt;

pub use config::ClientConfig;
pub use executor::{PaymentExecutor, PaymentOutcome};
pub use http_client::PayingClient;
pub use receipt::{PaymentReceipt, ReceiptCache};

// Re-export commonly needed types from the core and policy crates
pub use tollgate::{
    parse_challenge, ChallengeEnvelope, PaymentChallenge, TollgateError, NONCE_HEADER,
    PROOF_HEADER,
};
pub use tollgate_policy::{PolicyDecision, PolicyGate, SpendingConfig, TrustGateConfig};
