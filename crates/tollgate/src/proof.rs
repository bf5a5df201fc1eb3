//! Proof derivation.
//!
//! A proof is the opaque token a payer presents to show a challenge was
//! satisfied. It is derived deterministically from the challenge nonce,
//! amount, receiver, and the executor's transaction reference, so the
//! same payment always yields the same proof and retries stay
//! idempotent. This layer standardizes nothing else about it; servers
//! treat it as opaque bytes.

use sha2::{Digest, Sha256};

use crate::challenge::PaymentChallenge;

/// Derive the proof token for a completed payment.
pub fn derive_proof(challenge: &PaymentChallenge, execution_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.nonce.as_bytes());
    hasher.update(b"\x00");
    hasher.update(challenge.amount.as_bytes());
    hasher.update(b"\x00");
    hasher.update(challenge.receiver.to_lowercase().as_bytes());
    hasher.update(b"\x00");
    hasher.update(execution_id.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}
