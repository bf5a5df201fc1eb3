//! Challenge construction (server side) and parsing (client side).
//!
//! A challenge is a structured statement of what must be paid, to whom,
//! on which network, before a resource is served. It travels as the
//! JSON body of an HTTP 402 response, wrapped in a single-key envelope
//! so receivers can tell it apart from arbitrary 402 bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_CHALLENGE_LIFETIME_SECS, PROTOCOL_VERSION};
use crate::error::TollgateError;
use crate::now_secs;

/// A payment-required challenge. Immutable once issued; the nonce is
/// unique per challenge and must never be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub version: u32,
    pub network: String,
    pub receiver: String,
    pub asset: String,
    /// Decimal string, not floating point.
    pub amount: String,
    pub description: String,
    /// Absolute expiry, Unix seconds.
    pub expires: u64,
    /// Opaque unique string.
    pub nonce: String,
}

impl PaymentChallenge {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires <= now
    }

    /// Reject an expired challenge with the dedicated error variant.
    pub fn ensure_fresh(&self, now: u64) -> Result<(), TollgateError> {
        if self.is_expired(now) {
            Err(TollgateError::ChallengeExpired {
                expires: self.expires,
                now,
            })
        } else {
            Ok(())
        }
    }
}

/// Wire envelope: the challenge nested under a single top-level key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeEnvelope {
    pub payment_required: PaymentChallenge,
}

impl ChallengeEnvelope {
    pub fn new(challenge: PaymentChallenge) -> Self {
        Self {
            payment_required: challenge,
        }
    }
}

/// Server-side challenge factory. Holds the receiving identity and the
/// configured challenge lifetime.
#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    pub network: String,
    pub receiver: String,
    pub asset: String,
    pub lifetime_secs: u64,
}

impl ChallengeIssuer {
    pub fn new(network: &str, receiver: &str, asset: &str) -> Self {
        Self {
            network: network.to_string(),
            receiver: receiver.to_string(),
            asset: asset.to_string(),
            lifetime_secs: DEFAULT_CHALLENGE_LIFETIME_SECS,
        }
    }

    pub fn with_lifetime(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    /// Build a challenge with a fresh random nonce, expiring
    /// `lifetime_secs` from now. `amount` is a decimal string.
    pub fn issue(&self, amount: &str, description: &str) -> PaymentChallenge {
        PaymentChallenge {
            version: PROTOCOL_VERSION,
            network: self.network.clone(),
            receiver: self.receiver.clone(),
            asset: self.asset.clone(),
            amount: amount.to_string(),
            description: description.to_string(),
            expires: now_secs().saturating_add(self.lifetime_secs),
            nonce: Uuid::new_v4().to_string(),
        }
    }
}

/// Parse an HTTP response into a challenge.
///
/// Only a 402 status with a well-formed envelope body is a challenge. A
/// 402 with a missing or malformed body is a protocol error, distinct
/// from both "challenge expired" and "denied by policy" so callers can
/// react differently to each.
pub fn parse_challenge(status: u16, body: &[u8]) -> Result<PaymentChallenge, TollgateError> {
    if status != 402 {
        return Err(TollgateError::Protocol(format!(
            "expected 402 Payment Required, got {status}"
        )));
    }
    if body.is_empty() {
        return Err(TollgateError::Protocol(
            "402 response with empty body".to_string(),
        ));
    }
    let envelope: ChallengeEnvelope = serde_json::from_slice(body).map_err(|e| {
        TollgateError::Protocol(format!("402 body is not a payment challenge: {e}"))
    })?;
    Ok(envelope.payment_required)
}
