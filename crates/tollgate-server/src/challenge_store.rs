//! Issued-challenge registry.
//!
//! Every 402 the paywall sends is recorded here by nonce so the proof
//! retry can be checked against exactly what was quoted. A challenge
//! settles at most once, with the first valid proof; replaying that
//! same proof is idempotent until the challenge expires (clients cache
//! receipts and reuse them), but a different proof against a settled
//! or expired challenge fails.

use dashmap::DashMap;

use tollgate::{now_secs, PaymentChallenge};

struct IssuedChallenge {
    challenge: PaymentChallenge,
    settled_proof: Option<String>,
}

/// Outcome of presenting a proof for settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// First settlement of this challenge.
    First,
    /// The same proof already settled this challenge; idempotent replay.
    Replay,
    /// Unknown or expired nonce, or a different proof already settled it.
    Rejected,
}

/// In-memory challenge store backed by DashMap. Challenges are
/// short-lived (minutes), so loss on restart only forces clients to
/// re-request a quote.
pub struct ChallengeStore {
    issued: DashMap<String, IssuedChallenge>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self {
            issued: DashMap::new(),
        }
    }

    /// Record a freshly issued challenge.
    pub fn record(&self, challenge: PaymentChallenge) {
        self.issued.insert(
            challenge.nonce.clone(),
            IssuedChallenge {
                challenge,
                settled_proof: None,
            },
        );
    }

    /// Look up an issued challenge by nonce, settled or not.
    pub fn get(&self, nonce: &str) -> Option<PaymentChallenge> {
        self.issued.get(nonce).map(|e| e.challenge.clone())
    }

    /// The proof that settled this challenge, if it has settled.
    pub fn settled_proof(&self, nonce: &str) -> Option<String> {
        self.issued
            .get(nonce)
            .and_then(|e| e.settled_proof.clone())
    }

    /// Atomically settle a nonce with a verified proof.
    pub fn try_settle(&self, nonce: &str, proof: &str) -> Settlement {
        match self.issued.get_mut(nonce) {
            Some(mut entry) => {
                if entry.challenge.is_expired(now_secs()) {
                    return Settlement::Rejected;
                }
                match &entry.settled_proof {
                    Some(existing) if existing == proof => Settlement::Replay,
                    Some(_) => Settlement::Rejected,
                    None => {
                        entry.settled_proof = Some(proof.to_string());
                        Settlement::First
                    }
                }
            }
            None => Settlement::Rejected,
        }
    }

    /// Drop expired challenges. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_secs();
        let before = self.issued.len();
        self.issued.retain(|_, e| !e.challenge.is_expired(now));
        before - self.issued.len()
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate::ChallengeIssuer;

    fn issue() -> PaymentChallenge {
        ChallengeIssuer::new("base-sepolia", "0xRECV", "usdc").issue("0.10", "test")
    }

    #[test]
    fn test_record_and_get() {
        let store = ChallengeStore::new();
        let c = issue();
        store.record(c.clone());
        assert_eq!(store.get(&c.nonce), Some(c));
        assert_eq!(store.get("unknown-nonce"), None);
    }

    #[test]
    fn test_settle_then_replay_same_proof() {
        let store = ChallengeStore::new();
        let c = issue();
        store.record(c.clone());
        assert_eq!(store.try_settle(&c.nonce, "proof-a"), Settlement::First);
        assert_eq!(store.try_settle(&c.nonce, "proof-a"), Settlement::Replay);
        assert_eq!(store.settled_proof(&c.nonce).as_deref(), Some("proof-a"));
    }

    #[test]
    fn test_different_proof_after_settlement_rejected() {
        let store = ChallengeStore::new();
        let c = issue();
        store.record(c.clone());
        assert_eq!(store.try_settle(&c.nonce, "proof-a"), Settlement::First);
        assert_eq!(store.try_settle(&c.nonce, "proof-b"), Settlement::Rejected);
    }

    #[test]
    fn test_settle_unknown_nonce_rejected() {
        let store = ChallengeStore::new();
        assert_eq!(
            store.try_settle("never-issued", "proof"),
            Settlement::Rejected
        );
    }

    #[test]
    fn test_expired_challenge_cannot_settle() {
        let store = ChallengeStore::new();
        let mut c = issue();
        c.expires = now_secs().saturating_sub(1);
        store.record(c.clone());
        assert_eq!(store.try_settle(&c.nonce, "proof"), Settlement::Rejected);
    }

    #[test]
    fn test_purge_drops_only_expired() {
        let store = ChallengeStore::new();
        let fresh = issue();
        let mut stale = issue();
        stale.expires = now_secs().saturating_sub(1);
        store.record(fresh.clone());
        store.record(stale);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh.nonce).is_some());
    }
}
