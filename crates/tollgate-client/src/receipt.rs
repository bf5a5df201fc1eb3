//! Receipt cache: proof reuse until the challenge expires.
//!
//! A receipt records that a given request's challenge has already been
//! paid for. It is owned exclusively by the client instance that paid;
//! receipts are never shared across agents.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use tollgate::{now_secs, PaymentChallenge};

/// A completed payment for one request signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// "METHOD url" of the originating request.
    pub request_key: String,
    /// The challenge this receipt satisfies.
    pub challenge: PaymentChallenge,
    pub execution_id: String,
    pub proof: String,
    pub paid_at: u64,
    /// Copied from the challenge (optionally capped by client config).
    pub expires: u64,
}

impl PaymentReceipt {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires <= now
    }
}

/// In-memory receipt cache keyed by request signature. Expired
/// receipts are dropped on lookup.
pub struct ReceiptCache {
    receipts: DashMap<String, PaymentReceipt>,
}

impl ReceiptCache {
    pub fn new() -> Self {
        Self {
            receipts: DashMap::new(),
        }
    }

    /// Return the receipt for `key` if one exists and is still fresh.
    pub fn get_fresh(&self, key: &str) -> Option<PaymentReceipt> {
        let now = now_secs();
        match self.receipts.get(key) {
            Some(r) if !r.is_expired(now) => Some(r.clone()),
            Some(_) => {
                drop(self.receipts.remove(key));
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, receipt: PaymentReceipt) {
        self.receipts.insert(receipt.request_key.clone(), receipt);
    }

    /// Drop all expired receipts. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_secs();
        let before = self.receipts.len();
        self.receipts.retain(|_, r| !r.is_expired(now));
        before - self.receipts.len()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

impl Default for ReceiptCache {
    fn default() -> Self {
        Self::new()
    }
}
