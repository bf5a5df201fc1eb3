//! The paywall gate.
//!
//! Per-request state machine, shared by every pricing strategy:
//!
//! 1. No proof header → issue a fresh challenge, respond 402.
//! 2. Proof header present → look up the recorded challenge; it must
//!    be unexpired and quote the price resolved for this request, then
//!    the proof is verified against it.
//!    Verified → settle the challenge and let the request through with
//!    the amount attached; the settling proof stays valid for replay
//!    until the challenge expires.
//!    Not verified → 402 again, flagged as an invalid payment (the
//!    `PAYMENT-ERROR` response header distinguishes "pay" from "your
//!    payment did not validate"; the body stays the plain challenge
//!    envelope either way).
//!    Verifier failure → 500, because that one is on us, not the
//!    caller.

use actix_web::{HttpRequest, HttpResponse};

use tollgate::{ChallengeEnvelope, ChallengeIssuer, NONCE_HEADER, PROOF_HEADER};

use crate::challenge_store::{ChallengeStore, Settlement};
use crate::metrics::{PAYMENT_ATTEMPTS, REQUESTS};
use crate::pricing::{PriceResolution, PriceStrategy, RequestInfo};
use crate::verify::ProofVerifier;

/// Response header flagging why a 402 was returned: `payment required`
/// (no proof presented) or `invalid payment` (proof did not validate).
pub const PAYMENT_ERROR_HEADER: &str = "PAYMENT-ERROR";

/// Shared paywall state: the challenge factory, the issued-challenge
/// registry, and the proof verifier.
pub struct PaywallState<V: ProofVerifier> {
    pub issuer: ChallengeIssuer,
    pub challenges: ChallengeStore,
    pub verifier: V,
}

impl<V: ProofVerifier> PaywallState<V> {
    pub fn new(issuer: ChallengeIssuer, verifier: V) -> Self {
        Self {
            issuer,
            challenges: ChallengeStore::new(),
            verifier,
        }
    }
}

/// A verified payment, attached to the request context by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Decimal amount string from the satisfied challenge.
    pub amount: String,
    pub nonce: String,
    pub proof: String,
}

/// How a gated request may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Served without payment (subscription, free tier).
    Free { reason: String },
    /// Served because a payment proof verified.
    Paid(VerifiedPayment),
}

/// Extract the facts a strategy prices on.
pub fn request_info(req: &HttpRequest) -> RequestInfo {
    let body_len = req
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    // Stable caller identity: explicit header first, else peer IP.
    let caller = req
        .headers()
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| req.peer_addr().map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    RequestInfo {
        method: req.method().to_string(),
        path: req.path().to_string(),
        body_len,
        caller,
    }
}

fn endpoint_label(req: &HttpRequest) -> String {
    // Use the matched route pattern (not raw path) to prevent
    // cardinality bombs in the metrics.
    req.match_pattern().unwrap_or_else(|| "unknown".to_string())
}

fn challenge_response<V: ProofVerifier>(
    state: &PaywallState<V>,
    amount: &str,
    description: &str,
    error: &str,
) -> HttpResponse {
    let challenge = state.issuer.issue(amount, description);
    state.challenges.record(challenge.clone());
    HttpResponse::PaymentRequired()
        .insert_header((PAYMENT_ERROR_HEADER, error))
        .json(ChallengeEnvelope::new(challenge))
}

/// Gate one request. `Ok` means the handler should run; `Err` carries
/// the response to return instead.
pub async fn require_payment<V: ProofVerifier>(
    req: &HttpRequest,
    strategy: &dyn PriceStrategy,
    state: &PaywallState<V>,
) -> Result<GateOutcome, HttpResponse> {
    let info = request_info(req);
    let endpoint = endpoint_label(req);

    let (amount, description) = match strategy.resolve(&info) {
        Ok(PriceResolution::PassThrough { reason }) => {
            REQUESTS.with_label_values(&[endpoint.as_str(), "200"]).inc();
            return Ok(GateOutcome::Free { reason });
        }
        Ok(PriceResolution::Charge {
            amount,
            description,
        }) => (amount, description),
        Err(e) => {
            tracing::error!(error = %e, "price resolution failed");
            REQUESTS.with_label_values(&[endpoint.as_str(), "500"]).inc();
            return Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "price resolution failed"
            })));
        }
    };

    let proof = req
        .headers()
        .get(PROOF_HEADER)
        .and_then(|v| v.to_str().ok());

    let proof = match proof {
        Some(p) => p,
        None => {
            REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
            return Err(challenge_response(
                state,
                &amount,
                &description,
                "payment required",
            ));
        }
    };

    let nonce = req
        .headers()
        .get(NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    // The proof must refer to a challenge this paywall actually issued
    // and which has not yet expired.
    let challenge = match state.challenges.get(nonce) {
        Some(c) if !c.is_expired(tollgate::now_secs()) => c,
        Some(_) => {
            PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
            REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
            tracing::warn!(nonce = %nonce, "proof presented for expired challenge");
            return Err(challenge_response(
                state,
                &amount,
                &description,
                "invalid payment: challenge expired",
            ));
        }
        None => {
            PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
            REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
            return Err(challenge_response(
                state,
                &amount,
                &description,
                "invalid payment: unknown challenge",
            ));
        }
    };

    // The quoted challenge must match the price resolved for THIS
    // request. Without this check a proof for a cheap challenge
    // satisfies an expensive route (or a re-priced dynamic request).
    if challenge.amount != amount {
        PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
        REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
        tracing::warn!(
            nonce = %nonce,
            quoted = %challenge.amount,
            resolved = %amount,
            "proof presented for a differently priced challenge"
        );
        return Err(challenge_response(
            state,
            &amount,
            &description,
            "invalid payment: amount mismatch",
        ));
    }

    // Replay fast path: the proof that settled this challenge keeps
    // working until expiry, so clients can reuse cached receipts
    // without re-verifying.
    if state.challenges.settled_proof(nonce).as_deref() == Some(proof) {
        PAYMENT_ATTEMPTS.with_label_values(&["replay"]).inc();
        REQUESTS.with_label_values(&[endpoint.as_str(), "200"]).inc();
        return Ok(GateOutcome::Paid(VerifiedPayment {
            amount: challenge.amount,
            nonce: nonce.to_string(),
            proof: proof.to_string(),
        }));
    }

    match state.verifier.verify(proof, &challenge).await {
        Ok(true) => match state.challenges.try_settle(nonce, proof) {
            Settlement::First | Settlement::Replay => {
                PAYMENT_ATTEMPTS.with_label_values(&["success"]).inc();
                REQUESTS.with_label_values(&[endpoint.as_str(), "200"]).inc();
                Ok(GateOutcome::Paid(VerifiedPayment {
                    amount: challenge.amount,
                    nonce: nonce.to_string(),
                    proof: proof.to_string(),
                }))
            }
            Settlement::Rejected => {
                // A different proof already settled this challenge
                PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
                REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
                Err(challenge_response(
                    state,
                    &amount,
                    &description,
                    "invalid payment: challenge already settled",
                ))
            }
        },
        Ok(false) => {
            PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
            REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
            tracing::warn!(nonce = %nonce, "payment proof rejected");
            Err(challenge_response(
                state,
                &amount,
                &description,
                "invalid payment",
            ))
        }
        Err(e) => {
            // Verifier unavailability is the server's fault; a 402 here
            // would tell the caller to pay again for our outage.
            PAYMENT_ATTEMPTS.with_label_values(&["error"]).inc();
            REQUESTS.with_label_values(&[endpoint.as_str(), "500"]).inc();
            tracing::error!(error = %e, "proof verification failed");
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "payment verification failed"
            })))
        }
    }
}
