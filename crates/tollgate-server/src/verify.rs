//! Proof verification.
//!
//! The paywall never interprets a proof itself; it hands the opaque
//! token plus the quoted challenge to a [`ProofVerifier`], either a
//! pluggable local implementation or a remote facilitator reached over
//! HTTP.

use serde::{Deserialize, Serialize};

use tollgate::{PaymentChallenge, TollgateError};

/// Verifies an opaque proof against the challenge it claims to satisfy.
///
/// `Ok(false)` means the payment did not validate (caller's fault, 402).
/// `Err` means verification itself failed (server's fault, 5xx). Keep
/// the two apart; conflating them turns infrastructure failures into
/// "please pay again".
pub trait ProofVerifier: Send + Sync {
    fn verify(
        &self,
        proof: &str,
        challenge: &PaymentChallenge,
    ) -> impl std::future::Future<Output = Result<bool, TollgateError>> + Send;
}

/// Adapter for a synchronous verification function. The usual local
/// implementation re-derives the expected proof from the challenge and
/// a known execution id.
pub struct FnVerifier<F>(F);

impl<F> FnVerifier<F>
where
    F: Fn(&str, &PaymentChallenge) -> bool + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProofVerifier for FnVerifier<F>
where
    F: Fn(&str, &PaymentChallenge) -> bool + Send + Sync,
{
    async fn verify(
        &self,
        proof: &str,
        challenge: &PaymentChallenge,
    ) -> Result<bool, TollgateError> {
        Ok((self.0)(proof, challenge))
    }
}

/// Request body for the facilitator's `/verify` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    proof: &'a str,
    amount: &'a str,
    network: &'a str,
    receiver: &'a str,
    nonce: &'a str,
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    is_valid: bool,
    #[serde(default)]
    invalid_reason: Option<String>,
}

/// Remote verification via a facilitator's `/verify` endpoint.
pub struct RemoteVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteVerifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ProofVerifier for RemoteVerifier {
    async fn verify(
        &self,
        proof: &str,
        challenge: &PaymentChallenge,
    ) -> Result<bool, TollgateError> {
        let url = format!("{}/verify", self.base_url);
        let body = VerifyRequest {
            proof,
            amount: &challenge.amount,
            network: &challenge.network,
            receiver: &challenge.receiver,
            nonce: &challenge.nonce,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| TollgateError::HttpError(format!("facilitator request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(TollgateError::HttpError(format!(
                "facilitator returned {}",
                resp.status()
            )));
        }

        let verdict: VerifyResponse = resp.json().await.map_err(|e| {
            TollgateError::HttpError(format!("facilitator response parse failed: {e}"))
        })?;

        if !verdict.is_valid {
            tracing::warn!(
                nonce = %challenge.nonce,
                reason = verdict.invalid_reason.as_deref().unwrap_or("unknown"),
                "facilitator rejected payment proof"
            );
        }
        Ok(verdict.is_valid)
    }
}
