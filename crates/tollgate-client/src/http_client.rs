//! The payment-aware request wrapper.
//!
//! Per-request state machine:
//!
//! 1. Fresh receipt cached for this request signature → reuse its proof.
//! 2. Plain request; non-402 responses are returned as-is.
//! 3. Parse the 402 body into a challenge (malformed ⇒ protocol error,
//!    expired ⇒ expired error, neither is retried).
//! 4. Ceiling, confirmation hook, and policy gate must all clear, in
//!    that order, before any money moves.
//! 5. Pay via the executor, record the spending, derive the proof,
//!    cache the receipt.
//! 6. Retry the original request once with the proof attached. A second
//!    402 comes back to the caller as-is; the client never loops on
//!    repeated 402s.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use tollgate::{
    derive_proof, now_secs, parse_amount, parse_challenge, PaymentChallenge, TollgateError,
    NONCE_HEADER, PROOF_HEADER,
};
use tollgate_policy::{PolicyGate, TrustOracle};

use crate::config::ClientConfig;
use crate::executor::PaymentExecutor;
use crate::receipt::{PaymentReceipt, ReceiptCache};

type ConfirmHook = Box<dyn Fn(&PaymentChallenge) -> bool + Send + Sync>;
type ErrorHook = Box<dyn Fn(&str, &TollgateError) + Send + Sync>;

/// HTTP client that pays payment-required challenges automatically,
/// inside the guardrails of its policy gate and autopay ceiling.
pub struct PayingClient<E: PaymentExecutor, O: TrustOracle> {
    http: reqwest::Client,
    executor: E,
    policy: PolicyGate<O>,
    config: ClientConfig,
    receipts: ReceiptCache,
    // Serializes payment attempts per request signature: two tasks
    // racing on the same uncached key must not both pay.
    payment_locks: DashMap<String, Arc<Mutex<()>>>,
    confirm: Option<ConfirmHook>,
    on_error: Option<ErrorHook>,
}

impl<E: PaymentExecutor, O: TrustOracle> PayingClient<E, O> {
    pub fn new(executor: E, policy: PolicyGate<O>, config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("failed to build HTTP client"),
            executor,
            policy,
            config,
            receipts: ReceiptCache::new(),
            payment_locks: DashMap::new(),
            confirm: None,
            on_error: None,
        }
    }

    /// Create a client with a custom `reqwest::Client`.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Install a confirmation hook. When present it must approve every
    /// payment before the executor is invoked.
    pub fn with_confirmation(mut self, hook: impl Fn(&PaymentChallenge) -> bool + Send + Sync + 'static) -> Self {
        self.confirm = Some(Box::new(hook));
        self
    }

    /// Install an error hook, invoked with the target URL before any
    /// error propagates to the caller.
    pub fn with_error_hook(mut self, hook: impl Fn(&str, &TollgateError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn receipts(&self) -> &ReceiptCache {
        &self.receipts
    }

    pub fn policy(&self) -> &PolicyGate<O> {
        &self.policy
    }

    /// Make a request, paying a payment-required challenge if one comes
    /// back and policy allows it.
    pub async fn fetch(
        &self,
        url: &str,
        method: reqwest::Method,
    ) -> Result<reqwest::Response, TollgateError> {
        self.fetch_with_body(url, method, None).await
    }

    /// Make a request with an optional body.
    pub async fn fetch_with_body(
        &self,
        url: &str,
        method: reqwest::Method,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, TollgateError> {
        match self.try_fetch(url, method, body).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                if let Some(hook) = &self.on_error {
                    hook(url, &e);
                }
                Err(e)
            }
        }
    }

    async fn try_fetch(
        &self,
        url: &str,
        method: reqwest::Method,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, TollgateError> {
        let key = format!("{method} {url}");

        if let Some(receipt) = self.receipts.get_fresh(&key) {
            tracing::debug!(key = %key, "reusing cached payment receipt");
            return self
                .send_with_proof(url, method, body, &receipt.challenge.nonce, &receipt.proof)
                .await;
        }

        // First request, unmodified
        let mut req = self.http.request(method.clone(), url);
        if let Some(ref b) = body {
            req = req.body(b.clone());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| TollgateError::HttpError(format!("request failed: {e}")))?;

        if resp.status().as_u16() != 402 {
            return Ok(resp);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TollgateError::HttpError(format!("failed to read 402 body: {e}")))?;
        let challenge = parse_challenge(402, &bytes)?;
        challenge.ensure_fresh(now_secs())?;

        let lock = self
            .payment_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        // Another task may have paid while we waited on the lock
        let receipt = match self.receipts.get_fresh(&key) {
            Some(r) => Ok(r),
            None => self.authorize_and_pay(&key, &challenge).await,
        };

        // Forget the key once the attempt resolves. Tasks that already
        // cloned the Arc still serialize on it; removal only stops the
        // map from growing one entry per signature ever paid.
        drop(guard);
        self.payment_locks.remove(&key);
        self.receipts.purge_expired();
        let receipt = receipt?;

        self.send_with_proof(url, method, body, &receipt.challenge.nonce, &receipt.proof)
            .await
    }

    /// Number of request signatures with a payment attempt in flight.
    pub fn pending_payments(&self) -> usize {
        self.payment_locks.len()
    }

    /// Steps 4–5: guardrails, then money. Only a fully allowed decision
    /// reaches the executor, and only a confirmed execution is recorded.
    async fn authorize_and_pay(
        &self,
        key: &str,
        challenge: &PaymentChallenge,
    ) -> Result<PaymentReceipt, TollgateError> {
        let amount = parse_amount(&challenge.amount, self.config.asset_decimals)?;

        if amount > self.config.max_autopay {
            return Err(TollgateError::PolicyDenied(format!(
                "challenge amount {} exceeds autopay ceiling {}",
                challenge.amount,
                tollgate::format_amount(self.config.max_autopay, self.config.asset_decimals),
            )));
        }

        match &self.confirm {
            Some(hook) => {
                if !hook(challenge) {
                    return Err(TollgateError::PolicyDenied(
                        "payment declined by confirmation hook".to_string(),
                    ));
                }
            }
            None if self.config.require_confirmation => {
                return Err(TollgateError::ConfigError(
                    "confirmation required but no confirmation hook installed".to_string(),
                ));
            }
            None => {}
        }

        let decision = self
            .policy
            .authorize(&challenge.receiver, amount)
            .await
            .map_err(|e| TollgateError::StoreError(format!("policy evaluation failed: {e}")))?;
        if !decision.allowed {
            return Err(TollgateError::PolicyDenied(
                decision
                    .reason
                    .unwrap_or_else(|| "denied by policy".to_string()),
            ));
        }

        let outcome = self
            .executor
            .pay(&challenge.receiver, &challenge.amount, &challenge.network)
            .await?;

        tracing::info!(
            receiver = %challenge.receiver,
            amount = %challenge.amount,
            execution_id = %outcome.execution_id,
            "payment executed"
        );

        // Record as soon as the executor confirms, to keep the
        // decide/execute gap small. The payment already happened, so a
        // ledger write failure is logged, not raised.
        if let Err(e) =
            self.policy
                .record_spending(&challenge.receiver, amount, &outcome.execution_id)
        {
            tracing::error!(error = %e, "failed to record completed payment in ledger");
        }
        // Same policy for pruning: maintenance must not fail a payment
        // that already went through.
        if let Err(e) = self.policy.prune_history() {
            tracing::warn!(error = %e, "failed to prune spending history");
        }

        let proof = derive_proof(challenge, &outcome.execution_id);
        let expires = match self.config.receipt_lifetime_secs {
            Some(cap) => challenge.expires.min(now_secs().saturating_add(cap)),
            None => challenge.expires,
        };
        let receipt = PaymentReceipt {
            request_key: key.to_string(),
            challenge: challenge.clone(),
            execution_id: outcome.execution_id,
            proof,
            paid_at: now_secs(),
            expires,
        };
        self.receipts.insert(receipt.clone());
        Ok(receipt)
    }

    /// Step 6: replay the original request with the proof attached.
    /// Whatever comes back, including another 402, is the caller's to
    /// handle; there is exactly one automatic retry.
    async fn send_with_proof(
        &self,
        url: &str,
        method: reqwest::Method,
        body: Option<Vec<u8>>,
        nonce: &str,
        proof: &str,
    ) -> Result<reqwest::Response, TollgateError> {
        let mut req = self
            .http
            .request(method, url)
            .header(PROOF_HEADER, proof)
            .header(NONCE_HEADER, nonce);
        if let Some(b) = body {
            req = req.body(b);
        }
        req.send()
            .await
            .map_err(|e| TollgateError::HttpError(format!("paid request failed: {e}")))
    }
}
