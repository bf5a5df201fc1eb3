//! Payment executor seam.
//!
//! Wallet custody, key management, and transaction construction live
//! behind this trait. The client only needs a confirmed execution
//! reference back; executor failures propagate unmodified and never
//! create a spending record.

use tollgate::TollgateError;

/// A confirmed payment execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Transaction reference from the underlying payment rail.
    pub execution_id: String,
}

/// Executes a payment that policy has already approved.
pub trait PaymentExecutor: Send + Sync {
    /// Pay `amount` (decimal string) to `receiver` on `network`.
    fn pay(
        &self,
        receiver: &str,
        amount: &str,
        network: &str,
    ) -> impl std::future::Future<Output = Result<PaymentOutcome, TollgateError>> + Send;
}
