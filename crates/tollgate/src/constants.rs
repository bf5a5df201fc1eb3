/// Protocol version carried in every challenge.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request header carrying the opaque payment proof on the paid retry.
pub const PROOF_HEADER: &str = "PAYMENT-PROOF";

/// Request header carrying the nonce of the challenge the proof satisfies.
pub const NONCE_HEADER: &str = "PAYMENT-NONCE";

/// Default challenge lifetime in seconds.
pub const DEFAULT_CHALLENGE_LIFETIME_SECS: u64 = 300;

/// Default smallest-unit decimal places for amounts ("0.10" ⇒ 100000).
pub const DEFAULT_ASSET_DECIMALS: u32 = 6;

/// Default network identifier used when none is configured.
pub const DEFAULT_NETWORK: &str = "base-sepolia";

/// Default asset identifier used when none is configured.
pub const DEFAULT_ASSET: &str = "usdc";
