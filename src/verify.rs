//! Server-side proof verification capability.

use async_trait::async_trait;

use crate::types::PricingConfig;

/// Validates an `X-Payment-Proof` header against the request it claims to
/// pay for.
///
/// Implementations are selected at middleware construction; the gate holds
/// exactly one. Every failure mode (malformed header, bad signature, hash
/// mismatch, expiry, missing transaction) collapses to `false`, so that a
/// rejection never discloses which check failed. Reasons belong in logs, not
/// responses.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(&self, proof_header: &str, request_hash: &str, pricing: &PricingConfig)
    -> bool;
}
