//! Client-side payment capability.

use async_trait::async_trait;

use crate::price::PriceError;
use crate::types::{Challenge, PaymentProof};

/// Request context handed to a payer alongside the challenge.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub url: String,
    pub method: String,
}

/// Failures producing a payment proof.
///
/// These surface to the caller of the paying client as regular errors; the
/// retry loop never swallows them.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// The payer wallet has no token account for the challenge asset. The
    /// account is never auto-created.
    #[error("Payer has no {0} token account")]
    PayerMissingTokenAccount(String),
    /// The recipient has no token account for the challenge asset. Creating
    /// it would shift funding burden and trust onto the payer, so this is
    /// always an error.
    #[error("Recipient has no {0} token account")]
    RecipientMissingTokenAccount(String),
    #[error("invalid challenge price: {0}")]
    InvalidPrice(#[from] PriceError),
    #[error("invalid recipient address {0:?}")]
    InvalidRecipient(String),
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("failed to sign payment transaction: {0}")]
    Signing(String),
}

/// Produces a [`PaymentProof`] for a server-issued [`Challenge`].
///
/// Implementations copy `nonce`, `request_hash`, `expires_at`, and `version`
/// verbatim from the challenge and fill `signature` with their
/// scheme-specific evidence.
#[async_trait]
pub trait Payer: Send + Sync {
    async fn pay(&self, challenge: &Challenge, ctx: &PaymentContext)
    -> Result<PaymentProof, PayError>;
}
