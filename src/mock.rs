//! HMAC-SHA256 mock verifier and payer.
//!
//! The mock scheme signs `"{nonce}|{requestHash}"` with a shared symmetric
//! secret. It carries no amount semantics and never touches the network,
//! which makes it the scheme of choice for offline development and tests.
//! Deployments should use a 32-byte random secret.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::pay::{PayError, Payer, PaymentContext};
use crate::types::{Challenge, PaymentProof, PricingConfig};
use crate::verify::ProofVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Secret used when none is configured. Fine for tests, nothing else.
pub const DEFAULT_MOCK_SECRET: &str = "mock-secret";

const DEFAULT_PAYER_ADDRESS: &str = "mock-payer";

fn signature_hex(secret: &[u8], nonce: &str, request_hash: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(nonce.as_bytes());
    mac.update(b"|");
    mac.update(request_hash.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifier for the mock scheme.
pub struct MockVerifier {
    secret: Vec<u8>,
}

impl MockVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_SECRET.as_bytes().to_vec())
    }
}

#[async_trait]
impl ProofVerifier for MockVerifier {
    async fn verify(
        &self,
        proof_header: &str,
        request_hash: &str,
        _pricing: &PricingConfig,
    ) -> bool {
        let proof = match PaymentProof::from_header(proof_header) {
            Ok(proof) => proof,
            Err(err) => {
                tracing::debug!(error = %err, "rejected undecodable payment proof");
                return false;
            }
        };
        if proof.request_hash != request_hash {
            tracing::debug!("rejected proof bound to a different request");
            return false;
        }
        if proof.expires_at <= Utc::now() {
            tracing::debug!("rejected expired proof");
            return false;
        }
        let expected = signature_hex(&self.secret, &proof.nonce, &proof.request_hash);
        // Length mismatch fails fast; equal lengths compare in constant time.
        if expected.len() != proof.signature.len() {
            return false;
        }
        expected
            .as_bytes()
            .ct_eq(proof.signature.as_bytes())
            .into()
    }
}

/// Payer for the mock scheme.
pub struct MockPayer {
    secret: Vec<u8>,
    payer_address: String,
}

impl MockPayer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            payer_address: DEFAULT_PAYER_ADDRESS.to_string(),
        }
    }

    pub fn with_payer_address(mut self, payer_address: impl Into<String>) -> Self {
        self.payer_address = payer_address.into();
        self
    }
}

impl Default for MockPayer {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_SECRET.as_bytes().to_vec())
    }
}

#[async_trait]
impl Payer for MockPayer {
    async fn pay(
        &self,
        challenge: &Challenge,
        _ctx: &PaymentContext,
    ) -> Result<PaymentProof, PayError> {
        Ok(PaymentProof {
            version: challenge.version,
            nonce: challenge.nonce.clone(),
            request_hash: challenge.request_hash.clone(),
            payer: self.payer_address.clone(),
            timestamp: Utc::now(),
            expires_at: challenge.expires_at,
            signature: signature_hex(&self.secret, &challenge.nonce, &challenge.request_hash),
        })
    }
}
