//! Wire types for the 402 challenge/response protocol.
//!
//! All types serialize as camelCase JSON. The payment proof travels in the
//! `X-Payment-Proof` request header as base64url-encoded JSON; the challenge
//! travels in the body of a `402 Payment Required` response wrapped in a
//! single-challenge envelope.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64url;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::price::{PriceError, validate_price};

/// Protocol version carried in challenges and proofs.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header carrying the base64url-encoded [`PaymentProof`].
pub const PAYMENT_PROOF_HEADER: &str = "X-Payment-Proof";
/// Optional client-chosen key enabling safe retries of a priced request.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Response header marking a replay served from the idempotency store.
pub const IDEMPOTENT_REPLAY_HEADER: &str = "X-Idempotent-Replay";

/// Challenge TTL used when a route's pricing does not set one.
pub const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 300;

const DEFAULT_SCHEME: &str = "exact";
const DEFAULT_NETWORK: &str = "mock";

/// A server-issued payment challenge, bound to one canonical request.
///
/// Challenges are stateless: the server stores nothing when issuing one. The
/// `request_hash` reconstructs the binding at verification time, and the
/// nonce is consumed only when a proof over it verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub version: u8,
    pub scheme: String,
    /// Decimal price string, e.g. `"0.001"`.
    pub price: String,
    /// Asset symbol, e.g. `"USDC"`.
    pub asset: String,
    pub network: String,
    /// Where the payment goes; format depends on `network`.
    pub recipient: String,
    /// One-time identifier; accepting a proof consumes it.
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the canonical request, 64 chars.
    pub request_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Challenge {
    /// Issues a fresh challenge bound to `request_hash`.
    ///
    /// The nonce is a random UUIDv4 (128 random bits), the expiry is
    /// `now + ttl` where the route's `ttl_seconds` wins over
    /// `default_ttl_seconds`.
    pub fn issue(pricing: &PricingConfig, request_hash: &str, default_ttl_seconds: u64) -> Self {
        let ttl = pricing.ttl_seconds.unwrap_or(default_ttl_seconds);
        Challenge {
            version: PROTOCOL_VERSION,
            scheme: pricing.scheme.clone(),
            price: pricing.price.clone(),
            asset: pricing.asset.clone(),
            network: pricing.network.clone(),
            recipient: pricing.recipient.clone(),
            nonce: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + TimeDelta::seconds(ttl as i64),
            request_hash: request_hash.to_string(),
            description: pricing.description.clone(),
        }
    }
}

/// Body of a `402 Payment Required` response carrying a fresh challenge.
///
/// Serialized under the `challenge` key; the `x402` wrapper is accepted as an
/// alias when parsing responses from other implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequired {
    #[serde(alias = "x402")]
    pub challenge: Challenge,
}

impl PaymentRequired {
    pub fn new(challenge: Challenge) -> Self {
        Self { challenge }
    }
}

/// Error body for payment refusals (402) and idempotency conflicts (409).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Client-supplied proof that a challenge was paid.
///
/// `nonce`, `request_hash`, and `expires_at` are copied verbatim from the
/// originating challenge. `signature` is scheme-specific: an HMAC hex digest
/// for the mock scheme, a transaction signature for the on-chain scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    pub version: u8,
    pub nonce: String,
    pub request_hash: String,
    pub payer: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

/// Failure decoding an `X-Payment-Proof` header value.
#[derive(Debug, thiserror::Error)]
pub enum ProofDecodeError {
    #[error("invalid base64url payload")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid proof json")]
    Json(#[from] serde_json::Error),
}

impl PaymentProof {
    /// Encodes the proof as a base64url `X-Payment-Proof` header value.
    pub fn to_header(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(b64url.encode(json))
    }

    /// Decodes a base64url `X-Payment-Proof` header value.
    pub fn from_header(header: &str) -> Result<Self, ProofDecodeError> {
        let bytes = b64url.decode(header.trim())?;
        let proof = serde_json::from_slice(&bytes)?;
        Ok(proof)
    }
}

/// Per-route pricing. A route is priced iff its configuration carries one of
/// these; routes without pricing are never charged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    pub price: String,
    pub asset: String,
    pub network: String,
    pub recipient: String,
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl PricingConfig {
    /// Creates pricing for a route, validating the price string up front.
    ///
    /// Malformed or negative prices are a [`ConfigError`]; they never reach
    /// challenge issuance.
    pub fn new(
        price: impl Into<String>,
        asset: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let price = price.into();
        validate_price(&price).map_err(|source| ConfigError::InvalidPrice {
            price: price.clone(),
            source,
        })?;
        Ok(Self {
            price,
            asset: asset.into(),
            network: DEFAULT_NETWORK.to_string(),
            recipient: recipient.into(),
            scheme: DEFAULT_SCHEME.to_string(),
            description: None,
            ttl_seconds: None,
        })
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }
}

/// A cached handler response bound to the request hash it was produced for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    pub request_hash: String,
    pub status_code: u16,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

/// Fatal configuration problems, raised at construction before any traffic
/// is served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid price {price:?}: {source}")]
    InvalidPrice {
        price: String,
        #[source]
        source: PriceError,
    },
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}
