//! Tollgate gates HTTP tool endpoints behind per-request micropayments using
//! an HTTP 402 challenge/response protocol.
//!
//! A server issues a cryptographically bound challenge for a priced route, the
//! client obtains proof-of-payment, and the server verifies the proof before
//! serving the response. Two verifier/payer pairs ship with the crate: an
//! HMAC-SHA256 mock for offline use and an on-chain pair that settles SPL
//! token transfers on a Solana-compatible ledger, bound to the challenge via
//! an on-chain memo.
//!
//! This crate is the core: wire types, the canonical request hasher, the
//! nonce and idempotency stores, and the verifier/payer capabilities. The
//! HTTP-facing halves live in the companion crates:
//!
//! - `tollgate-axum`: the payment-gate middleware for axum routes
//! - `tollgate-reqwest`: the paying client and tool facade
//!
//! ## Flow
//!
//! ```text
//! client                      server
//!   | GET /weather             |
//!   |------------------------->| no proof -> 402 { challenge }
//!   |<-------------------------|
//!   | pay(challenge)           |
//!   | GET /weather             |
//!   |  X-Payment-Proof: ...    |
//!   |------------------------->| verify -> reserve nonce -> handler
//!   |<-------------------------| 200
//! ```

pub mod idempotency;
pub mod mock;
pub mod nonce;
pub mod pay;
pub mod price;
pub mod request_hash;
pub mod solana;
pub mod types;
pub mod verify;

pub use pay::{PayError, Payer, PaymentContext};
pub use types::{Challenge, ConfigError, PaymentProof, PricingConfig, StoredResponse};
pub use verify::ProofVerifier;
