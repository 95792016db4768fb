//! Axum middleware that gates routes behind per-request micropayments.
//!
//! Attach a [`Tollgate`] layer with pricing to any route that should be
//! charged. Requests without a valid `X-Payment-Proof` header receive a
//! `402 Payment Required` challenge bound to the exact request; requests
//! with a verified proof run the handler once, with replay protection and
//! optional idempotent response caching.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Json, Router, routing::get};
//! use serde_json::json;
//! use tollgate::mock::MockVerifier;
//! use tollgate::types::PricingConfig;
//! use tollgate_axum::Tollgate;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let runtime = tokio::runtime::Runtime::new()?;
//! # runtime.block_on(async {
//! let tollgate = Tollgate::new(MockVerifier::default());
//! let pricing = PricingConfig::new("0.001", "USDC", "recipient-wallet")?;
//!
//! let app: Router = Router::new().route(
//!     "/weather",
//!     get(weather).layer(tollgate.with_pricing(pricing)),
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok(())
//! # }
//!
//! async fn weather() -> Json<serde_json::Value> {
//!     Json(json!({ "temp": 15 }))
//! }
//! ```
//!
//! Routes without pricing are passed through untouched and are never
//! charged.

pub mod gate;
pub mod layer;

pub use gate::GateRejection;
pub use layer::{DEFAULT_MAX_BODY_BYTES, Tollgate, TollgateService};
