//! Transparent 402 handling for reqwest clients.
//!
//! [`TollgatePayments`] is a `reqwest-middleware` layer: when a request comes
//! back `402 Payment Required` with a challenge envelope, it asks its
//! [`Payer`](tollgate::pay::Payer) for a proof and retries the request once
//! with the `X-Payment-Proof` header attached. [`Tool`] layers a declared
//! input schema and URL/body shaping on top, for agentic callers that invoke
//! endpoints as tools.
//!
//! ## Example
//!
//! ```rust,no_run
//! use reqwest_middleware::ClientBuilder;
//! use tollgate::mock::MockPayer;
//! use tollgate_reqwest::TollgatePayments;
//!
//! let client = ClientBuilder::new(reqwest::Client::new())
//!     .with(TollgatePayments::new(MockPayer::default()))
//!     .build();
//! // client.get("http://localhost:3000/weather?city=London") now pays
//! // challenges automatically.
//! ```

pub mod middleware;
pub mod tool;

pub use middleware::{PaymentRetryError, TollgatePayments};
pub use tool::{Tool, ToolDefinition, ToolError, ToolResponse};
