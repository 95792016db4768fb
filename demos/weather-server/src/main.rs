//! Priced weather API.
//!
//! `GET /weather?city=London` costs 0.001 USDC per request. `PAYMENT_MODE`
//! selects the scheme:
//!
//! - `mock` (default): HMAC proofs under `MOCK_SECRET`
//! - `solana`: on-chain proofs verified against `SOLANA_RPC_URL`, paid to
//!   `RECIPIENT_WALLET`
//!
//! `HOST` and `PORT` control the bind address.

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use dotenvy::dotenv;
use serde::Deserialize;
use serde_json::{Value, json};
use std::env;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use tollgate::mock::{DEFAULT_MOCK_SECRET, MockVerifier};
use tollgate::solana::SolanaVerifier;
use tollgate::types::PricingConfig;
use tollgate_axum::Tollgate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing();

    let mode = env::var("PAYMENT_MODE").unwrap_or_else(|_| "mock".to_string());
    let recipient = env::var("RECIPIENT_WALLET").unwrap_or_else(|_| "mock-recipient".to_string());

    let (tollgate, network) = match mode.as_str() {
        "solana" => {
            let rpc_url = env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| tollgate::solana::DEFAULT_RPC_URL.to_string());
            (Tollgate::new(SolanaVerifier::new(rpc_url)), "solana-devnet")
        }
        _ => {
            let secret =
                env::var("MOCK_SECRET").unwrap_or_else(|_| DEFAULT_MOCK_SECRET.to_string());
            (Tollgate::new(MockVerifier::new(secret.into_bytes())), "mock")
        }
    };
    tracing::info!(mode, network, "payment gate ready");

    let pricing = PricingConfig::new("0.001", "USDC", recipient)?
        .with_network(network)
        .with_description("Current weather for a city");

    let app = Router::new()
        .route("/weather", get(weather).layer(tollgate.with_pricing(pricing)))
        .route("/health", get(|| async { "ok" }));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("Starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[derive(Deserialize)]
struct WeatherQuery {
    city: String,
}

async fn weather(Query(query): Query<WeatherQuery>) -> Json<Value> {
    Json(json!({
        "city": query.city,
        "temp": 15,
        "condition": "Cloudy",
        "humidity": 72,
        "unit": "celsius",
    }))
}
