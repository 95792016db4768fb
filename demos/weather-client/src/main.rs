//! Paying client for the weather demo.
//!
//! Invokes `GET /weather` as a declared tool, transparently paying the 402
//! challenge. `PAYMENT_MODE` selects the scheme:
//!
//! - `mock` (default): HMAC proofs under `MOCK_SECRET`
//! - `solana`: real SPL transfers signed with `SOLANA_PRIVATE_KEY`,
//!   submitted to `SOLANA_RPC_URL`

use dotenvy::dotenv;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::env;
use tracing_subscriber::EnvFilter;

use tollgate::mock::{DEFAULT_MOCK_SECRET, MockPayer};
use tollgate::solana::{SolanaPayer, SolanaPayerConfig};
use tollgate_reqwest::{Tool, ToolDefinition, TollgatePayments};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = env::var("PAYMENT_MODE").unwrap_or_else(|_| "mock".to_string());
    let payments = match mode.as_str() {
        "solana" => {
            let private_key = env::var("SOLANA_PRIVATE_KEY")
                .map_err(|_| "SOLANA_PRIVATE_KEY is required when PAYMENT_MODE=solana")?;
            let payer = SolanaPayer::new(SolanaPayerConfig {
                private_key,
                rpc_url: env::var("SOLANA_RPC_URL").ok(),
                commitment: None,
            })?;
            tracing::info!(payer = %payer.pubkey(), "paying with on-chain USDC transfers");
            TollgatePayments::new(payer)
        }
        _ => {
            let secret =
                env::var("MOCK_SECRET").unwrap_or_else(|_| DEFAULT_MOCK_SECRET.to_string());
            TollgatePayments::new(MockPayer::new(secret.into_bytes()))
        }
    };

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(payments)
        .build();

    let base = env::var("SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let weather = Tool::new(
        ToolDefinition {
            name: "get_weather".to_string(),
            description: "Current weather for a city".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["city"],
                "properties": { "city": { "type": "string" } },
            }),
            endpoint: format!("{base}/weather"),
            method: http::Method::GET,
            headers: Vec::new(),
        },
        client,
    );

    let result = weather.invoke(json!({ "city": "London" })).await?;
    tracing::info!(status = result.status, ok = result.ok, "tool call finished");
    println!("{}", serde_json::to_string_pretty(&result.data)?);
    Ok(())
}
