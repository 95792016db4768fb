//! RPC seam for the on-chain verifier.
//!
//! The verifier talks to the ledger through [`TransactionFetcher`], so its
//! decision logic can be exercised against canned transactions while the
//! production implementation wraps the nonblocking RPC client.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_signature::Signature;
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding,
};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum RpcFetchError {
    #[error("invalid transaction signature {0:?}")]
    InvalidSignature(String),
    #[error("rpc request failed: {0}")]
    Rpc(String),
}

/// Fetches a parsed transaction by signature.
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// Returns the parsed transaction, or `None` when the ledger does not
    /// know the signature at the configured commitment.
    async fn fetch_parsed(
        &self,
        signature: &str,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>, RpcFetchError>;
}

/// Production fetcher over the nonblocking RPC client, requesting
/// `jsonParsed` encoding.
pub struct RpcTransactionFetcher {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcTransactionFetcher {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new(rpc_url.into()),
            commitment,
        }
    }
}

#[async_trait]
impl TransactionFetcher for RpcTransactionFetcher {
    async fn fetch_parsed(
        &self,
        signature: &str,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>, RpcFetchError> {
        let signature = Signature::from_str(signature)
            .map_err(|_| RpcFetchError::InvalidSignature(signature.to_string()))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        match self.client.get_transaction_with_config(&signature, config).await {
            Ok(transaction) => Ok(Some(transaction)),
            Err(err) => {
                // The RPC reports an unknown signature as an error; either
                // way the transaction is not available for verification.
                tracing::debug!(%signature, error = %err, "getTransaction failed");
                Ok(None)
            }
        }
    }
}
