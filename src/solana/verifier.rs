//! On-chain payment verification.
//!
//! A proof's `signature` field names a ledger transaction. The transaction
//! settles the challenge iff it carries both a matching `transferChecked`
//! to the recipient's USDC associated token account and a memo equal to
//! `"{nonce}|{requestHash}"`, and it confirmed inside the challenge window.

use async_trait::async_trait;
use chrono::Utc;
use solana_commitment_config::CommitmentConfig;
use solana_pubkey::Pubkey;
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, ParsedInstruction,
    UiInstruction, UiMessage, UiParsedInstruction,
};
use std::str::FromStr;

use crate::price::price_to_base_units;
use crate::types::{PROTOCOL_VERSION, PaymentProof, PricingConfig};
use crate::verify::ProofVerifier;

use super::rpc::{RpcTransactionFetcher, TransactionFetcher};
use super::{
    DEFAULT_MAX_TRANSACTION_AGE_SECONDS, DEFAULT_RPC_URL, USDC_DECIMALS, USDC_DEVNET_MINT,
    associated_token_address, challenge_memo,
};

/// Verifier that checks proofs against settled ledger transactions.
pub struct SolanaVerifier<F = RpcTransactionFetcher> {
    fetcher: F,
    amount_tolerance: u64,
    max_transaction_age_seconds: i64,
}

impl SolanaVerifier<RpcTransactionFetcher> {
    /// Creates a verifier against the given RPC endpoint at `confirmed`
    /// commitment.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self::with_commitment(rpc_url, CommitmentConfig::confirmed())
    }

    /// Creates a verifier against the default devnet RPC endpoint.
    pub fn devnet() -> Self {
        Self::new(DEFAULT_RPC_URL)
    }

    pub fn with_commitment(rpc_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self::with_fetcher(RpcTransactionFetcher::new(rpc_url, commitment))
    }
}

impl<F> SolanaVerifier<F> {
    /// Creates a verifier over an arbitrary [`TransactionFetcher`].
    pub fn with_fetcher(fetcher: F) -> Self {
        Self {
            fetcher,
            amount_tolerance: 0,
            max_transaction_age_seconds: DEFAULT_MAX_TRANSACTION_AGE_SECONDS,
        }
    }

    /// Accepts transfers short of the expected amount by up to `tolerance`
    /// base units.
    pub fn with_amount_tolerance(mut self, tolerance: u64) -> Self {
        self.amount_tolerance = tolerance;
        self
    }

    pub fn with_max_transaction_age(mut self, seconds: i64) -> Self {
        self.max_transaction_age_seconds = seconds;
        self
    }
}

#[async_trait]
impl<F: TransactionFetcher> ProofVerifier for SolanaVerifier<F> {
    async fn verify(
        &self,
        proof_header: &str,
        request_hash: &str,
        pricing: &PricingConfig,
    ) -> bool {
        let proof = match PaymentProof::from_header(proof_header) {
            Ok(proof) => proof,
            Err(err) => {
                tracing::debug!(error = %err, "rejected undecodable payment proof");
                return false;
            }
        };
        if proof.version != PROTOCOL_VERSION {
            tracing::debug!(version = proof.version, "rejected unknown proof version");
            return false;
        }
        if proof.request_hash != request_hash {
            tracing::debug!("rejected proof bound to a different request");
            return false;
        }
        let now = Utc::now();
        if proof.expires_at <= now {
            tracing::debug!("rejected expired proof");
            return false;
        }

        let transaction = match self.fetcher.fetch_parsed(&proof.signature).await {
            Ok(Some(transaction)) => transaction,
            Ok(None) => {
                tracing::debug!(signature = %proof.signature, "transaction not found");
                return false;
            }
            Err(err) => {
                tracing::debug!(error = %err, "transaction fetch failed");
                return false;
            }
        };

        let expected_amount = match price_to_base_units(&pricing.price, USDC_DECIMALS) {
            Ok(amount) => amount,
            Err(err) => {
                tracing::debug!(error = %err, price = %pricing.price, "unusable route price");
                return false;
            }
        };
        let recipient = match Pubkey::from_str(&pricing.recipient) {
            Ok(recipient) => recipient,
            Err(_) => {
                tracing::debug!(recipient = %pricing.recipient, "unusable recipient address");
                return false;
            }
        };

        let token_program = spl_token::ID.to_string();
        let memo_program = super::MEMO_PROGRAM_PUBKEY.to_string();
        let mint = USDC_DEVNET_MINT.to_string();
        let destination = associated_token_address(&recipient, &USDC_DEVNET_MINT).to_string();
        let memo = challenge_memo(&proof.nonce, &proof.request_hash);
        let min_amount = expected_amount.saturating_sub(self.amount_tolerance);

        let Some(instructions) = parsed_instructions(&transaction) else {
            tracing::debug!("transaction is not in jsonParsed form");
            return false;
        };
        let transfer_ok = instructions
            .iter()
            .any(|ix| is_matching_transfer(ix, &token_program, &mint, &destination, min_amount));
        let memo_ok = instructions
            .iter()
            .any(|ix| ix.program_id == memo_program && ix.parsed.as_str() == Some(memo.as_str()));
        if !transfer_ok {
            tracing::debug!("no matching transferChecked instruction");
            return false;
        }
        if !memo_ok {
            tracing::debug!("no matching challenge memo instruction");
            return false;
        }

        let Some(block_time) = transaction.block_time else {
            tracing::debug!("transaction has no block time");
            return false;
        };
        if block_time > proof.expires_at.timestamp() {
            tracing::debug!(block_time, "transaction confirmed after the challenge window");
            return false;
        }
        if block_time < now.timestamp() - self.max_transaction_age_seconds {
            tracing::debug!(block_time, "transaction too old");
            return false;
        }

        true
    }
}

fn parsed_instructions(
    transaction: &EncodedConfirmedTransactionWithStatusMeta,
) -> Option<Vec<&ParsedInstruction>> {
    let EncodedTransaction::Json(ui_transaction) = &transaction.transaction.transaction else {
        return None;
    };
    let UiMessage::Parsed(message) = &ui_transaction.message else {
        return None;
    };
    Some(
        message
            .instructions
            .iter()
            .filter_map(|instruction| match instruction {
                UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) => Some(parsed),
                _ => None,
            })
            .collect(),
    )
}

fn is_matching_transfer(
    instruction: &ParsedInstruction,
    token_program: &str,
    mint: &str,
    destination: &str,
    min_amount: u64,
) -> bool {
    if instruction.program_id != token_program {
        return false;
    }
    if instruction.parsed.get("type").and_then(|v| v.as_str()) != Some("transferChecked") {
        return false;
    }
    let Some(info) = instruction.parsed.get("info") else {
        return false;
    };
    if info.get("mint").and_then(|v| v.as_str()) != Some(mint) {
        return false;
    }
    if info.get("destination").and_then(|v| v.as_str()) != Some(destination) {
        return false;
    }
    let amount = info
        .get("tokenAmount")
        .and_then(|token_amount| token_amount.get("amount"))
        .and_then(|v| v.as_str())
        .and_then(|raw| raw.parse::<u64>().ok());
    matches!(amount, Some(amount) if amount >= min_amount)
}
