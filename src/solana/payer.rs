//! On-chain payer: builds, signs, and submits the settlement transaction.

use async_trait::async_trait;
use chrono::Utc;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_message::VersionedMessage;
use solana_message::v0::Message as MessageV0;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use std::str::FromStr;

use crate::pay::{PayError, Payer, PaymentContext};
use crate::price::price_to_base_units;
use crate::types::{Challenge, ConfigError, PaymentProof};

use super::{
    DEFAULT_RPC_URL, MEMO_PROGRAM_PUBKEY, USDC_DECIMALS, USDC_DEVNET_MINT,
    associated_token_address, challenge_memo,
};

/// Configuration for [`SolanaPayer`]. Only the private key is required.
pub struct SolanaPayerConfig {
    /// Either a base58-encoded secret key or a JSON byte array (the two
    /// common wallet export formats); a leading `[` selects the latter.
    pub private_key: String,
    pub rpc_url: Option<String>,
    pub commitment: Option<CommitmentConfig>,
}

/// Payer that settles challenges with an SPL `transferChecked` plus a
/// challenge-binding memo, then waits for the configured commitment.
pub struct SolanaPayer {
    keypair: Keypair,
    rpc: RpcClient,
}

impl SolanaPayer {
    pub fn new(config: SolanaPayerConfig) -> Result<Self, ConfigError> {
        let keypair = parse_private_key(&config.private_key)?;
        let rpc_url = config
            .rpc_url
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let commitment = config.commitment.unwrap_or_else(CommitmentConfig::confirmed);
        Ok(Self {
            keypair,
            rpc: RpcClient::new_with_commitment(rpc_url, commitment),
        })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

fn parse_private_key(raw: &str) -> Result<Keypair, ConfigError> {
    let raw = raw.trim();
    let bytes = if raw.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(raw)
            .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?
    } else {
        bs58::decode(raw)
            .into_vec()
            .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?
    };
    Keypair::try_from(bytes.as_slice())
        .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))
}

#[async_trait]
impl Payer for SolanaPayer {
    async fn pay(
        &self,
        challenge: &Challenge,
        _ctx: &PaymentContext,
    ) -> Result<PaymentProof, PayError> {
        let amount = price_to_base_units(&challenge.price, USDC_DECIMALS)?;
        let recipient = Pubkey::from_str(&challenge.recipient)
            .map_err(|_| PayError::InvalidRecipient(challenge.recipient.clone()))?;
        let sender = self.keypair.pubkey();
        let source_ata = associated_token_address(&sender, &USDC_DEVNET_MINT);
        let destination_ata = associated_token_address(&recipient, &USDC_DEVNET_MINT);

        // Both token accounts must already exist; the payer never creates
        // the recipient's account.
        let accounts = self
            .rpc
            .get_multiple_accounts(&[source_ata, destination_ata])
            .await
            .map_err(|err| PayError::Rpc(err.to_string()))?;
        if accounts.first().cloned().is_none_or(|a| a.is_none()) {
            return Err(PayError::PayerMissingTokenAccount(challenge.asset.clone()));
        }
        if accounts.get(1).cloned().is_none_or(|a| a.is_none()) {
            return Err(PayError::RecipientMissingTokenAccount(
                challenge.asset.clone(),
            ));
        }

        let transfer_ix = spl_token::instruction::transfer_checked(
            &spl_token::ID,
            &source_ata,
            &USDC_DEVNET_MINT,
            &destination_ata,
            &sender,
            &[],
            amount,
            USDC_DECIMALS,
        )
        .map_err(|err| PayError::Signing(err.to_string()))?;
        let memo = challenge_memo(&challenge.nonce, &challenge.request_hash);
        let memo_ix = Instruction::new_with_bytes(MEMO_PROGRAM_PUBKEY, memo.as_bytes(), Vec::new());

        let recent_blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|err| PayError::Rpc(err.to_string()))?;
        let message = MessageV0::try_compile(
            &sender,
            &[transfer_ix, memo_ix],
            &[],
            recent_blockhash,
        )
        .map_err(|err| PayError::Signing(err.to_string()))?;
        let transaction =
            VersionedTransaction::try_new(VersionedMessage::V0(message), &[&self.keypair])
                .map_err(|err| PayError::Signing(err.to_string()))?;

        let signature = self
            .rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|err| PayError::Rpc(err.to_string()))?;
        tracing::info!(%signature, amount, recipient = %challenge.recipient, "settled challenge on-chain");

        Ok(PaymentProof {
            version: challenge.version,
            nonce: challenge.nonce.clone(),
            request_hash: challenge.request_hash.clone(),
            payer: sender.to_string(),
            timestamp: Utc::now(),
            expires_at: challenge.expires_at,
            signature: signature.to_string(),
        })
    }
}
