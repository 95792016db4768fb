//! On-chain verifier and payer for Solana-compatible ledgers.
//!
//! Payments are SPL token `transferChecked` instructions to the recipient's
//! associated token account, bound to the originating challenge by a memo
//! instruction carrying `"{nonce}|{requestHash}"`. The memo is what prevents
//! reuse of any other transaction that happens to transfer to the same
//! recipient.

pub mod payer;
pub mod rpc;
pub mod verifier;

pub use payer::{SolanaPayer, SolanaPayerConfig};
pub use rpc::{RpcFetchError, RpcTransactionFetcher, TransactionFetcher};
pub use verifier::SolanaVerifier;

use solana_pubkey::{Pubkey, pubkey};

/// USDC mint on Solana devnet.
pub static USDC_DEVNET_MINT: Pubkey = pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZ5nc4pb");

/// SPL Memo program.
pub static MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Associated token account program.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

pub const USDC_DECIMALS: u8 = 6;

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Oldest acceptable `blockTime` relative to now, guarding against replay of
/// stale transactions.
pub const DEFAULT_MAX_TRANSACTION_AGE_SECONDS: i64 = 600;

/// Derives the associated token account for `(owner, mint)` under the
/// classic SPL token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    )
    .0
}

/// Memo payload binding an on-chain transfer to a specific challenge.
pub fn challenge_memo(nonce: &str, request_hash: &str) -> String {
    format!("{nonce}|{request_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ata_derivation_is_deterministic() {
        let owner = Pubkey::from_str("EGBQqKn968sVv5cQh5Cr72pSTHfxsuzq7o7asqYB5uEV").unwrap();
        let a = associated_token_address(&owner, &USDC_DEVNET_MINT);
        let b = associated_token_address(&owner, &USDC_DEVNET_MINT);
        assert_eq!(a, b);
        assert_ne!(a, owner);
    }

    #[test]
    fn test_challenge_memo_format() {
        assert_eq!(challenge_memo("N", "H"), "N|H");
    }
}
