//! zmb-common
//!
//! Shared primitives for the Zcash-Miden bridge engine: integer base-unit
//! arithmetic, account-id parsing, secret handling, and the recipient-hash
//! derivation that welds the two sides of the bridge together.

use miden_lib::note::utils::build_p2id_recipient;
use miden_objects::{account::AccountId, Word};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod amount;
pub mod memo;

/// Position on the source chain up to which the engine has consumed
/// confirmed transactions. Ordered lexicographically by (block, txpos).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    pub block: u32,
    pub txpos: u32,
}

impl std::fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block, self.txpos)
    }
}

/// Errors surfaced by account-id / secret parsing and recipient derivation.
///
/// These are returned to the facade caller and never reach the relayer
/// loops.
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("malformed account id: {0}")]
    MalformedAccountId(String),
    #[error("malformed secret: {0}")]
    MalformedSecret(String),
    #[error("recipient derivation failed: {0}")]
    Recipient(String),
}

/// Parse a Miden account id from either its bech32 (`mtst…`/`mm…`) or hex
/// encoding, with or without a `0x` prefix.
pub fn parse_account_id(input: &str) -> Result<AccountId, DerivationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DerivationError::MalformedAccountId(
            "account id must not be empty".into(),
        ));
    }

    if input.starts_with("mtst") || input.starts_with("mm") {
        let (_, account_id) = AccountId::from_bech32(input)
            .map_err(|e| DerivationError::MalformedAccountId(format!("invalid bech32: {e}")))?;
        return Ok(account_id);
    }

    let hex_str = input.strip_prefix("0x").unwrap_or(input);
    AccountId::from_hex(&format!("0x{hex_str}"))
        .map_err(|e| DerivationError::MalformedAccountId(format!("invalid hex: {e}")))
}

/// A user-chosen 32-byte deposit secret.
///
/// The secret exists in backend memory only transiently, as an input to
/// recipient derivation or claim-mode consumption. The buffer is zeroed on
/// drop and the `Debug` impl is redacted so it cannot leak through logs.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    bytes: [u8; 32],
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Secret {
    /// Parse a secret from a 64-character hex string, with or without a
    /// `0x` prefix. The four 64-bit limbs must be valid field elements.
    pub fn parse(input: &str) -> Result<Self, DerivationError> {
        let input = input.trim();
        let hex_str = input.strip_prefix("0x").unwrap_or(input);
        if hex_str.len() != 64 {
            return Err(DerivationError::MalformedSecret(format!(
                "expected 32 bytes (64 hex chars), got {} chars",
                hex_str.len()
            )));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| DerivationError::MalformedSecret(format!("invalid hex: {e}")))?;

        let secret = Self { bytes };
        // Validate the field-element ranges up front so later conversions
        // cannot fail.
        secret.to_word()?;
        Ok(secret)
    }

    /// Convert the secret to a rollup word.
    pub fn to_word(&self) -> Result<Word, DerivationError> {
        let hex_str = format!("0x{}", hex::encode(self.bytes));
        Word::try_from(hex_str.as_str())
            .map_err(|e| DerivationError::MalformedSecret(format!("invalid field element: {e}")))
    }
}

/// Derive the P2IDH recipient hash locking a deposit note:
/// the RPO digest of the P2ID recipient built from `(account_id, secret)`.
///
/// This is the same code path the rollup executes when the note is
/// consumed, so the hash the facade hands out always matches the hash the
/// consume proof is checked against.
pub fn derive_recipient_hash(
    account_id: AccountId,
    secret: &Secret,
) -> Result<Word, DerivationError> {
    let recipient = build_p2id_recipient(account_id, secret.to_word()?)
        .map_err(|e| DerivationError::Recipient(format!("{e:?}")))?;
    Ok(recipient.digest())
}
