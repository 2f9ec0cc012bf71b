//! zmb-miden
//!
//! Thin asynchronous adapter over the Miden rollup RPC: mint hash-locked
//! deposit notes, list and consume exit notes addressed to the bridge
//! account, and read vault balances. No business logic lives here.

pub mod bootstrap;
pub mod client;
pub mod notes;

use async_trait::async_trait;
use miden_objects::{account::AccountId, Felt, Word};
use thiserror::Error;
use zmb_common::Secret;

#[derive(Debug, Error)]
pub enum MidenError {
    #[error("rollup rpc error: {0}")]
    Rpc(String),
    #[error("rollup call exceeded its deadline")]
    Timeout,
    #[error("note error: {0}")]
    Note(String),
    #[error("account not ready: {0}")]
    AccountNotReady(String),
    #[error("client error: {0}")]
    Client(String),
}

impl MidenError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MidenError::Rpc(_) | MidenError::Timeout)
    }
}

/// An exit note addressed to the bridge account: a burn of wrapped tokens
/// carrying the destination shielded address in its inputs and the amount
/// in its fungible asset.
#[derive(Debug, Clone)]
pub struct ExitNote {
    pub id: String,
    pub dest_address: String,
    pub amount_base: u64,
}

/// Interpret a consumable note's payload as an exit note.
pub fn decode_exit_note(
    id: String,
    inputs: &[Felt],
    amount_base: Option<u64>,
) -> Result<ExitNote, MidenError> {
    let dest_address = notes::decode_exit_inputs(inputs)?;
    let amount_base = amount_base
        .ok_or_else(|| MidenError::Note("exit note carries no fungible asset".into()))?;
    if amount_base == 0 {
        return Err(MidenError::Note("exit note burns a zero amount".into()));
    }
    Ok(ExitNote {
        id,
        dest_address,
        amount_base,
    })
}

/// The verbs the engine drives the rollup with.
#[async_trait]
pub trait MidenRollup: Send + Sync {
    /// Refresh the client's view of rollup state.
    async fn sync(&self) -> Result<(), MidenError>;

    /// Mint a P2IDH note for `recipient_hash` from the wrapped-asset
    /// faucet. Returns the minted note id.
    async fn mint_p2idh(&self, recipient_hash: Word, amount_base: u64)
        -> Result<String, MidenError>;

    /// Exit notes currently consumable by the bridge account.
    async fn list_consumable_exit_notes(&self) -> Result<Vec<ExitNote>, MidenError>;

    /// Consume an exit note with the bridge account. Returns the rollup
    /// transaction id of the consumption.
    async fn consume_note(&self, note_id: &str) -> Result<String, MidenError>;

    /// Balance of the wrapped asset in an account's vault.
    async fn vault_balance(&self, account_id: AccountId) -> Result<u64, MidenError>;

    /// The bridge account's own wrapped reserve.
    async fn bridge_balance(&self) -> Result<u64, MidenError>;

    /// Claim-mode fallback: reconstruct the P2IDH deposit note from
    /// `(account_id, secret, amount)` and consume it on the user's behalf.
    /// Returns `(transaction_id, note_id)`.
    async fn claim_deposit_note(
        &self,
        account_id: AccountId,
        secret: &Secret,
        amount_base: u64,
    ) -> Result<(String, String), MidenError>;

    /// Create a private wallet account in the bridge's client store, for
    /// server-custodied onboarding.
    async fn create_account(&self) -> Result<AccountId, MidenError>;
}
