//! zmb-zcash
//!
//! Thin asynchronous adapter over the shielded Zcash wallet. It exposes
//! only the verbs the bridge engine needs — scan confirmed transactions
//! with memos, send shielded payments, read the pool balance — and no
//! business logic.

pub mod devtool;

use async_trait::async_trait;
use thiserror::Error;
use zmb_common::ScanCursor;

#[derive(Debug, Error)]
pub enum ZcashError {
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),
    #[error("insufficient spendable funds in the bridge pool")]
    InsufficientFunds,
    #[error("transaction expired before mining")]
    ExpiryRejected,
    #[error("wallet call exceeded its deadline")]
    Timeout,
    #[error("wallet error: {0}")]
    Wallet(String),
    #[error("unparseable wallet output: {0}")]
    Parse(String),
}

impl ZcashError {
    /// Transient errors are retried on the next tick without advancing the
    /// scan cursor past the offending event.
    pub fn is_transient(&self) -> bool {
        matches!(self, ZcashError::NodeUnavailable(_) | ZcashError::Timeout)
    }
}

/// Shielded pool an output landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldedPool {
    Orchard,
    Sapling,
}

/// One shielded output of a confirmed transaction.
#[derive(Debug, Clone)]
pub struct TxOutput {
    pub pool: ShieldedPool,
    pub to_address: Option<String>,
    pub value_base: u64,
    pub memo: Option<String>,
}

/// A confirmed transaction touching the bridge wallet.
#[derive(Debug, Clone)]
pub struct ConfirmedTx {
    pub txid: String,
    pub height: u32,
    /// Position of the tx within the scan order at `height`.
    pub txpos: u32,
    pub outputs: Vec<TxOutput>,
}

impl ConfirmedTx {
    pub fn cursor(&self) -> ScanCursor {
        ScanCursor {
            block: self.height,
            txpos: self.txpos,
        }
    }

    /// Outputs addressed to the bridge pool address.
    pub fn outputs_to<'a>(&'a self, pool_address: &'a str) -> impl Iterator<Item = &'a TxOutput> {
        self.outputs
            .iter()
            .filter(move |o| o.to_address.as_deref() == Some(pool_address))
    }
}

/// Wallet balance in base units.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolBalance {
    pub total_base: u64,
    pub spendable_base: u64,
}

/// The verbs the engine drives the shielded chain with. The pool must be
/// the only wallet account behind an implementation.
#[async_trait]
pub trait ZcashChain: Send + Sync {
    /// Height the wallet has scanned to.
    async fn current_tip(&self) -> Result<u32, ZcashError>;

    /// Confirmed transactions strictly after `cursor`, ordered by
    /// (height, txpos).
    async fn scan_from(&self, cursor: ScanCursor) -> Result<Vec<ConfirmedTx>, ZcashError>;

    /// Send `amount_base` to a shielded address. Holds the wallet spending
    /// key for the duration of the call; at most one submission per call.
    async fn send_shielded(
        &self,
        dest_address: &str,
        amount_base: u64,
        memo: Option<&str>,
    ) -> Result<String, ZcashError>;

    async fn balance(&self) -> Result<PoolBalance, ZcashError>;
}
