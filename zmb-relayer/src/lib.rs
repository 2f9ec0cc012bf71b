//! zmb-relayer
//!
//! The two relayer loops of the bridge engine:
//!
//! 1. deposit relayer: scans the shielded chain for confirmed deposits to
//!    the bridge pool and mints hash-locked notes on the rollup;
//! 2. exit relayer: consumes exit notes on the rollup and pays out to the
//!    embedded shielded address.
//!
//! Both loops are tick-driven, catch and classify every error, and only
//! touch shared state through the bridge store's claim operations.

pub mod deposit;
pub mod exit;

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::watch;
use zmb_miden::MidenError;
use zmb_store::StoreError;
use zmb_zcash::ZcashError;

pub use deposit::{DepositRelayer, DepositRelayerConfig};
pub use exit::{ExitRelayer, ExitRelayerConfig};

#[derive(Debug, Error)]
pub enum RelayerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Zcash(#[from] ZcashError),
    #[error(transparent)]
    Miden(#[from] MidenError),
}

impl RelayerError {
    pub fn is_transient(&self) -> bool {
        match self {
            RelayerError::Store(_) => false,
            RelayerError::Zcash(e) => e.is_transient(),
            RelayerError::Miden(e) => e.is_transient(),
        }
    }
}

/// Shutdown signal shared by the relayer tasks. Flipping the sender to
/// `true` cancels the tick sleeps; in-flight work completes its current
/// store mark before the loop exits.
pub type ShutdownRx = watch::Receiver<bool>;

pub fn shutdown_channel() -> (watch::Sender<bool>, ShutdownRx) {
    watch::channel(false)
}

/// Delay before retry attempt `n + 1`, with `n` completed attempts:
/// 1 s, 2 s, 4 s, … capped at 2^10.
pub(crate) fn backoff_secs(attempts: u32) -> u64 {
    1u64 << attempts.saturating_sub(1).min(10)
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::backoff_secs;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(1), 1);
        assert_eq!(backoff_secs(2), 2);
        assert_eq!(backoff_secs(4), 8);
        assert_eq!(backoff_secs(64), 1024);
    }
}
