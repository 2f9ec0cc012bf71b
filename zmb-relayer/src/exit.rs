//! Miden → Zcash exit relayer.
//!
//! Per tick: sync the rollup client, list exit notes consumable by the
//! bridge account, and for each one claim → consume → pay out → mark paid.
//! There is no rollup-side cursor; the consumable-note listing is the
//! source of truth and duplicates are rejected by the claim log.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use zmb_miden::{ExitNote, MidenRollup};
use zmb_store::{BridgeStore, Withdrawal, WithdrawalStatus};
use zmb_zcash::ZcashChain;

use crate::{RelayerError, ShutdownRx};

#[derive(Debug, Clone)]
pub struct ExitRelayerConfig {
    pub tick: Duration,
}

pub struct ExitRelayer {
    zcash: Arc<dyn ZcashChain>,
    miden: Arc<dyn MidenRollup>,
    store: Arc<BridgeStore>,
    config: ExitRelayerConfig,
}

impl ExitRelayer {
    pub fn new(
        zcash: Arc<dyn ZcashChain>,
        miden: Arc<dyn MidenRollup>,
        store: Arc<BridgeStore>,
        config: ExitRelayerConfig,
    ) -> Self {
        Self {
            zcash,
            miden,
            store,
            config,
        }
    }

    /// Run until shutdown; the signal only cancels the sleep between
    /// ticks, never the claim → consume → mark sequence.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        info!(tick = ?self.config.tick, "exit relayer started");
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!("exit tick failed: {err}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("exit relayer stopped");
    }

    /// One pass. Public so tests can drive ticks directly.
    pub async fn tick(&self) -> Result<(), RelayerError> {
        self.miden.sync().await?;
        let notes = self.miden.list_consumable_exit_notes().await?;
        if !notes.is_empty() {
            debug!(count = notes.len(), "processing exit notes");
        }

        for note in &notes {
            if let Err(err) = self.process_exit(note).await {
                // Failures are per-note: the note stays consumable (or the
                // row stays pending) and the next tick retries.
                warn!(note = %note.id, "exit processing failed: {err}");
            }
        }

        self.retry_pending_payouts().await
    }

    async fn process_exit(&self, note: &ExitNote) -> Result<(), RelayerError> {
        let withdrawal = match self.store.claim_withdrawal(
            &note.id,
            &note.dest_address,
            note.amount_base,
        )? {
            Some(w) => w,
            None => {
                // Already claimed: either fully settled, or a crash left
                // the row mid-flight. Resume anything unpaid.
                match self.store.withdrawal_for_note(&note.id)? {
                    Some(w) if w.status != WithdrawalStatus::Paid => w,
                    _ => return Ok(()),
                }
            }
        };
        self.settle(withdrawal).await
    }

    /// Drive a claimed withdrawal to the paid state. Safe to call again
    /// with partial progress: the consumption tx and payout txid are each
    /// checked before being re-attempted.
    async fn settle(&self, withdrawal: Withdrawal) -> Result<(), RelayerError> {
        if withdrawal.target_txid.is_some() {
            return Ok(());
        }

        let withdrawal = if withdrawal.consume_txid.is_none() {
            let note_id = withdrawal.source_note_id.clone().ok_or_else(|| {
                RelayerError::Store(zmb_store::StoreError::Corrupt(format!(
                    "claimed withdrawal {} has no source note",
                    withdrawal.id
                )))
            })?;
            match self.miden.consume_note(&note_id).await {
                Ok(consume_txid) => {
                    // Wrapped supply is out of circulation from here on;
                    // the pool owes the user until the payout lands.
                    self.store.record_consumed(withdrawal.id, &consume_txid)?;
                    debug!(note = %note_id, consume_txid, "consumed exit note");
                    Withdrawal {
                        consume_txid: Some(consume_txid),
                        status: WithdrawalStatus::Consumed,
                        ..withdrawal
                    }
                }
                Err(err) => {
                    // Compensating write: drop the claim so the next tick
                    // starts over from the listing.
                    self.store.release_withdrawal(withdrawal.id)?;
                    return Err(err.into());
                }
            }
        } else {
            withdrawal
        };

        let target_txid = self
            .zcash
            .send_shielded(&withdrawal.dest_address, withdrawal.amount_base, None)
            .await?;
        self.store.mark_paid(withdrawal.id, &target_txid)?;
        info!(
            withdrawal = withdrawal.id,
            target_txid,
            amount_base = withdrawal.amount_base,
            "paid out withdrawal"
        );
        Ok(())
    }

    /// Withdrawals whose note was consumed but whose payout has not
    /// landed are retried until it does.
    async fn retry_pending_payouts(&self) -> Result<(), RelayerError> {
        for withdrawal in self.store.pending_withdrawals()? {
            if withdrawal.status == WithdrawalStatus::Consumed {
                let id = withdrawal.id;
                if let Err(err) = self.settle(withdrawal).await {
                    warn!(withdrawal = id, "payout retry failed: {err}");
                }
            }
        }
        Ok(())
    }
}
