//! Zcash → Miden deposit relayer.
//!
//! Per tick: advance through confirmed transactions addressed to the
//! bridge pool, parse each memo as a recipient hash, claim the deposit in
//! the store, mint a hash-locked note on the rollup, and mark the intent
//! settled. The scan cursor never moves past a transiently-failing
//! transaction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use zmb_common::memo::parse_deposit_memo;
use zmb_miden::MidenRollup;
use zmb_store::{BridgeStore, DepositStatus, CHAIN_ZCASH};
use zmb_zcash::{ConfirmedTx, ZcashChain};

use crate::{backoff_secs, unix_now, RelayerError, ShutdownRx};

#[derive(Debug, Clone)]
pub struct DepositRelayerConfig {
    pub tick: Duration,
    /// The bridge's published shielded pool address.
    pub pool_address: String,
    /// Mint attempts before a poisonous deposit is quarantined.
    pub max_mint_attempts: u32,
    /// Deposits below this many base units are quarantined instead of
    /// minted. Zero mints everything.
    pub min_deposit_base: u64,
}

/// Whether the scan may move past the transaction just processed.
enum Outcome {
    Advance,
    Hold,
}

pub struct DepositRelayer {
    zcash: Arc<dyn ZcashChain>,
    miden: Arc<dyn MidenRollup>,
    store: Arc<BridgeStore>,
    config: DepositRelayerConfig,
}

impl DepositRelayer {
    pub fn new(
        zcash: Arc<dyn ZcashChain>,
        miden: Arc<dyn MidenRollup>,
        store: Arc<BridgeStore>,
        config: DepositRelayerConfig,
    ) -> Self {
        Self {
            zcash,
            miden,
            store,
            config,
        }
    }

    /// Run until shutdown. Ticks are never interrupted mid-event: the
    /// shutdown signal only cancels the sleep between ticks.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        info!(tick = ?self.config.tick, "deposit relayer started");
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!("deposit tick failed: {err}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("deposit relayer stopped");
    }

    /// One scan pass. Public so tests can drive ticks directly.
    pub async fn tick(&self) -> Result<(), RelayerError> {
        let start = self.store.cursor(CHAIN_ZCASH)?;
        let txs = self.zcash.scan_from(start).await?;
        if txs.is_empty() {
            return Ok(());
        }
        debug!(after = %start, count = txs.len(), "processing confirmed deposits");

        let mut cursor = start;
        for tx in &txs {
            match self.process_deposit(tx).await {
                Ok(Outcome::Advance) => cursor = tx.cursor(),
                Ok(Outcome::Hold) => break,
                Err(err) if err.is_transient() => {
                    warn!(txid = %tx.txid, "transient failure, retrying next tick: {err}");
                    break;
                }
                Err(err) => {
                    // Unclassified failures are treated like transient ones:
                    // hold the cursor and retry rather than skip funds.
                    warn!(txid = %tx.txid, "deposit processing failed: {err}");
                    break;
                }
            }
        }

        if cursor > start {
            self.store.advance_cursor(CHAIN_ZCASH, cursor)?;
        }
        Ok(())
    }

    async fn process_deposit(&self, tx: &ConfirmedTx) -> Result<Outcome, RelayerError> {
        let pool = &self.config.pool_address;
        // Multiple bridge-addressed outputs in one tx aggregate into a
        // single mint.
        let amount_base: u64 = tx.outputs_to(pool).map(|o| o.value_base).sum();
        let memo = tx.outputs_to(pool).find_map(|o| o.memo.clone());

        let Some(recipient_hash) = memo.as_deref().and_then(parse_deposit_memo) else {
            warn!(txid = %tx.txid, "deposit memo is not a recipient hash, marking unclaimable");
            self.store.mark_unclaimable(
                &tx.txid,
                amount_base,
                memo.as_deref(),
                "memo is not a recipient hash",
            )?;
            return Ok(Outcome::Advance);
        };
        let hash_hex = recipient_hash.to_hex();

        let intent = match self.store.claim_deposit(&tx.txid, &hash_hex, amount_base)? {
            Some(intent) => intent,
            None => {
                // Either fully handled, or re-observed after a mid-flight
                // mint failure. Resume only rows still waiting on a mint.
                match self.store.intent_for_txid(&tx.txid)? {
                    Some(intent) if intent.status == DepositStatus::Observed => intent,
                    _ => return Ok(Outcome::Advance),
                }
            }
        };

        // A recorded note id means the mint went through even if the
        // settle write was lost; never mint twice.
        if intent.mint_note_id.is_some() || intent.status == DepositStatus::Minted {
            return Ok(Outcome::Advance);
        }

        if amount_base < self.config.min_deposit_base {
            warn!(txid = %tx.txid, amount_base, "deposit below dust threshold, quarantining");
            self.store.quarantine_deposit(intent.id)?;
            return Ok(Outcome::Advance);
        }

        // Exponential backoff between mint attempts; the cursor waits with
        // the row.
        if let Some(last) = intent.last_attempt_at {
            let due = last + backoff_secs(intent.attempts) as i64;
            if unix_now() < due {
                return Ok(Outcome::Hold);
            }
        }

        let attempts = self.store.record_mint_attempt(intent.id)?;
        match self.miden.mint_p2idh(recipient_hash, amount_base).await {
            Ok(note_id) => {
                self.store.mark_minted(intent.id, &note_id, amount_base)?;
                info!(
                    txid = %tx.txid,
                    note_id,
                    amount_base,
                    "minted deposit note"
                );
                Ok(Outcome::Advance)
            }
            Err(err) => {
                warn!(
                    txid = %tx.txid,
                    attempts,
                    "mint failed: {err}"
                );
                if attempts >= self.config.max_mint_attempts {
                    // Do not block forward progress on a poisonous tx.
                    self.store.quarantine_deposit(intent.id)?;
                    Ok(Outcome::Advance)
                } else {
                    Ok(Outcome::Hold)
                }
            }
        }
    }
}
