//! zmb-store
//!
//! SQLite-backed state shared by the two relayers and the HTTP facade:
//! deposit intents, withdrawals, scan cursors, and the crash-safe
//! idempotency log keyed by source-chain txid / rollup note id.
//!
//! The store exclusively owns all mutation of these rows. Every mutation is
//! a single SQLite transaction, so a crash between receiving a chain fact
//! and persisting it re-surfaces the fact on the next scan; combined with
//! the insert-once idempotency log this yields exactly-once external
//! effect.

use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, OptionalExtension,
};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};
use zmb_common::ScanCursor;

/// Chain key for the shielded source chain's scan cursor.
pub const CHAIN_ZCASH: &str = "zcash";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("store corrupt: {0}")]
    Corrupt(String),
}

/// Lifecycle of a deposit intent.
///
/// `Minted` is the terminal settled state; `Unclaimable` and `Quarantined`
/// are terminal policy states requiring operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositStatus {
    Open,
    Observed,
    Minted,
    Quarantined,
}

impl DepositStatus {
    fn as_str(self) -> &'static str {
        match self {
            DepositStatus::Open => "open",
            DepositStatus::Observed => "observed",
            DepositStatus::Minted => "minted",
            DepositStatus::Quarantined => "quarantined",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(DepositStatus::Open),
            "observed" => Some(DepositStatus::Observed),
            "minted" => Some(DepositStatus::Minted),
            "quarantined" => Some(DepositStatus::Quarantined),
            _ => None,
        }
    }
}

impl ToSql for DepositStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for DepositStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// Lifecycle of a withdrawal: `Open` until the exit relayer binds a note,
/// then `Claimed -> Consumed -> Paid` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Open,
    Claimed,
    Consumed,
    Paid,
}

impl WithdrawalStatus {
    fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Open => "open",
            WithdrawalStatus::Claimed => "claimed",
            WithdrawalStatus::Consumed => "consumed",
            WithdrawalStatus::Paid => "paid",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(WithdrawalStatus::Open),
            "claimed" => Some(WithdrawalStatus::Claimed),
            "consumed" => Some(WithdrawalStatus::Consumed),
            "paid" => Some(WithdrawalStatus::Paid),
            _ => None,
        }
    }
}

impl ToSql for WithdrawalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for WithdrawalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// A deposit intent: one row per recipient hash.
#[derive(Debug, Clone)]
pub struct DepositIntent {
    pub id: i64,
    pub recipient_hash: String,
    pub account_id: Option<String>,
    pub source_txid: Option<String>,
    pub amount_base: Option<u64>,
    pub mint_note_id: Option<String>,
    pub status: DepositStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<i64>,
    pub created_at: i64,
}

/// A withdrawal from the rollup back to the shielded chain.
#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub id: i64,
    pub origin_account_id: Option<String>,
    pub dest_address: String,
    pub amount_base: u64,
    pub source_note_id: Option<String>,
    pub consume_txid: Option<String>,
    pub target_txid: Option<String>,
    pub status: WithdrawalStatus,
    pub created_at: i64,
}

/// A confirmed deposit whose memo did not parse as a recipient hash.
/// Funds stay in the pool; the row exists for operator inspection.
#[derive(Debug, Clone)]
pub struct UnclaimableDeposit {
    pub source_txid: String,
    pub amount_base: u64,
    pub memo: Option<String>,
    pub reason: String,
    pub observed_at: i64,
}

const INTENT_COLUMNS: &str = "id, recipient_hash, account_id, source_txid, amount_base, \
     mint_note_id, status, attempts, last_attempt_at, created_at";

const WITHDRAWAL_COLUMNS: &str = "id, origin_account_id, dest_address, amount_base, \
     source_note_id, consume_txid, target_txid, status, created_at";

fn map_intent(row: &rusqlite::Row<'_>) -> rusqlite::Result<DepositIntent> {
    Ok(DepositIntent {
        id: row.get(0)?,
        recipient_hash: row.get(1)?,
        account_id: row.get(2)?,
        source_txid: row.get(3)?,
        amount_base: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
        mint_note_id: row.get(5)?,
        status: row.get(6)?,
        attempts: row.get::<_, i64>(7)? as u32,
        last_attempt_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_withdrawal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Withdrawal> {
    Ok(Withdrawal {
        id: row.get(0)?,
        origin_account_id: row.get(1)?,
        dest_address: row.get(2)?,
        amount_base: row.get::<_, i64>(3)? as u64,
        source_note_id: row.get(4)?,
        consume_txid: row.get(5)?,
        target_txid: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The bridge store. Single writer per row; serialised through one
/// connection.
pub struct BridgeStore {
    conn: Mutex<Connection>,
}

impl BridgeStore {
    /// Open or create the bridge database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("opened bridge store at {}", path.as_ref().display());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS deposit_intents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_hash TEXT NOT NULL UNIQUE,
                account_id TEXT,
                secret TEXT,
                source_txid TEXT UNIQUE,
                amount_base INTEGER,
                mint_note_id TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_intents_txid ON deposit_intents(source_txid);
            CREATE INDEX IF NOT EXISTS idx_intents_status ON deposit_intents(status);

            CREATE TABLE IF NOT EXISTS withdrawals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                origin_account_id TEXT,
                dest_address TEXT NOT NULL,
                amount_base INTEGER NOT NULL,
                source_note_id TEXT UNIQUE,
                consume_txid TEXT,
                target_txid TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_withdrawals_note ON withdrawals(source_note_id);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status);

            -- Insert-once claim log. A row here means the source event has
            -- been handed to exactly one processing attempt.
            CREATE TABLE IF NOT EXISTS idempotency (
                source_chain TEXT NOT NULL,
                source_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (source_chain, source_id)
            );

            CREATE TABLE IF NOT EXISTS unclaimable_deposits (
                source_txid TEXT PRIMARY KEY,
                amount_base INTEGER NOT NULL,
                memo TEXT,
                reason TEXT NOT NULL,
                observed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scan_cursors (
                chain TEXT PRIMARY KEY,
                last_block INTEGER NOT NULL,
                last_txpos INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faucets (
                origin_network TEXT PRIMARY KEY,
                faucet_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("bridge store poisoned")
    }

    /// Create or return the intent for `recipient_hash`. Idempotent on the
    /// hash; `secret` is persisted only for server-custodied accounts.
    pub fn upsert_intent(
        &self,
        account_id: Option<&str>,
        secret: Option<&str>,
        recipient_hash: &str,
    ) -> Result<DepositIntent, StoreError> {
        let conn = self.lock();
        let ts = now();
        conn.execute(
            "INSERT INTO deposit_intents (recipient_hash, account_id, secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(recipient_hash) DO NOTHING",
            params![recipient_hash, account_id, secret, ts],
        )?;
        let intent = conn.query_row(
            &format!("SELECT {INTENT_COLUMNS} FROM deposit_intents WHERE recipient_hash = ?1"),
            params![recipient_hash],
            map_intent,
        )?;
        Ok(intent)
    }

    /// Atomically bind a confirmed deposit to its intent, back-creating the
    /// intent row when the hash is unknown to us (the user's secret lives
    /// only on their device). A second call with the same txid returns
    /// `None`.
    pub fn claim_deposit(
        &self,
        source_txid: &str,
        recipient_hash: &str,
        amount_base: u64,
    ) -> Result<Option<DepositIntent>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ts = now();

        let claimed = tx.execute(
            "INSERT INTO idempotency (source_chain, source_id, outcome, created_at)
             VALUES (?1, ?2, 'deposit-claimed', ?3)
             ON CONFLICT(source_chain, source_id) DO NOTHING",
            params![CHAIN_ZCASH, source_txid, ts],
        )?;
        if claimed == 0 {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO deposit_intents (recipient_hash, created_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(recipient_hash) DO NOTHING",
            params![recipient_hash, ts],
        )?;

        let existing = tx.query_row(
            &format!("SELECT {INTENT_COLUMNS} FROM deposit_intents WHERE recipient_hash = ?1"),
            params![recipient_hash],
            map_intent,
        )?;

        if let Some(ref bound) = existing.source_txid {
            if bound != source_txid {
                // The hash was already satisfied by an earlier deposit. The
                // funds stay in the pool; surface through operator tooling.
                warn!(
                    txid = source_txid,
                    "recipient hash already bound to {bound}, deposit left unclaimable"
                );
                tx.execute(
                    "UPDATE idempotency SET outcome = 'duplicate-hash'
                     WHERE source_chain = ?1 AND source_id = ?2",
                    params![CHAIN_ZCASH, source_txid],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO unclaimable_deposits
                         (source_txid, amount_base, memo, reason, observed_at)
                     VALUES (?1, ?2, ?3, 'recipient hash already used', ?4)",
                    params![source_txid, amount_base as i64, recipient_hash, ts],
                )?;
                tx.commit()?;
                return Ok(None);
            }
        }

        tx.execute(
            "UPDATE deposit_intents
             SET source_txid = ?1, amount_base = ?2, status = 'observed', updated_at = ?3
             WHERE id = ?4",
            params![source_txid, amount_base as i64, ts, existing.id],
        )?;

        let intent = tx.query_row(
            &format!("SELECT {INTENT_COLUMNS} FROM deposit_intents WHERE id = ?1"),
            params![existing.id],
            map_intent,
        )?;
        tx.commit()?;
        debug!(txid = source_txid, intent = intent.id, "claimed deposit");
        Ok(Some(intent))
    }

    /// Look up the intent bound to a source txid. Used on re-observation so
    /// a retry can see an existing `mint_note_id` and skip the mint.
    pub fn intent_for_txid(&self, source_txid: &str) -> Result<Option<DepositIntent>, StoreError> {
        let conn = self.lock();
        let intent = conn
            .query_row(
                &format!("SELECT {INTENT_COLUMNS} FROM deposit_intents WHERE source_txid = ?1"),
                params![source_txid],
                map_intent,
            )
            .optional()?;
        Ok(intent)
    }

    /// Bump the mint attempt counter; returns the new count.
    pub fn record_mint_attempt(&self, intent_id: i64) -> Result<u32, StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE deposit_intents
             SET attempts = attempts + 1, last_attempt_at = ?1, updated_at = ?1
             WHERE id = ?2",
            params![now(), intent_id],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM deposit_intents WHERE id = ?1",
            params![intent_id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    /// Record the minted note and settle the intent.
    pub fn mark_minted(
        &self,
        intent_id: i64,
        mint_note_id: &str,
        amount_base: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "UPDATE deposit_intents
             SET mint_note_id = ?1, amount_base = ?2, status = 'minted', updated_at = ?3
             WHERE id = ?4",
            params![mint_note_id, amount_base as i64, ts, intent_id],
        )?;
        tx.execute(
            "UPDATE idempotency SET outcome = 'minted'
             WHERE source_chain = ?1
               AND source_id = (SELECT source_txid FROM deposit_intents WHERE id = ?2)",
            params![CHAIN_ZCASH, intent_id],
        )?;
        tx.commit()?;
        debug!(intent = intent_id, note = mint_note_id, "marked minted");
        Ok(())
    }

    /// Record a deposit whose memo was not a recipient hash. The cursor
    /// advances past it; funds remain in the pool for the operator.
    pub fn mark_unclaimable(
        &self,
        source_txid: &str,
        amount_base: u64,
        memo: Option<&str>,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "INSERT INTO idempotency (source_chain, source_id, outcome, created_at)
             VALUES (?1, ?2, 'unclaimable', ?3)
             ON CONFLICT(source_chain, source_id) DO UPDATE SET outcome = 'unclaimable'",
            params![CHAIN_ZCASH, source_txid, ts],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO unclaimable_deposits
                 (source_txid, amount_base, memo, reason, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source_txid, amount_base as i64, memo, reason, ts],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Quarantine a poisonous deposit after repeated mint failures so the
    /// scan can move on. Operator action required.
    pub fn quarantine_deposit(&self, intent_id: i64) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE deposit_intents SET status = 'quarantined', updated_at = ?1 WHERE id = ?2",
            params![now(), intent_id],
        )?;
        warn!(intent = intent_id, "deposit quarantined");
        Ok(())
    }

    /// Record a withdrawal request from the facade. The exit relayer binds
    /// the matching exit note when it appears.
    pub fn create_withdrawal(
        &self,
        origin_account_id: Option<&str>,
        dest_address: &str,
        amount_base: u64,
    ) -> Result<Withdrawal, StoreError> {
        let conn = self.lock();
        let ts = now();
        conn.execute(
            "INSERT INTO withdrawals (origin_account_id, dest_address, amount_base, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![origin_account_id, dest_address, amount_base as i64, ts],
        )?;
        let id = conn.last_insert_rowid();
        let w = conn.query_row(
            &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
            params![id],
            map_withdrawal,
        )?;
        Ok(w)
    }

    /// Atomically claim an exit note for processing. Binds the note to a
    /// matching open withdrawal row or back-creates one; a second call with
    /// the same note id returns `None`.
    pub fn claim_withdrawal(
        &self,
        source_note_id: &str,
        dest_address: &str,
        amount_base: u64,
    ) -> Result<Option<Withdrawal>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ts = now();

        let claimed = tx.execute(
            "INSERT INTO idempotency (source_chain, source_id, outcome, created_at)
             VALUES ('miden', ?1, 'withdrawal-claimed', ?2)
             ON CONFLICT(source_chain, source_id) DO NOTHING",
            params![source_note_id, ts],
        )?;
        if claimed == 0 {
            return Ok(None);
        }

        // Prefer a facade-created open row with matching destination and
        // amount; otherwise the note itself is the request.
        let open_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM withdrawals
                 WHERE source_note_id IS NULL AND status = 'open'
                   AND dest_address = ?1 AND amount_base = ?2
                 ORDER BY id LIMIT 1",
                params![dest_address, amount_base as i64],
                |row| row.get(0),
            )
            .optional()?;

        let id = match open_id {
            Some(id) => {
                tx.execute(
                    "UPDATE withdrawals
                     SET source_note_id = ?1, status = 'claimed', updated_at = ?2
                     WHERE id = ?3",
                    params![source_note_id, ts, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO withdrawals
                         (dest_address, amount_base, source_note_id, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'claimed', ?4, ?4)",
                    params![dest_address, amount_base as i64, source_note_id, ts],
                )?;
                tx.last_insert_rowid()
            }
        };

        let w = tx.query_row(
            &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
            params![id],
            map_withdrawal,
        )?;
        tx.commit()?;
        debug!(note = source_note_id, withdrawal = id, "claimed withdrawal");
        Ok(Some(w))
    }

    /// Look up the withdrawal bound to an exit note. Used to resume work
    /// after a crash, when the claim row already exists.
    pub fn withdrawal_for_note(
        &self,
        source_note_id: &str,
    ) -> Result<Option<Withdrawal>, StoreError> {
        let conn = self.lock();
        let w = conn
            .query_row(
                &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE source_note_id = ?1"),
                params![source_note_id],
                map_withdrawal,
            )
            .optional()?;
        Ok(w)
    }

    /// Persist the rollup consumption tx. Wrapped supply is now out of
    /// circulation; the pool owes the user until `mark_paid`.
    pub fn record_consumed(&self, withdrawal_id: i64, consume_txid: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE withdrawals
             SET consume_txid = ?1, status = 'consumed', updated_at = ?2
             WHERE id = ?3",
            params![consume_txid, now(), withdrawal_id],
        )?;
        Ok(())
    }

    /// Persist the payout txid and settle the withdrawal.
    pub fn mark_paid(&self, withdrawal_id: i64, target_txid: &str) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "UPDATE withdrawals
             SET target_txid = ?1, status = 'paid', updated_at = ?2
             WHERE id = ?3",
            params![target_txid, ts, withdrawal_id],
        )?;
        tx.execute(
            "UPDATE idempotency SET outcome = 'paid'
             WHERE source_chain = 'miden'
               AND source_id = (SELECT source_note_id FROM withdrawals WHERE id = ?1)",
            params![withdrawal_id],
        )?;
        tx.commit()?;
        debug!(withdrawal = withdrawal_id, txid = target_txid, "marked paid");
        Ok(())
    }

    /// Compensating write after a failed consumption: the row goes back to
    /// `open` so the next tick retries. The claim log entry stays, and the
    /// retry resumes through `withdrawal_for_note`.
    pub fn release_withdrawal(&self, withdrawal_id: i64) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE withdrawals SET status = 'open', updated_at = ?1
             WHERE id = ?2 AND status = 'claimed'",
            params![now(), withdrawal_id],
        )?;
        Ok(())
    }

    /// Current scan cursor for `chain`; origin when never advanced.
    pub fn cursor(&self, chain: &str) -> Result<ScanCursor, StoreError> {
        let conn = self.lock();
        let cursor = conn
            .query_row(
                "SELECT last_block, last_txpos FROM scan_cursors WHERE chain = ?1",
                params![chain],
                |row| {
                    Ok(ScanCursor {
                        block: row.get::<_, i64>(0)? as u32,
                        txpos: row.get::<_, i64>(1)? as u32,
                    })
                },
            )
            .optional()?;
        Ok(cursor.unwrap_or_default())
    }

    /// Advance the scan cursor. Monotone: attempts to move it backwards are
    /// ignored, so the cursor never regresses across restarts.
    pub fn advance_cursor(&self, chain: &str, cursor: ScanCursor) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO scan_cursors (chain, last_block, last_txpos, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chain) DO UPDATE SET
                 last_block = excluded.last_block,
                 last_txpos = excluded.last_txpos,
                 updated_at = excluded.updated_at
             WHERE excluded.last_block > last_block
                OR (excluded.last_block = last_block AND excluded.last_txpos > last_txpos)",
            params![chain, cursor.block as i64, cursor.txpos as i64, now()],
        )?;
        Ok(())
    }

    pub fn quarantined_deposits(&self) -> Result<Vec<DepositIntent>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTENT_COLUMNS} FROM deposit_intents WHERE status = 'quarantined' ORDER BY id"
        ))?;
        let rows = stmt.query_map([], map_intent)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn unclaimable_deposits(&self) -> Result<Vec<UnclaimableDeposit>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT source_txid, amount_base, memo, reason, observed_at
             FROM unclaimable_deposits ORDER BY observed_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UnclaimableDeposit {
                source_txid: row.get(0)?,
                amount_base: row.get::<_, i64>(1)? as u64,
                memo: row.get(2)?,
                reason: row.get(3)?,
                observed_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Withdrawals that have not reached the terminal paid state.
    pub fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status != 'paid' ORDER BY id"
        ))?;
        let rows = stmt.query_map([], map_withdrawal)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The wrapped-asset faucet created at bootstrap, if any.
    pub fn faucet_for(&self, origin_network: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        let id = conn
            .query_row(
                "SELECT faucet_id FROM faucets WHERE origin_network = ?1",
                params![origin_network],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn store_faucet(&self, origin_network: &str, faucet_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO faucets (origin_network, faucet_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(origin_network) DO NOTHING",
            params![origin_network, faucet_id, now()],
        )?;
        Ok(())
    }
}
