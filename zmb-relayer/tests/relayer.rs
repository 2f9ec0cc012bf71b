//! Relayer scenario tests against in-memory fakes of both chains.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use miden_objects::{account::AccountId, Word};
use zmb_common::Secret;
use zmb_miden::{ExitNote, MidenError, MidenRollup};
use zmb_relayer::{DepositRelayer, DepositRelayerConfig, ExitRelayer, ExitRelayerConfig};
use zmb_store::{BridgeStore, DepositStatus, WithdrawalStatus, CHAIN_ZCASH};
use zmb_common::ScanCursor;
use zmb_zcash::{ConfirmedTx, PoolBalance, ShieldedPool, TxOutput, ZcashChain, ZcashError};

const POOL: &str = "utest1poolpoolpool";
// Each 8-byte limb starts with a zero byte, so all four are valid field
// elements.
const HASH_HEX: &str = "0011223344556677001122334455667700112233445566770011223344556677";

fn deposit_tx(txid: &str, height: u32, txpos: u32, amount: u64, memo: Option<&str>) -> ConfirmedTx {
    ConfirmedTx {
        txid: txid.to_string(),
        height,
        txpos,
        outputs: vec![TxOutput {
            pool: ShieldedPool::Orchard,
            to_address: Some(POOL.to_string()),
            value_base: amount,
            memo: memo.map(str::to_string),
        }],
    }
}

#[derive(Default)]
struct FakeZcash {
    txs: Mutex<Vec<ConfirmedTx>>,
    /// Re-deliver everything regardless of cursor, like a client adapter
    /// replaying history.
    ignore_cursor: bool,
    sent: Mutex<Vec<(String, u64)>>,
    send_failures: AtomicU32,
    send_seq: AtomicU64,
}

#[async_trait]
impl ZcashChain for FakeZcash {
    async fn current_tip(&self) -> Result<u32, ZcashError> {
        Ok(self
            .txs
            .lock()
            .unwrap()
            .iter()
            .map(|tx| tx.height)
            .max()
            .unwrap_or(0))
    }

    async fn scan_from(&self, cursor: ScanCursor) -> Result<Vec<ConfirmedTx>, ZcashError> {
        let txs = self.txs.lock().unwrap();
        Ok(txs
            .iter()
            .filter(|tx| self.ignore_cursor || tx.cursor() > cursor)
            .cloned()
            .collect())
    }

    async fn send_shielded(
        &self,
        dest_address: &str,
        amount_base: u64,
        _memo: Option<&str>,
    ) -> Result<String, ZcashError> {
        if self.send_failures.load(Ordering::SeqCst) > 0 {
            self.send_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ZcashError::NodeUnavailable("node down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((dest_address.to_string(), amount_base));
        let n = self.send_seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{n:064x}"))
    }

    async fn balance(&self) -> Result<PoolBalance, ZcashError> {
        Ok(PoolBalance::default())
    }
}

#[derive(Default)]
struct FakeMiden {
    exit_notes: Mutex<Vec<ExitNote>>,
    minted: Mutex<Vec<(String, u64)>>,
    mint_failures: AtomicU32,
    consumed: Mutex<Vec<String>>,
    consume_failures: AtomicU32,
    seq: AtomicU64,
}

#[async_trait]
impl MidenRollup for FakeMiden {
    async fn sync(&self) -> Result<(), MidenError> {
        Ok(())
    }

    async fn mint_p2idh(
        &self,
        recipient_hash: Word,
        amount_base: u64,
    ) -> Result<String, MidenError> {
        if self.mint_failures.load(Ordering::SeqCst) > 0 {
            self.mint_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(MidenError::Rpc("rollup unavailable".into()));
        }
        self.minted
            .lock()
            .unwrap()
            .push((recipient_hash.to_hex(), amount_base));
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xnote{n}"))
    }

    async fn list_consumable_exit_notes(&self) -> Result<Vec<ExitNote>, MidenError> {
        let consumed = self.consumed.lock().unwrap();
        Ok(self
            .exit_notes
            .lock()
            .unwrap()
            .iter()
            .filter(|note| !consumed.contains(&note.id))
            .cloned()
            .collect())
    }

    async fn consume_note(&self, note_id: &str) -> Result<String, MidenError> {
        if self.consume_failures.load(Ordering::SeqCst) > 0 {
            self.consume_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(MidenError::Rpc("rollup unavailable".into()));
        }
        self.consumed.lock().unwrap().push(note_id.to_string());
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xconsume{n}"))
    }

    async fn vault_balance(&self, _account_id: AccountId) -> Result<u64, MidenError> {
        Ok(0)
    }

    async fn bridge_balance(&self) -> Result<u64, MidenError> {
        Ok(0)
    }

    async fn claim_deposit_note(
        &self,
        _account_id: AccountId,
        _secret: &Secret,
        _amount_base: u64,
    ) -> Result<(String, String), MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }

    async fn create_account(&self) -> Result<AccountId, MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }
}

fn deposit_relayer(
    zcash: Arc<FakeZcash>,
    miden: Arc<FakeMiden>,
    store: Arc<BridgeStore>,
    max_mint_attempts: u32,
    min_deposit_base: u64,
) -> DepositRelayer {
    DepositRelayer::new(
        zcash,
        miden,
        store,
        DepositRelayerConfig {
            tick: Duration::from_secs(5),
            pool_address: POOL.to_string(),
            max_mint_attempts,
            min_deposit_base,
        },
    )
}

fn exit_relayer(
    zcash: Arc<FakeZcash>,
    miden: Arc<FakeMiden>,
    store: Arc<BridgeStore>,
) -> ExitRelayer {
    ExitRelayer::new(
        zcash,
        miden,
        store,
        ExitRelayerConfig {
            tick: Duration::from_secs(10),
        },
    )
}

#[tokio::test]
async fn happy_deposit_mints_one_note() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![deposit_tx("tx-1", 100, 1, 30_000_000, Some(HASH_HEX))]),
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 8, 0);

    relayer.tick().await.unwrap();

    let minted = miden.minted.lock().unwrap();
    assert_eq!(minted.len(), 1);
    assert_eq!(minted[0].1, 30_000_000);

    let intent = store.intent_for_txid("tx-1").unwrap().unwrap();
    assert_eq!(intent.status, DepositStatus::Minted);
    assert_eq!(intent.amount_base, Some(30_000_000));
    assert!(intent.mint_note_id.is_some());

    assert_eq!(
        store.cursor(CHAIN_ZCASH).unwrap(),
        ScanCursor { block: 100, txpos: 1 }
    );
}

#[tokio::test]
async fn redelivered_deposit_is_a_noop() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![deposit_tx("tx-1", 100, 1, 30_000_000, Some(HASH_HEX))]),
        ignore_cursor: true,
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 8, 0);

    relayer.tick().await.unwrap();
    relayer.tick().await.unwrap();

    assert_eq!(miden.minted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_memo_is_unclaimable_not_minted() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![
            deposit_tx("tx-bad", 100, 1, 1_000, Some("hello")),
            deposit_tx("tx-empty", 100, 2, 2_000, None),
        ]),
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 8, 0);

    relayer.tick().await.unwrap();

    assert!(miden.minted.lock().unwrap().is_empty());
    let unclaimable = store.unclaimable_deposits().unwrap();
    assert_eq!(unclaimable.len(), 2);
    assert_eq!(unclaimable[0].source_txid, "tx-bad");
    assert_eq!(unclaimable[0].memo.as_deref(), Some("hello"));

    // The cursor advances past policy failures.
    assert_eq!(
        store.cursor(CHAIN_ZCASH).unwrap(),
        ScanCursor { block: 100, txpos: 2 }
    );
}

#[tokio::test]
async fn transient_mint_failure_retries_without_double_mint() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![deposit_tx("tx-1", 100, 1, 5_000, Some(HASH_HEX))]),
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    miden.mint_failures.store(1, Ordering::SeqCst);
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 8, 0);

    relayer.tick().await.unwrap();
    // The cursor must not advance past the failed tx.
    assert_eq!(store.cursor(CHAIN_ZCASH).unwrap(), ScanCursor::default());
    assert!(miden.minted.lock().unwrap().is_empty());

    // Wait out the first backoff step, then retry.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    relayer.tick().await.unwrap();

    assert_eq!(miden.minted.lock().unwrap().len(), 1);
    let intent = store.intent_for_txid("tx-1").unwrap().unwrap();
    assert_eq!(intent.status, DepositStatus::Minted);
    assert_eq!(intent.attempts, 2);
    assert_eq!(
        store.cursor(CHAIN_ZCASH).unwrap(),
        ScanCursor { block: 100, txpos: 1 }
    );
}

#[tokio::test]
async fn poisonous_deposit_quarantines_after_max_attempts() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![deposit_tx("tx-poison", 100, 1, 5_000, Some(HASH_HEX))]),
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    miden.mint_failures.store(10, Ordering::SeqCst);
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 2, 0);

    relayer.tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    relayer.tick().await.unwrap();

    assert!(miden.minted.lock().unwrap().is_empty());
    let quarantined = store.quarantined_deposits().unwrap();
    assert_eq!(quarantined.len(), 1);
    // Forward progress is not blocked: the cursor moved past the tx.
    assert_eq!(
        store.cursor(CHAIN_ZCASH).unwrap(),
        ScanCursor { block: 100, txpos: 1 }
    );
}

#[tokio::test]
async fn dust_deposit_is_quarantined() {
    let zcash = Arc::new(FakeZcash {
        txs: Mutex::new(vec![deposit_tx("tx-dust", 100, 1, 500, Some(HASH_HEX))]),
        ..Default::default()
    });
    let miden = Arc::new(FakeMiden::default());
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = deposit_relayer(zcash, miden.clone(), store.clone(), 8, 1_000);

    relayer.tick().await.unwrap();

    assert!(miden.minted.lock().unwrap().is_empty());
    assert_eq!(store.quarantined_deposits().unwrap().len(), 1);
}

fn exit_note(id: &str, dest: &str, amount: u64) -> ExitNote {
    ExitNote {
        id: id.to_string(),
        dest_address: dest.to_string(),
        amount_base: amount,
    }
}

#[tokio::test]
async fn happy_withdrawal_consumes_and_pays_once() {
    let zcash = Arc::new(FakeZcash::default());
    let miden = Arc::new(FakeMiden {
        exit_notes: Mutex::new(vec![exit_note("note-1", "utest1dest", 50_000_000)]),
        ..Default::default()
    });
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = exit_relayer(zcash.clone(), miden.clone(), store.clone());

    relayer.tick().await.unwrap();
    relayer.tick().await.unwrap();

    assert_eq!(miden.consumed.lock().unwrap().len(), 1);
    let sent = zcash.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], ("utest1dest".to_string(), 50_000_000));

    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.status, WithdrawalStatus::Paid);
    assert!(w.consume_txid.is_some());
    assert!(w.target_txid.is_some());
}

#[tokio::test]
async fn withdrawal_binds_facade_created_request() {
    let zcash = Arc::new(FakeZcash::default());
    let miden = Arc::new(FakeMiden {
        exit_notes: Mutex::new(vec![exit_note("note-1", "utest1dest", 9_000)]),
        ..Default::default()
    });
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let open = store
        .create_withdrawal(Some("mtst1user"), "utest1dest", 9_000)
        .unwrap();
    let relayer = exit_relayer(zcash, miden, store.clone());

    relayer.tick().await.unwrap();

    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.id, open.id);
    assert_eq!(w.origin_account_id.as_deref(), Some("mtst1user"));
    assert_eq!(w.status, WithdrawalStatus::Paid);
}

#[tokio::test]
async fn payout_failure_is_retried_exactly_once_per_success() {
    let zcash = Arc::new(FakeZcash::default());
    zcash.send_failures.store(1, Ordering::SeqCst);
    let miden = Arc::new(FakeMiden {
        exit_notes: Mutex::new(vec![exit_note("note-1", "utest1dest", 7_000)]),
        ..Default::default()
    });
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = exit_relayer(zcash.clone(), miden.clone(), store.clone());

    // Consumption succeeds, payout fails: Consumed-not-Paid.
    relayer.tick().await.unwrap();
    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.status, WithdrawalStatus::Consumed);
    assert!(zcash.sent.lock().unwrap().is_empty());

    // A fresh relayer over the same store stands in for a restart.
    let restarted = exit_relayer(zcash.clone(), miden.clone(), store.clone());
    restarted.tick().await.unwrap();

    assert_eq!(miden.consumed.lock().unwrap().len(), 1);
    assert_eq!(zcash.sent.lock().unwrap().len(), 1);
    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.status, WithdrawalStatus::Paid);
}

#[tokio::test]
async fn consume_failure_releases_and_retries() {
    let zcash = Arc::new(FakeZcash::default());
    let miden = Arc::new(FakeMiden {
        exit_notes: Mutex::new(vec![exit_note("note-1", "utest1dest", 7_000)]),
        ..Default::default()
    });
    miden.consume_failures.store(1, Ordering::SeqCst);
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let relayer = exit_relayer(zcash.clone(), miden.clone(), store.clone());

    relayer.tick().await.unwrap();
    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.status, WithdrawalStatus::Open);
    assert!(miden.consumed.lock().unwrap().is_empty());

    relayer.tick().await.unwrap();
    let w = store.withdrawal_for_note("note-1").unwrap().unwrap();
    assert_eq!(w.status, WithdrawalStatus::Paid);
    assert_eq!(miden.consumed.lock().unwrap().len(), 1);
    assert_eq!(zcash.sent.lock().unwrap().len(), 1);
}
