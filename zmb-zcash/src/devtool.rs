//! `zcash-devtool` wallet adapter.
//!
//! The bridge pool is a `zcash-devtool` wallet on disk. Every verb shells
//! out to the devtool CLI (sync, enhance, list-tx, send, balance) and
//! parses its text output. Calls run under a deadline; the send path holds
//! the wallet spending lock for the duration of the spend.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zmb_common::{amount, ScanCursor};

use crate::{ConfirmedTx, PoolBalance, ShieldedPool, TxOutput, ZcashChain, ZcashError};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Adapter over the `zcash-devtool` CLI wallet holding the bridge pool.
pub struct DevtoolWallet {
    wallet_dir: PathBuf,
    identity_file: PathBuf,
    devtool_dir: PathBuf,
    pool_address: String,
    server: String,
    deadline: Duration,
    /// Wallet spending key: held by exactly one send at a time.
    send_lock: Mutex<()>,
}

impl DevtoolWallet {
    pub fn new(
        wallet_dir: PathBuf,
        devtool_dir: PathBuf,
        pool_address: String,
        server: String,
    ) -> Self {
        let identity_file = wallet_dir.join("key.txt");
        Self {
            wallet_dir,
            identity_file,
            devtool_dir,
            pool_address,
            server,
            deadline: DEFAULT_DEADLINE,
            send_lock: Mutex::new(()),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn pool_address(&self) -> &str {
        &self.pool_address
    }

    async fn exec(&self, args: &[&str]) -> Result<String, ZcashError> {
        let mut cmd = Command::new("cargo");
        cmd.args(["run", "--release", "--all-features", "--"])
            .args(args)
            .current_dir(&self.devtool_dir)
            .kill_on_drop(true);

        debug!(?args, "running zcash-devtool");
        let output = tokio::time::timeout(self.deadline, cmd.output())
            .await
            .map_err(|_| ZcashError::Timeout)?
            .map_err(|e| ZcashError::NodeUnavailable(format!("failed to spawn devtool: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn wallet_arg(&self) -> Result<&str, ZcashError> {
        self.wallet_dir
            .to_str()
            .ok_or_else(|| ZcashError::Wallet("invalid wallet path".into()))
    }

    async fn sync(&self) -> Result<(), ZcashError> {
        let wallet = self.wallet_arg()?;
        self.exec(&["wallet", "-w", wallet, "sync", "-s", self.server.as_str()])
            .await?;
        Ok(())
    }

    /// Download memo data for received transactions.
    async fn enhance(&self) -> Result<(), ZcashError> {
        let wallet = self.wallet_arg()?;
        self.exec(&["wallet", "-w", wallet, "enhance", "-s", self.server.as_str()])
            .await?;
        Ok(())
    }

    async fn list_tx(&self) -> Result<String, ZcashError> {
        let wallet = self.wallet_arg()?;
        self.exec(&["wallet", "-w", wallet, "list-tx"]).await
    }
}

fn classify_failure(stderr: &str) -> ZcashError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("insufficient") {
        ZcashError::InsufficientFunds
    } else if lower.contains("expired") || lower.contains("expiry") {
        ZcashError::ExpiryRejected
    } else if lower.contains("connection")
        || lower.contains("transport")
        || lower.contains("unavailable")
        || lower.contains("timed out")
    {
        ZcashError::NodeUnavailable(stderr.trim().to_string())
    } else {
        ZcashError::Wallet(stderr.trim().to_string())
    }
}

#[async_trait::async_trait]
impl ZcashChain for DevtoolWallet {
    async fn current_tip(&self) -> Result<u32, ZcashError> {
        // The devtool wallet has no tip query; the highest mined height in
        // the transaction list is the wallet's scanned tip.
        self.sync().await?;
        let listing = self.list_tx().await?;
        let txs = parse_transactions(&listing)?;
        Ok(txs.iter().map(|tx| tx.height).max().unwrap_or(0))
    }

    async fn scan_from(&self, cursor: ScanCursor) -> Result<Vec<ConfirmedTx>, ZcashError> {
        self.sync().await?;
        self.enhance().await?;
        let listing = self.list_tx().await?;
        let txs = parse_transactions(&listing)?;

        let relevant: Vec<ConfirmedTx> = txs
            .into_iter()
            .filter(|tx| tx.cursor() > cursor)
            .filter(|tx| tx.outputs_to(&self.pool_address).next().is_some())
            .collect();
        debug!(
            after = %cursor,
            count = relevant.len(),
            "scanned confirmed bridge deposits"
        );
        Ok(relevant)
    }

    async fn send_shielded(
        &self,
        dest_address: &str,
        amount_base: u64,
        memo: Option<&str>,
    ) -> Result<String, ZcashError> {
        // Scoped acquisition: the guard is dropped on every exit path,
        // including errors and the timeout inside exec.
        let _guard = self.send_lock.lock().await;

        let wallet = self.wallet_arg()?;
        let identity = self
            .identity_file
            .to_str()
            .ok_or_else(|| ZcashError::Wallet("invalid identity path".into()))?;
        let value = amount::format_base_fixed(amount_base);

        let mut args = vec![
            "wallet",
            "-w",
            wallet,
            "send",
            "--identity",
            identity,
            "--address",
            dest_address,
            "--value",
            value.as_str(),
            "--target-note-count",
            "1",
            "-s",
            self.server.as_str(),
        ];
        if let Some(memo) = memo {
            args.push("--memo");
            args.push(memo);
        }

        let output = self.exec(&args).await?;
        let txid = parse_txid(&output).ok_or_else(|| {
            warn!("send succeeded but no txid found in devtool output");
            ZcashError::Parse("no txid in send output".into())
        })?;
        info!(txid, amount_base, "sent shielded payout");
        Ok(txid)
    }

    async fn balance(&self) -> Result<PoolBalance, ZcashError> {
        let wallet = self.wallet_arg()?;
        let output = self
            .exec(&["wallet", "-w", wallet, "balance"])
            .await?;
        parse_balance(&output)
    }
}

/// First 64-hex-char token in the output, i.e. the submitted txid.
fn parse_txid(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_hexdigit()))
        .find(|t| t.len() == 64 && t.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

/// Parse `wallet balance` output into base units.
fn parse_balance(output: &str) -> Result<PoolBalance, ZcashError> {
    let mut balance = PoolBalance::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Balance:") {
            if let Some(value) = rest.split_whitespace().next() {
                balance.total_base = amount::parse_decimal(value)
                    .map_err(|e| ZcashError::Parse(e.to_string()))?;
            }
        }
        if line.contains("Spendable:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if let Some(pos) = parts.iter().position(|&p| p == "Spendable:") {
                if let Some(value) = parts.get(pos + 1) {
                    balance.spendable_base += amount::parse_decimal(value)
                        .map_err(|e| ZcashError::Parse(e.to_string()))?;
                }
            }
        }
    }
    Ok(balance)
}

/// Parse `wallet list-tx` output.
///
/// The format, per transaction:
///
/// ```text
/// <64-hex txid>
///      Mined: <height> (<timestamp>)
///     Amount: <amount> TAZ
///   Fee paid: <fee>
///   Output 0 (ORCHARD)
///     Value: <amount> TAZ
///     To: <address>
///     Memo: Text("...") | Empty
/// ```
///
/// Unmined transactions carry no `Mined:` line and are skipped. Positions
/// within a height follow the listing order, which the wallet keeps in
/// chain order.
fn parse_transactions(output: &str) -> Result<Vec<ConfirmedTx>, ZcashError> {
    struct PendingTx {
        txid: String,
        height: Option<u32>,
        outputs: Vec<TxOutput>,
    }

    let mut parsed: Vec<PendingTx> = Vec::new();
    let mut current: Option<PendingTx> = None;

    for raw_line in output.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line == "Transactions:" {
            continue;
        }

        if line.len() == 64 && line.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Some(tx) = current.take() {
                parsed.push(tx);
            }
            current = Some(PendingTx {
                txid: line.to_string(),
                height: None,
                outputs: Vec::new(),
            });
            continue;
        }

        let Some(tx) = current.as_mut() else {
            continue;
        };

        if let Some(rest) = line.strip_prefix("Mined:") {
            let height = rest
                .split_whitespace()
                .next()
                .and_then(|h| h.parse::<u32>().ok())
                .ok_or_else(|| ZcashError::Parse(format!("bad Mined line: {line}")))?;
            tx.height = Some(height);
        } else if let Some(rest) = line.strip_prefix("Output") {
            let pool = if rest.contains("SAPLING") {
                ShieldedPool::Sapling
            } else {
                ShieldedPool::Orchard
            };
            tx.outputs.push(TxOutput {
                pool,
                to_address: None,
                value_base: 0,
                memo: None,
            });
        } else if let Some(output) = tx.outputs.last_mut() {
            if let Some(rest) = line.strip_prefix("Value:") {
                if let Some(value) = rest.split_whitespace().next() {
                    output.value_base = amount::parse_decimal(value)
                        .map_err(|e| ZcashError::Parse(e.to_string()))?;
                }
            } else if let Some(rest) = line.strip_prefix("To:") {
                let addr = rest.trim();
                if !addr.is_empty() {
                    output.to_address = Some(addr.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("Memo:") {
                output.memo = parse_memo_field(rest.trim());
            }
        }
    }
    if let Some(tx) = current.take() {
        parsed.push(tx);
    }

    // Assign positions per height in listing order; drop unmined txs.
    let mut txs: Vec<ConfirmedTx> = Vec::with_capacity(parsed.len());
    let mut last_height = 0u32;
    let mut pos = 0u32;
    let mut mined: Vec<PendingTx> = parsed
        .into_iter()
        .filter(|tx| tx.height.is_some())
        .collect();
    mined.sort_by_key(|tx| tx.height.unwrap());
    for tx in mined {
        let height = tx.height.unwrap();
        // Positions are 1-based so the default cursor (0, 0) sits before
        // the first transaction of block 0.
        pos = if height == last_height { pos + 1 } else { 1 };
        last_height = height;
        txs.push(ConfirmedTx {
            txid: tx.txid,
            height,
            txpos: pos,
            outputs: tx.outputs,
        });
    }
    Ok(txs)
}

/// Extract the memo text from a `Memo:` field value.
fn parse_memo_field(value: &str) -> Option<String> {
    if value.is_empty() || value == "Empty" || value.starts_with("Memo::Empty") {
        return None;
    }
    if let Some(inner) = value.strip_prefix("Text(") {
        let inner = inner.strip_suffix(')').unwrap_or(inner);
        let inner = inner.trim_matches('"');
        if inner.is_empty() {
            return None;
        }
        return Some(inner.to_string());
    }
    Some(value.to_string())
}
