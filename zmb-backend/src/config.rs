//! Bridge configuration.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Everything the bridge engine reads from the environment. Missing
/// required variables abort startup; the supervisor restarts us once the
/// deployment is fixed.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Deposit relayer tick, seconds.
    pub zcash_relayer_interval_secs: u64,
    /// Exit relayer tick, seconds.
    pub miden_relayer_interval_secs: u64,
    /// The published unified shielded pool address.
    pub bridge_pool_addr: String,
    /// Wrapped-asset faucet account id. Created at startup when unset.
    pub faucet_id: Option<String>,
    /// The Miden account owning exit-note reception.
    pub bridge_account_id: String,
    /// Exit note use-case tag.
    pub exit_tag: u16,
    /// Mint attempts before a deposit is quarantined.
    pub max_mint_attempts: u32,
    /// Deposits below this many base units are quarantined. Zero mints
    /// everything.
    pub min_deposit_base: u64,
    /// Rollup RPC endpoint.
    pub miden_rpc_url: String,
    /// Bridge state database.
    pub bridge_db_path: PathBuf,
    /// Miden client store database.
    pub miden_store_path: PathBuf,
    /// Miden keystore directory.
    pub miden_keystore_path: PathBuf,
    /// Devtool wallet directory holding the pool.
    pub zcash_wallet_dir: PathBuf,
    /// Checkout of zcash-devtool to drive the wallet with.
    pub zcash_devtool_dir: PathBuf,
    /// Lightwalletd server alias passed to the devtool.
    pub zcash_server: String,
    /// HTTP facade port.
    pub port: u16,
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn path_or(name: &str, default: &str) -> PathBuf {
    env::var(name).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bridge_pool_addr = env::var("BRIDGE_POOL_ADDR")
            .context("BRIDGE_POOL_ADDR must be set to the bridge's shielded pool address")?;
        let bridge_account_id = env::var("BRIDGE_ACCOUNT_ID")
            .context("BRIDGE_ACCOUNT_ID must be set to the bridge's Miden account id")?;
        let faucet_id = env::var("FAUCET_ID").ok().filter(|v| !v.trim().is_empty());

        let miden_rpc_url = env::var("MIDEN_RPC_URL")
            .unwrap_or_else(|_| "https://rpc.testnet.miden.io".to_string());
        let zcash_server = env::var("ZCASH_SERVER").unwrap_or_else(|_| "zecrocks".to_string());

        Ok(Self {
            zcash_relayer_interval_secs: parsed_or("ZCASH_RELAYER_INTERVAL_SECS", 5),
            miden_relayer_interval_secs: parsed_or("MIDEN_RELAYER_INTERVAL_SECS", 10),
            bridge_pool_addr,
            faucet_id,
            bridge_account_id,
            exit_tag: parsed_or("EXIT_TAG", 20050),
            max_mint_attempts: parsed_or("MAX_MINT_ATTEMPTS", 8),
            min_deposit_base: parsed_or("MIN_DEPOSIT_BASE", 0),
            miden_rpc_url,
            bridge_db_path: path_or("BRIDGE_DB_PATH", "data/bridge.db"),
            miden_store_path: path_or("MIDEN_STORE_PATH", "data/miden_store.sqlite3"),
            miden_keystore_path: path_or("MIDEN_KEYSTORE_PATH", "keystore"),
            zcash_wallet_dir: path_or("ZCASH_WALLET_DIR", "wallet/bridge_wallet"),
            zcash_devtool_dir: path_or("ZCASH_DEVTOOL_DIR", "wallet/zcash-devtool"),
            zcash_server,
            port: parsed_or("PORT", 8001),
        })
    }
}
