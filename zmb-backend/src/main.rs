//! zmb-backend service binary.
//!
//! Wires the bridge together: store, chain clients, the two relayer tasks,
//! and the HTTP facade. Shutdown is graceful — ctrl-c stops the facade,
//! flips the relayers' shutdown signal, and waits for in-flight ticks to
//! finish their current store mark.

use std::sync::Arc;

use anyhow::{Context, Result};
use miden_objects::account::AccountId;
use tokio::net::TcpListener;
use tracing::info;
use zmb_backend::config::BridgeConfig;
use zmb_backend::{app_router, cors_layer, AppState};
use zmb_common::parse_account_id;
use zmb_miden::{bootstrap, client::RollupClient, MidenRollup};
use zmb_relayer::{
    shutdown_channel, DepositRelayer, DepositRelayerConfig, ExitRelayer, ExitRelayerConfig,
};
use zmb_store::BridgeStore;
use zmb_zcash::{devtool::DevtoolWallet, ZcashChain};

const FAUCET_ORIGIN_NETWORK: &str = "zcash_testnet";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zmb_backend=info,zmb_relayer=info,zmb_store=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = BridgeConfig::from_env()?;

    info!("starting zmb-backend");
    info!("rollup rpc: {}", config.miden_rpc_url);
    info!("pool address: {}", config.bridge_pool_addr);

    if let Some(parent) = config.bridge_db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = Arc::new(BridgeStore::open(&config.bridge_db_path)?);

    let bridge_account_id = parse_account_id(&config.bridge_account_id)
        .context("BRIDGE_ACCOUNT_ID is not a valid Miden account id")?;
    let faucet_id = resolve_faucet(&config, &store).await?;
    info!("wrapped-asset faucet: {}", faucet_id.to_hex());

    let zcash: Arc<dyn ZcashChain> = Arc::new(DevtoolWallet::new(
        config.zcash_wallet_dir.clone(),
        config.zcash_devtool_dir.clone(),
        config.bridge_pool_addr.clone(),
        config.zcash_server.clone(),
    ));
    let miden: Arc<dyn MidenRollup> = Arc::new(RollupClient::new(
        config.miden_rpc_url.clone(),
        config.miden_keystore_path.clone(),
        config.miden_store_path.clone(),
        faucet_id,
        bridge_account_id,
        config.exit_tag,
    ));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let deposit_relayer = DepositRelayer::new(
        zcash.clone(),
        miden.clone(),
        store.clone(),
        DepositRelayerConfig {
            tick: std::time::Duration::from_secs(config.zcash_relayer_interval_secs),
            pool_address: config.bridge_pool_addr.clone(),
            max_mint_attempts: config.max_mint_attempts,
            min_deposit_base: config.min_deposit_base,
        },
    );
    let exit_relayer = ExitRelayer::new(
        zcash.clone(),
        miden.clone(),
        store.clone(),
        ExitRelayerConfig {
            tick: std::time::Duration::from_secs(config.miden_relayer_interval_secs),
        },
    );

    let deposit_task = tokio::spawn(deposit_relayer.run(shutdown_rx.clone()));
    let exit_task = tokio::spawn(exit_relayer.run(shutdown_rx));

    let state = AppState {
        store,
        zcash,
        miden,
    };
    let app = app_router(state).layer(cors_layer());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("shutting down");
    shutdown_tx.send(true).ok();
    deposit_task.await.ok();
    exit_task.await.ok();
    Ok(())
}

/// Resolve the wrapped-asset faucet: configured id, then the store's
/// record, then a fresh faucet persisted for the next start.
async fn resolve_faucet(config: &BridgeConfig, store: &BridgeStore) -> Result<AccountId> {
    if let Some(configured) = &config.faucet_id {
        return parse_account_id(configured).context("FAUCET_ID is not a valid account id");
    }
    if let Some(stored) = store.faucet_for(FAUCET_ORIGIN_NETWORK)? {
        return parse_account_id(&stored).context("stored faucet id is corrupt");
    }

    info!("no faucet configured, creating one");
    let faucet_id = bootstrap::create_faucet(
        &config.miden_keystore_path,
        &config.miden_store_path,
        &config.miden_rpc_url,
    )
    .await
    .context("failed to create wrapped-asset faucet")?;
    store.store_faucet(FAUCET_ORIGIN_NETWORK, &faucet_id.to_hex())?;
    Ok(faucet_id)
}
