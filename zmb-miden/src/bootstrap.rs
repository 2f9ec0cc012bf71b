//! One-time rollup identity setup: the wrapped-asset faucet and wallet
//! accounts for server-custodied onboarding.

use std::path::Path;
use std::sync::Arc;

use miden_client::{
    account::component::{BasicFungibleFaucet, BasicWallet},
    auth::AuthSecretKey,
    builder::ClientBuilder,
    keystore::FilesystemKeyStore,
    rpc::{Endpoint, GrpcClient},
};
use miden_client_sqlite_store::ClientBuilderSqliteExt;
use miden_lib::account::auth::AuthRpoFalcon512;
use miden_objects::{
    account::{AccountBuilder, AccountId, AccountStorageMode, AccountType},
    asset::TokenSymbol,
    Felt,
};
use rand::{rng, rngs::StdRng, RngCore};
use tracing::info;

use crate::MidenError;

/// Wrapped-asset denomination: mirrors the source coin's symbol and
/// precision (8 decimals).
pub const WRAPPED_SYMBOL: &str = "TAZ";
pub const WRAPPED_DECIMALS: u8 = 8;
pub const WRAPPED_MAX_SUPPLY: u64 = 1_000_000_000_000_000_000;

async fn build_client(
    keystore: Arc<FilesystemKeyStore<StdRng>>,
    store_path: &Path,
    rpc_url: &str,
) -> Result<miden_client::Client<FilesystemKeyStore<StdRng>>, MidenError> {
    let endpoint = Endpoint::try_from(rpc_url)
        .map_err(|e| MidenError::Client(format!("failed to parse RPC endpoint: {e}")))?;
    let rpc_client = Arc::new(GrpcClient::new(&endpoint, 30_000));

    ClientBuilder::new()
        .rpc(rpc_client)
        .sqlite_store(store_path.to_path_buf())
        .authenticator(keystore)
        .build()
        .await
        .map_err(|e| MidenError::Client(format!("failed to build client: {e}")))
}

fn open_keystore(path: &Path) -> Result<Arc<FilesystemKeyStore<StdRng>>, MidenError> {
    Ok(Arc::new(FilesystemKeyStore::<StdRng>::new(
        path.to_path_buf(),
    )
    .map_err(|e| MidenError::Client(format!("failed to open keystore: {e}")))?))
}

/// Create the wrapped-asset faucet account. The account deploys on-chain
/// automatically with its first mint.
pub async fn create_faucet(
    keystore_path: &Path,
    store_path: &Path,
    rpc_url: &str,
) -> Result<AccountId, MidenError> {
    let keystore = open_keystore(keystore_path)?;
    let mut client = build_client(keystore.clone(), store_path, rpc_url).await?;

    let mut init_seed = [0u8; 32];
    rng().fill_bytes(&mut init_seed);

    let symbol = TokenSymbol::new(WRAPPED_SYMBOL)
        .map_err(|e| MidenError::Client(format!("invalid token symbol: {e}")))?;
    let key_pair = AuthSecretKey::new_rpo_falcon512();

    let faucet = AccountBuilder::new(init_seed)
        .account_type(AccountType::FungibleFaucet)
        .storage_mode(AccountStorageMode::Public)
        .with_auth_component(AuthRpoFalcon512::new(key_pair.public_key().to_commitment()))
        .with_component(
            BasicFungibleFaucet::new(symbol, WRAPPED_DECIMALS, Felt::new(WRAPPED_MAX_SUPPLY))
                .map_err(|e| MidenError::Client(format!("failed to create faucet component: {e}")))?,
        )
        .build()
        .map_err(|e| MidenError::Client(format!("failed to build faucet account: {e}")))?;

    client
        .add_account(&faucet, false)
        .await
        .map_err(|e| MidenError::Client(format!("failed to add faucet account: {e}")))?;
    keystore
        .add_key(&key_pair)
        .map_err(|e| MidenError::Client(format!("failed to add key to keystore: {e}")))?;
    client
        .sync_state()
        .await
        .map_err(|e| MidenError::Rpc(format!("failed to sync state: {e}")))?;

    info!(faucet = %faucet.id().to_hex(), "created wrapped-asset faucet");
    Ok(faucet.id())
}

/// Create a private wallet account in the bridge's client store. Used for
/// server-custodied onboarding; the primary flow keeps keys in the
/// browser's rollup store.
pub async fn create_wallet_account(
    keystore_path: &Path,
    store_path: &Path,
    rpc_url: &str,
) -> Result<AccountId, MidenError> {
    let keystore = open_keystore(keystore_path)?;
    let mut client = build_client(keystore.clone(), store_path, rpc_url).await?;

    let mut init_seed = [0u8; 32];
    rng().fill_bytes(&mut init_seed);
    let key_pair = AuthSecretKey::new_rpo_falcon512();

    let account = AccountBuilder::new(init_seed)
        .account_type(AccountType::RegularAccountUpdatableCode)
        .storage_mode(AccountStorageMode::Private)
        .with_auth_component(AuthRpoFalcon512::new(key_pair.public_key().to_commitment()))
        .with_component(BasicWallet)
        .build()
        .map_err(|e| MidenError::Client(format!("failed to build account: {e}")))?;

    client
        .add_account(&account, false)
        .await
        .map_err(|e| MidenError::Client(format!("failed to add account: {e}")))?;
    keystore
        .add_key(&key_pair)
        .map_err(|e| MidenError::Client(format!("failed to add key to keystore: {e}")))?;

    info!(account = %account.id().to_hex(), "created wallet account");
    Ok(account.id())
}
