//! gRPC-backed rollup client.
//!
//! Each call builds a fresh `miden-client` over the shared on-disk client
//! store and keystore. Transaction-building calls hold the bridge account
//! lock for their duration; the rollup enforces nonce ordering on account
//! state updates, so submissions must not interleave.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use miden_client::{
    builder::ClientBuilder,
    keystore::FilesystemKeyStore,
    rpc::{Endpoint, GrpcClient},
    transaction::{OutputNote, TransactionRequestBuilder},
};
use miden_client_sqlite_store::ClientBuilderSqliteExt;
use miden_objects::{
    account::AccountId,
    asset::FungibleAsset,
    note::{NoteAssets, NoteExecutionHint, NoteMetadata, NoteType, PartialNote},
    Felt, FieldElement, Word,
};
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zmb_common::Secret;

use crate::notes::{deposit_note_tag, exit_note_tag, note_amount, reconstruct_deposit_note};
use crate::{decode_exit_note, ExitNote, MidenError, MidenRollup};

const RPC_TIMEOUT_MS: u64 = 30_000;

type Client = miden_client::Client<FilesystemKeyStore<StdRng>>;

/// Rollup client owning the bridge's Miden-side identities.
pub struct RollupClient {
    rpc_url: String,
    keystore_path: PathBuf,
    store_path: PathBuf,
    faucet_id: AccountId,
    bridge_account_id: AccountId,
    exit_use_case: u16,
    /// Serialises transaction building across the bridge's accounts.
    tx_lock: Mutex<()>,
}

impl RollupClient {
    pub fn new(
        rpc_url: String,
        keystore_path: PathBuf,
        store_path: PathBuf,
        faucet_id: AccountId,
        bridge_account_id: AccountId,
        exit_use_case: u16,
    ) -> Self {
        Self {
            rpc_url,
            keystore_path,
            store_path,
            faucet_id,
            bridge_account_id,
            exit_use_case,
            tx_lock: Mutex::new(()),
        }
    }

    async fn build_client(&self) -> Result<Client, MidenError> {
        let endpoint = Endpoint::try_from(self.rpc_url.as_str())
            .map_err(|e| MidenError::Client(format!("failed to parse RPC endpoint: {e}")))?;
        let rpc_client = Arc::new(GrpcClient::new(&endpoint, RPC_TIMEOUT_MS));
        let keystore = Arc::new(
            FilesystemKeyStore::<StdRng>::new(self.keystore_path.clone())
                .map_err(|e| MidenError::Client(format!("failed to open keystore: {e}")))?,
        );

        ClientBuilder::new()
            .rpc(rpc_client)
            .sqlite_store(self.store_path.clone())
            .authenticator(keystore)
            .build()
            .await
            .map_err(|e| MidenError::Client(format!("failed to build client: {e}")))
    }

    async fn synced_client(&self) -> Result<Client, MidenError> {
        let mut client = self.build_client().await?;
        client
            .add_note_tag(deposit_note_tag()?)
            .await
            .map_err(|e| MidenError::Client(format!("failed to add note tag: {e}")))?;
        client
            .add_note_tag(exit_note_tag(self.exit_use_case)?)
            .await
            .map_err(|e| MidenError::Client(format!("failed to add note tag: {e}")))?;
        client
            .sync_state()
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to sync state: {e}")))?;
        Ok(client)
    }
}

#[async_trait]
impl MidenRollup for RollupClient {
    async fn sync(&self) -> Result<(), MidenError> {
        self.synced_client().await?;
        Ok(())
    }

    async fn mint_p2idh(
        &self,
        recipient_hash: Word,
        amount_base: u64,
    ) -> Result<String, MidenError> {
        let _guard = self.tx_lock.lock().await;
        let mut client = self.synced_client().await?;

        let asset = FungibleAsset::new(self.faucet_id, amount_base)
            .map_err(|e| MidenError::Note(format!("failed to create asset: {e}")))?;
        let assets = NoteAssets::new(vec![asset.into()])
            .map_err(|e| MidenError::Note(format!("failed to create note assets: {e}")))?;
        let metadata = NoteMetadata::new(
            self.faucet_id,
            NoteType::Private,
            deposit_note_tag()?,
            NoteExecutionHint::always(),
            Felt::ZERO,
        )
        .map_err(|e| MidenError::Note(format!("failed to create metadata: {e}")))?;

        // The recipient hash is all the faucet needs: the full recipient
        // (serial number, script, inputs) stays with the depositor.
        let tx_request = TransactionRequestBuilder::new()
            .own_output_notes(vec![OutputNote::Partial(PartialNote::new(
                metadata,
                recipient_hash.into(),
                assets,
            ))])
            .build()
            .map_err(|e| MidenError::Note(format!("failed to build transaction: {e}")))?;

        let tx_result = client
            .execute_transaction(self.faucet_id, tx_request)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to execute transaction: {e}")))?;
        let proven_tx = client
            .prove_transaction(&tx_result)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to prove transaction: {e}")))?;
        let submission_height = client
            .submit_proven_transaction(proven_tx, &tx_result)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to submit transaction: {e}")))?;
        client
            .apply_transaction(&tx_result, submission_height)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to apply transaction: {e}")))?;

        let note_id = tx_result.created_notes().get_note(0).id().to_hex();
        let tx_id = tx_result.executed_transaction().id().to_hex();
        info!(note_id, tx_id, amount_base, "minted deposit note");
        Ok(note_id)
    }

    async fn list_consumable_exit_notes(&self) -> Result<Vec<ExitNote>, MidenError> {
        let mut client = self.synced_client().await?;
        let exit_tag = exit_note_tag(self.exit_use_case)?;

        let consumable = client
            .get_consumable_notes(Some(self.bridge_account_id))
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to get consumable notes: {e}")))?;

        let mut exits = Vec::new();
        for (record, _) in consumable.iter() {
            let Some(metadata) = record.metadata() else {
                continue;
            };
            if metadata.tag() != exit_tag {
                continue;
            }
            let details = record.details();
            let assets = record.assets();
            match decode_exit_note(
                record.id().to_hex(),
                details.inputs().values(),
                note_amount(assets),
            ) {
                Ok(exit) => exits.push(exit),
                Err(e) => {
                    // Malformed exit notes stay consumable; the operator
                    // decides what to do with them.
                    tracing::warn!(note = %record.id().to_hex(), "skipping exit note: {e}");
                }
            }
        }
        debug!(count = exits.len(), "listed consumable exit notes");
        Ok(exits)
    }

    async fn consume_note(&self, note_id: &str) -> Result<String, MidenError> {
        let _guard = self.tx_lock.lock().await;
        let mut client = self.synced_client().await?;

        let consumable = client
            .get_consumable_notes(Some(self.bridge_account_id))
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to get consumable notes: {e}")))?;
        let record_id = consumable
            .iter()
            .map(|(record, _)| record.id())
            .find(|id| id.to_hex() == note_id)
            .ok_or_else(|| MidenError::Note(format!("note {note_id} is not consumable")))?;

        let tx_request = TransactionRequestBuilder::new()
            .build_consume_notes(vec![record_id])
            .map_err(|e| MidenError::Note(format!("failed to build transaction: {e}")))?;

        let tx_id = client
            .submit_new_transaction(self.bridge_account_id, tx_request)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to submit transaction: {e}")))?;
        let tx_hex = tx_id.to_hex();
        info!(note_id, tx_id = tx_hex, "consumed exit note");
        Ok(tx_hex)
    }

    async fn vault_balance(&self, account_id: AccountId) -> Result<u64, MidenError> {
        let mut client = self.synced_client().await?;

        // Private accounts live in the client store, not behind the RPC;
        // an absent record means the account was never loaded here.
        let record = client
            .get_account(account_id)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to get account: {e}")))?
            .ok_or_else(|| {
                MidenError::AccountNotReady(format!(
                    "account {} not found in client store",
                    account_id.to_hex()
                ))
            })?;

        record
            .account()
            .vault()
            .get_balance(self.faucet_id)
            .map_err(|e| MidenError::Client(format!("failed to read vault balance: {e:?}")))
    }

    async fn bridge_balance(&self) -> Result<u64, MidenError> {
        self.vault_balance(self.bridge_account_id).await
    }

    async fn claim_deposit_note(
        &self,
        account_id: AccountId,
        secret: &Secret,
        amount_base: u64,
    ) -> Result<(String, String), MidenError> {
        let _guard = self.tx_lock.lock().await;
        let mut client = self.synced_client().await?;

        let secret_word = secret
            .to_word()
            .map_err(|e| MidenError::Note(e.to_string()))?;
        let note = reconstruct_deposit_note(account_id, secret_word, self.faucet_id, amount_base)?;
        let note_id = note.id().to_hex();

        if client
            .get_account(account_id)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to get account: {e}")))?
            .is_none()
        {
            return Err(MidenError::AccountNotReady(format!(
                "account {} not found in client store",
                account_id.to_hex()
            )));
        }

        let tx_request = TransactionRequestBuilder::new()
            .unauthenticated_input_notes([(note, Some(secret_word.into()))])
            .build()
            .map_err(|e| MidenError::Note(format!("failed to build transaction: {e}")))?;

        let tx_id = client
            .submit_new_transaction(account_id, tx_request)
            .await
            .map_err(|e| MidenError::Rpc(format!("failed to submit transaction: {e}")))?;
        let tx_hex = tx_id.to_hex();
        info!(note_id, tx_id = tx_hex, "consumed deposit note on user's behalf");
        Ok((tx_hex, note_id))
    }

    async fn create_account(&self) -> Result<AccountId, MidenError> {
        let _guard = self.tx_lock.lock().await;
        crate::bootstrap::create_wallet_account(
            &self.keystore_path,
            &self.store_path,
            &self.rpc_url,
        )
        .await
    }
}
