//! Note tags and wire codecs for bridge notes.
//!
//! Deposit notes are private P2IDH notes minted by the wrapped-asset
//! faucet. Exit notes are public notes addressed to the bridge account,
//! tagged with the exit use case and carrying the destination shielded
//! address packed into their inputs.

use miden_lib::note::utils::build_p2id_recipient;
use miden_objects::{
    account::AccountId,
    asset::{Asset, FungibleAsset},
    note::{Note, NoteAssets, NoteExecutionHint, NoteMetadata, NoteTag, NoteType},
    Felt, FieldElement, Word,
};

use crate::MidenError;

/// NoteTag use case for deposit notes bridged into the rollup.
pub const DEPOSIT_USECASE: u16 = 14594;

/// Default NoteTag use case for exit notes (configurable at startup).
pub const DEFAULT_EXIT_USECASE: u16 = 20050;

/// Address payloads are packed 7 bytes per field element so every limb
/// stays far below the field modulus.
const BYTES_PER_FELT: usize = 7;

/// Longest destination address the codec accepts; unified addresses are
/// just over 200 characters.
pub const MAX_ADDRESS_BYTES: usize = 256;

pub fn deposit_note_tag() -> Result<NoteTag, MidenError> {
    NoteTag::for_local_use_case(DEPOSIT_USECASE, 0)
        .map_err(|e| MidenError::Note(format!("invalid deposit tag: {e:?}")))
}

pub fn exit_note_tag(use_case: u16) -> Result<NoteTag, MidenError> {
    NoteTag::for_local_use_case(use_case, 0)
        .map_err(|e| MidenError::Note(format!("invalid exit tag: {e:?}")))
}

/// Pack a destination shielded address into note inputs:
/// `[byte_len, chunk, chunk, …]`, 7 address bytes per chunk, big-endian
/// within the chunk.
pub fn encode_exit_inputs(dest_address: &str) -> Result<Vec<Felt>, MidenError> {
    let bytes = dest_address.as_bytes();
    if bytes.is_empty() {
        return Err(MidenError::Note("empty destination address".into()));
    }
    if bytes.len() > MAX_ADDRESS_BYTES {
        return Err(MidenError::Note(format!(
            "destination address too long: {} bytes",
            bytes.len()
        )));
    }

    let mut inputs = Vec::with_capacity(1 + bytes.len().div_ceil(BYTES_PER_FELT));
    inputs.push(Felt::new(bytes.len() as u64));
    for chunk in bytes.chunks(BYTES_PER_FELT) {
        let mut value = 0u64;
        for &b in chunk {
            value = (value << 8) | b as u64;
        }
        inputs.push(Felt::new(value));
    }
    Ok(inputs)
}

/// Recover the destination address from exit-note inputs.
pub fn decode_exit_inputs(inputs: &[Felt]) -> Result<String, MidenError> {
    let len = inputs
        .first()
        .ok_or_else(|| MidenError::Note("exit note has no inputs".into()))?
        .as_int() as usize;
    if len == 0 || len > MAX_ADDRESS_BYTES {
        return Err(MidenError::Note(format!(
            "exit note address length {len} out of range"
        )));
    }

    let chunks = len.div_ceil(BYTES_PER_FELT);
    if inputs.len() < 1 + chunks {
        return Err(MidenError::Note(format!(
            "exit note has {} inputs, need {}",
            inputs.len(),
            1 + chunks
        )));
    }

    let mut bytes = Vec::with_capacity(len);
    let mut remaining = len;
    for felt in &inputs[1..1 + chunks] {
        let take = remaining.min(BYTES_PER_FELT);
        let value = felt.as_int();
        for i in (0..take).rev() {
            bytes.push(((value >> (8 * i)) & 0xff) as u8);
        }
        remaining -= take;
    }

    String::from_utf8(bytes)
        .map_err(|_| MidenError::Note("exit note address is not valid UTF-8".into()))
}

/// Amount carried by a note: the value of its first fungible asset.
pub fn note_amount(assets: &NoteAssets) -> Option<u64> {
    assets.iter().find_map(|asset| match asset {
        Asset::Fungible(fungible) => Some(fungible.amount()),
        _ => None,
    })
}

/// Rebuild the private P2IDH deposit note from its public parameters.
/// Used by the claim-mode fallback: the note the bridge minted is fully
/// determined by `(account_id, secret, faucet_id, amount)`.
pub fn reconstruct_deposit_note(
    account_id: AccountId,
    secret: Word,
    faucet_id: AccountId,
    amount_base: u64,
) -> Result<Note, MidenError> {
    let recipient = build_p2id_recipient(account_id, secret)
        .map_err(|e| MidenError::Note(format!("failed to build recipient: {e:?}")))?;

    let asset = FungibleAsset::new(faucet_id, amount_base)
        .map_err(|e| MidenError::Note(format!("failed to create asset: {e}")))?;
    let assets = NoteAssets::new(vec![asset.into()])
        .map_err(|e| MidenError::Note(format!("failed to create note assets: {e}")))?;

    let metadata = NoteMetadata::new(
        faucet_id,
        NoteType::Private,
        deposit_note_tag()?,
        NoteExecutionHint::always(),
        Felt::ZERO,
    )
    .map_err(|e| MidenError::Note(format!("failed to create metadata: {e}")))?;

    Ok(Note::new(assets, metadata, recipient))
}
