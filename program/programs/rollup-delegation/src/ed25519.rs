use solana_sdk::ed25519_program;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::errors::{DelegationError, Result};

/// Size of the fixed header: count + padding + 7 u16 offsets.
const DATA_START: usize = 2 + 7 * 2;

/// Marker for "this data lives in the same instruction".
const SELF_INDEX: u16 = u16::MAX;

/// Message the oracle signs for a fulfillment: `request_id (8 LE) || randomness (32)`.
pub fn fulfillment_message(request_id: u64, randomness: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(40);
    message.extend_from_slice(&request_id.to_le_bytes());
    message.extend_from_slice(randomness);
    message
}

/// Build a native Ed25519 signature-verify instruction over `message`.
pub fn build_signature_proof(keypair: &Keypair, message: &[u8]) -> Instruction {
    let signature = keypair.sign_message(message);
    let pubkey = keypair.pubkey();

    let public_key_offset = DATA_START as u16;
    let signature_offset = (DATA_START + 32) as u16;
    let message_data_offset = (DATA_START + 32 + 64) as u16;
    let message_data_size = message.len() as u16;

    let mut data = Vec::with_capacity(DATA_START + 32 + 64 + message.len());
    data.push(1u8); // num_signatures
    data.push(0u8); // padding
    data.extend_from_slice(&signature_offset.to_le_bytes());
    data.extend_from_slice(&SELF_INDEX.to_le_bytes());
    data.extend_from_slice(&public_key_offset.to_le_bytes());
    data.extend_from_slice(&SELF_INDEX.to_le_bytes());
    data.extend_from_slice(&message_data_offset.to_le_bytes());
    data.extend_from_slice(&message_data_size.to_le_bytes());
    data.extend_from_slice(&SELF_INDEX.to_le_bytes());
    data.extend_from_slice(&pubkey.to_bytes());
    data.extend_from_slice(signature.as_ref());
    data.extend_from_slice(message);

    Instruction {
        program_id: ed25519_program::id(),
        accounts: vec![],
        data,
    }
}

/// Verify that `ix` is a well-formed Ed25519 signature-verify instruction in
/// which `expected_pubkey` signed `request_id || randomness`.
///
/// ## Instruction data layout
///
/// ```text
/// [0]       num_signatures (u8), must be 1
/// [1]       padding (u8)
/// [2..16]   7 x u16 LE: signature_offset, signature_instruction_index,
///             public_key_offset, public_key_instruction_index,
///             message_data_offset, message_data_size,
///             message_instruction_index
/// [16..]    public_key (32) + signature (64) + message
/// ```
///
/// All `*_instruction_index` fields must be `0xFFFF`.
pub fn verify_signature_proof(
    ix: &Instruction,
    expected_pubkey: &Pubkey,
    request_id: u64,
    randomness: &[u8; 32],
) -> Result<()> {
    if ix.program_id != ed25519_program::id() {
        return Err(DelegationError::InvalidSignatureProof);
    }

    let data = &ix.data;
    if data.len() < DATA_START || data[0] != 1 {
        return Err(DelegationError::InvalidSignatureProof);
    }

    let read = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);
    let sig_offset = read(2) as usize;
    let sig_ix_index = read(4);
    let pubkey_offset = read(6) as usize;
    let pubkey_ix_index = read(8);
    let msg_offset = read(10) as usize;
    let msg_size = read(12) as usize;
    let msg_ix_index = read(14);

    if sig_ix_index != SELF_INDEX || pubkey_ix_index != SELF_INDEX || msg_ix_index != SELF_INDEX {
        return Err(DelegationError::InvalidSignatureProof);
    }

    let pubkey_bytes = slice(data, pubkey_offset, 32)?;
    if pubkey_bytes != expected_pubkey.as_ref() {
        return Err(DelegationError::PermissionDenied);
    }

    let message = slice(data, msg_offset, msg_size)?;
    if message != fulfillment_message(request_id, randomness).as_slice() {
        return Err(DelegationError::InvalidSignatureProof);
    }

    let signature = Signature::try_from(slice(data, sig_offset, 64)?)
        .map_err(|_| DelegationError::InvalidSignatureProof)?;
    if !signature.verify(pubkey_bytes, message) {
        return Err(DelegationError::InvalidSignature);
    }

    Ok(())
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    data.get(offset..offset + len)
        .ok_or(DelegationError::InvalidSignatureProof)
}
