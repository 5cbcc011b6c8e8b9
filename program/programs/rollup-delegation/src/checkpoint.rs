//! Signed, sequenced commit records relayed from the ephemeral layer to the
//! base layer.
//!
//! ## Wire layout
//!
//! ```text
//! [0..32]     account       (Pubkey)
//! [32..64]    validator     (Pubkey)
//! [64..72]    sequence      (u64 LE)
//! [72..80]    data          (u64 LE)
//! [80..112]   payload_hash  (sha256(data LE))
//! [112..176]  signature     (Ed25519, by validator)
//! ```
//!
//! The validator signs
//! `"rollup-checkpoint" || account || validator || sequence LE || payload_hash`.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::errors::{DelegationError, Result};

/// Domain separator prepended to every signed checkpoint message.
const CHECKPOINT_DOMAIN: &[u8] = b"rollup-checkpoint";

/// Hash of the checkpoint payload.
pub fn payload_hash(data: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.to_le_bytes());
    let hash = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    out
}

/// Build the message a validator signs for a checkpoint.
pub fn signing_message(
    account: &Pubkey,
    validator: &Pubkey,
    sequence: u64,
    payload_hash: &[u8; 32],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(CHECKPOINT_DOMAIN.len() + 32 + 32 + 8 + 32);
    message.extend_from_slice(CHECKPOINT_DOMAIN);
    message.extend_from_slice(account.as_ref());
    message.extend_from_slice(validator.as_ref());
    message.extend_from_slice(&sequence.to_le_bytes());
    message.extend_from_slice(payload_hash);
    message
}

/// Snapshot of ephemeral account state at a given sequence number.
///
/// Immutable once produced; applied at most once on the base layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCheckpoint {
    pub account: Pubkey,
    pub validator: Pubkey,
    pub sequence: u64,
    /// Account data after the committed mutation.
    pub data: u64,
    pub payload_hash: [u8; 32],
    pub signature: Signature,
}

impl CommitCheckpoint {
    pub const ENCODED_LEN: usize = 32 + 32 + 8 + 8 + 32 + 64;

    /// Produce a checkpoint signed by `validator`.
    pub fn sign(validator: &Keypair, account: Pubkey, sequence: u64, data: u64) -> Self {
        let validator_key = validator.pubkey();
        let payload_hash = payload_hash(data);
        let message = signing_message(&account, &validator_key, sequence, &payload_hash);
        let signature = validator.sign_message(&message);

        Self {
            account,
            validator: validator_key,
            sequence,
            data,
            payload_hash,
            signature,
        }
    }

    /// Check the payload hash and the validator's signature.
    pub fn verify(&self) -> Result<()> {
        if self.payload_hash != payload_hash(self.data) {
            return Err(DelegationError::MalformedCheckpoint);
        }

        let message = signing_message(
            &self.account,
            &self.validator,
            self.sequence,
            &self.payload_hash,
        );
        if !self.signature.verify(self.validator.as_ref(), &message) {
            return Err(DelegationError::InvalidSignature);
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(self.account.as_ref());
        out.extend_from_slice(self.validator.as_ref());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.data.to_le_bytes());
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(self.signature.as_ref());
        out
    }

    /// Decode a checkpoint. Does not verify the signature.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(DelegationError::MalformedCheckpoint);
        }

        let account = Pubkey::try_from(&bytes[0..32])
            .map_err(|_| DelegationError::MalformedCheckpoint)?;
        let validator = Pubkey::try_from(&bytes[32..64])
            .map_err(|_| DelegationError::MalformedCheckpoint)?;
        let sequence = read_u64(&bytes[64..72])?;
        let data = read_u64(&bytes[72..80])?;
        let mut payload_hash = [0u8; 32];
        payload_hash.copy_from_slice(&bytes[80..112]);
        let signature = Signature::try_from(&bytes[112..176])
            .map_err(|_| DelegationError::MalformedCheckpoint)?;

        let checkpoint = Self {
            account,
            validator,
            sequence,
            data,
            payload_hash,
            signature,
        };
        if checkpoint.payload_hash != self::payload_hash(checkpoint.data) {
            return Err(DelegationError::MalformedCheckpoint);
        }
        Ok(checkpoint)
    }
}

fn read_u64(bytes: &[u8]) -> Result<u64> {
    bytes
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(|_| DelegationError::MalformedCheckpoint)
}
