//! Deterministic oracle output computation.
//!
//! Uses HMAC-SHA256 keyed by the oracle's secret to produce a 32-byte
//! pseudo-random output that is deterministic (same inputs = same output)
//! but unpredictable without the secret key.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use solana_sdk::pubkey::Pubkey;

type HmacSha256 = Hmac<Sha256>;

/// Compute the 32-byte oracle output for a randomness request.
///
/// ```text
/// output = HMAC-SHA256(secret, seed || request_slot_le || request_id_le || account)
/// ```
///
/// The caller seed keeps the oracle from pre-computing outputs, the slot and
/// id make each request unique, and the account binds the output to the
/// record the callback writes.
pub fn compute_randomness(
    hmac_secret: &[u8],
    seed: &[u8; 32],
    request_slot: u64,
    request_id: u64,
    account: &Pubkey,
) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(hmac_secret).expect("HMAC accepts keys of any size");

    mac.update(seed);
    mac.update(&request_slot.to_le_bytes());
    mac.update(&request_id.to_le_bytes());
    mac.update(account.as_ref());

    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}
