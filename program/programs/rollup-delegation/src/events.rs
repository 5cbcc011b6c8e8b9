//! Program events.
//!
//! Every successful state change appends one event to the [`EventLog`].
//! Off-chain services read the log through a cursor, either as typed values
//! or in wire form: `Program data: <base64(discriminator || body)>`, where the
//! discriminator is `sha256("event:<Name>")[..8]` and the body is a fixed
//! little-endian layout.

use base64::Engine;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::checkpoint::CommitCheckpoint;
use crate::state::AuthorityState;

/// Prefix of a wire-form event log line.
pub const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Compute an event discriminator: `sha256("event:<Name>")[..8]`.
pub fn event_discriminator(event_name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("event:{event_name}"));
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// Emitted when an owner creates their account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInitialized {
    pub account: Pubkey,
    pub owner: Pubkey,
}

/// Emitted when the owner mutates an undelegated account directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdated {
    pub account: Pubkey,
    pub data: u64,
}

/// Emitted on every delegate/undelegate so indexers can track residency
/// without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipChanged {
    pub account: Pubkey,
    pub previous: AuthorityState,
    pub current: AuthorityState,
}

/// Emitted when a validator issues a checkpoint on the ephemeral layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointCommitted {
    pub checkpoint: CommitCheckpoint,
}

/// Emitted when a checkpoint is written into the base-layer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointApplied {
    pub account: Pubkey,
    pub sequence: u64,
    pub data: u64,
}

/// Emitted when a new randomness request is created. The oracle backend
/// watches for these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessRequested {
    pub request_id: u64,
    pub account: Pubkey,
    pub requester: Pubkey,
    pub seed: [u8; 32],
    pub request_slot: u64,
}

/// Emitted when the oracle callback writes a value into an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessFulfilled {
    pub request_id: u64,
    pub account: Pubkey,
    pub random_value: u64,
}

/// Emitted when an account is closed and its storage reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountClosed {
    pub account: Pubkey,
    pub owner: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramEvent {
    AccountInitialized(AccountInitialized),
    AccountUpdated(AccountUpdated),
    OwnershipChanged(OwnershipChanged),
    CheckpointCommitted(CheckpointCommitted),
    CheckpointApplied(CheckpointApplied),
    RandomnessRequested(RandomnessRequested),
    RandomnessFulfilled(RandomnessFulfilled),
    AccountClosed(AccountClosed),
}

impl ProgramEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgramEvent::AccountInitialized(_) => "AccountInitialized",
            ProgramEvent::AccountUpdated(_) => "AccountUpdated",
            ProgramEvent::OwnershipChanged(_) => "OwnershipChanged",
            ProgramEvent::CheckpointCommitted(_) => "CheckpointCommitted",
            ProgramEvent::CheckpointApplied(_) => "CheckpointApplied",
            ProgramEvent::RandomnessRequested(_) => "RandomnessRequested",
            ProgramEvent::RandomnessFulfilled(_) => "RandomnessFulfilled",
            ProgramEvent::AccountClosed(_) => "AccountClosed",
        }
    }

    /// Encode as `discriminator || body`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = event_discriminator(self.name()).to_vec();
        match self {
            ProgramEvent::AccountInitialized(e) => {
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(e.owner.as_ref());
            }
            ProgramEvent::AccountUpdated(e) => {
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(&e.data.to_le_bytes());
            }
            ProgramEvent::OwnershipChanged(e) => {
                out.extend_from_slice(e.account.as_ref());
                encode_authority(&mut out, &e.previous);
                encode_authority(&mut out, &e.current);
            }
            ProgramEvent::CheckpointCommitted(e) => {
                out.extend_from_slice(&e.checkpoint.encode());
            }
            ProgramEvent::CheckpointApplied(e) => {
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(&e.sequence.to_le_bytes());
                out.extend_from_slice(&e.data.to_le_bytes());
            }
            ProgramEvent::RandomnessRequested(e) => {
                out.extend_from_slice(&e.request_id.to_le_bytes());
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(e.requester.as_ref());
                out.extend_from_slice(&e.seed);
                out.extend_from_slice(&e.request_slot.to_le_bytes());
            }
            ProgramEvent::RandomnessFulfilled(e) => {
                out.extend_from_slice(&e.request_id.to_le_bytes());
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(&e.random_value.to_le_bytes());
            }
            ProgramEvent::AccountClosed(e) => {
                out.extend_from_slice(e.account.as_ref());
                out.extend_from_slice(e.owner.as_ref());
            }
        }
        out
    }

    /// Render as a `Program data:` log line.
    pub fn to_log_line(&self) -> String {
        format!(
            "{PROGRAM_DATA_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(self.encode())
        )
    }
}

/// Authority tag byte followed by the validator key (zeroed when undelegated).
fn encode_authority(out: &mut Vec<u8>, authority: &AuthorityState) {
    match authority {
        AuthorityState::Undelegated => {
            out.push(0);
            out.extend_from_slice(&[0u8; 32]);
        }
        AuthorityState::Delegated(validator) => {
            out.push(1);
            out.extend_from_slice(validator.as_ref());
        }
    }
}

/// An event together with the slot of the operation that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub slot: u64,
    pub event: ProgramEvent,
}

/// Event log read through positional cursors.
///
/// Cursors are absolute positions. Entries a reader has consumed can be
/// discarded with [`EventLog::discard_before`] without invalidating cursors.
#[derive(Debug, Default)]
pub struct EventLog {
    /// Absolute position of `entries[0]`.
    base: usize,
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, slot: u64, event: ProgramEvent) {
        tracing::debug!(slot, event = event.name(), "emit");
        self.entries.push(LoggedEvent { slot, event });
    }

    /// Cursor positioned after the newest entry.
    pub fn cursor(&self) -> usize {
        self.base + self.entries.len()
    }

    /// Events at or after `cursor` that are still retained. Cursors past the
    /// end yield nothing.
    pub fn since(&self, cursor: usize) -> &[LoggedEvent] {
        let start = cursor.saturating_sub(self.base);
        self.entries.get(start..).unwrap_or(&[])
    }

    /// Drop every entry before `cursor`. Returns how many were dropped.
    pub fn discard_before(&mut self, cursor: usize) -> usize {
        let count = cursor.saturating_sub(self.base).min(self.entries.len());
        self.entries.drain(..count);
        self.base += count;
        count
    }

    /// Number of entries currently held.
    pub fn retained(&self) -> usize {
        self.entries.len()
    }

    /// Wire-form log lines at or after `cursor`.
    pub fn log_lines_since(&self, cursor: usize) -> Vec<String> {
        self.since(cursor)
            .iter()
            .map(|entry| entry.event.to_log_line())
            .collect()
    }
}
