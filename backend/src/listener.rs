//! Event listener for the delegation program.
//!
//! Two complementary strategies ensure nothing is missed:
//!
//! 1. **Catch-up scan** ([`catch_up_pending_requests`]): on startup, queues
//!    every randomness request still `Pending` and returns the event log
//!    cursor the scan is consistent with.
//!
//! 2. **Live tail** ([`listen_for_events`]): polls the program log from that
//!    cursor, parses `Program data:` entries, and forwards
//!    `RandomnessRequested` events to the fulfiller and `CheckpointCommitted`
//!    events to the relayer. Consumed entries are discarded from the log.

use base64::Engine;
use rollup_delegation::checkpoint::CommitCheckpoint;
use rollup_delegation::events::{event_discriminator, PROGRAM_DATA_PREFIX};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::SharedProgram;
use crate::config::AppConfig;

/// Parsed representation of the program's `RandomnessRequested` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessRequestedEvent {
    pub request_id: u64,
    pub account: Pubkey,
    pub requester: Pubkey,
    pub seed: [u8; 32],
    pub request_slot: u64,
}

/// Outbound channels fed by the listener.
#[derive(Clone)]
pub struct EventSinks {
    pub requests: mpsc::Sender<RandomnessRequestedEvent>,
    pub checkpoints: mpsc::Sender<CommitCheckpoint>,
}

/// Body length of a `RandomnessRequested` event:
/// `request_id (8) + account (32) + requester (32) + seed (32) + request_slot (8)`.
const REQUESTED_EVENT_LEN: usize = 112;

/// Queue every pending request and return the log cursor to tail from.
///
/// Both are read under one lock, so a request is either in the scan or
/// after the cursor, never both.
pub async fn catch_up_pending_requests(
    program: &SharedProgram,
    tx: &mpsc::Sender<RandomnessRequestedEvent>,
) -> usize {
    info!("Scanning for pending requests");

    let (pending, cursor) = {
        let program = program.lock().await;
        (program.pending_requests(), program.events().cursor())
    };

    info!(count = pending.len(), "Found pending requests");
    for request in pending {
        info!(
            request_id = request.request_id,
            account = %request.account,
            slot = request.request_slot,
            "Queued pending request"
        );
        let event = RandomnessRequestedEvent {
            request_id: request.request_id,
            account: request.account,
            requester: request.requester,
            seed: request.seed,
            request_slot: request.request_slot,
        };
        if tx.send(event).await.is_err() {
            error!("Channel closed while catching up pending requests");
            break;
        }
    }
    cursor
}

/// Tail the program log from `cursor`, forwarding events until a channel closes.
pub async fn listen_for_events(
    config: AppConfig,
    program: SharedProgram,
    mut cursor: usize,
    sinks: EventSinks,
) {
    let discriminators = Discriminators::new();
    let poll_interval = config.poll_interval();

    loop {
        let lines = {
            let mut program = program.lock().await;
            let lines = program.events().log_lines_since(cursor);
            cursor = program.events().cursor();
            program.discard_events_before(cursor);
            lines
        };

        if !process_log_lines(&lines, &discriminators, &sinks).await {
            info!("Listener channel closed, shutting down");
            return;
        }

        tokio::time::sleep(poll_interval).await;
    }
}

struct Discriminators {
    requested: [u8; 8],
    committed: [u8; 8],
}

impl Discriminators {
    fn new() -> Self {
        Self {
            requested: event_discriminator("RandomnessRequested"),
            committed: event_discriminator("CheckpointCommitted"),
        }
    }
}

/// Scan log lines for `Program data:` entries and dispatch the ones we care
/// about. Returns `false` once a receiver has gone away.
async fn process_log_lines(
    logs: &[String],
    discriminators: &Discriminators,
    sinks: &EventSinks,
) -> bool {
    for log_line in logs {
        let Some(data_str) = log_line.strip_prefix(PROGRAM_DATA_PREFIX) else {
            continue;
        };

        let decoded = match base64::engine::general_purpose::STANDARD.decode(data_str.trim()) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "Failed to decode base64 log data");
                continue;
            }
        };

        if decoded.len() < 8 {
            continue;
        }
        let (disc, body) = decoded.split_at(8);

        if disc == discriminators.requested {
            let Some(event) = parse_randomness_requested_event(body) else {
                warn!("Failed to parse RandomnessRequested event payload");
                continue;
            };
            info!(
                request_id = event.request_id,
                account = %event.account,
                slot = event.request_slot,
                "Received RandomnessRequested event"
            );
            if sinks.requests.send(event).await.is_err() {
                return false;
            }
        } else if disc == discriminators.committed {
            let checkpoint = match CommitCheckpoint::decode(body) {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    warn!(error = %e, "Failed to parse CheckpointCommitted event payload");
                    continue;
                }
            };
            info!(
                account = %checkpoint.account,
                sequence = checkpoint.sequence,
                "Received CheckpointCommitted event"
            );
            if sinks.checkpoints.send(checkpoint).await.is_err() {
                return false;
            }
        }
    }
    true
}

/// Deserialize a `RandomnessRequested` event body (discriminator stripped).
fn parse_randomness_requested_event(data: &[u8]) -> Option<RandomnessRequestedEvent> {
    if data.len() < REQUESTED_EVENT_LEN {
        return None;
    }

    let request_id = u64::from_le_bytes(data[0..8].try_into().ok()?);
    let account = Pubkey::try_from(&data[8..40]).ok()?;
    let requester = Pubkey::try_from(&data[40..72]).ok()?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&data[72..104]);
    let request_slot = u64::from_le_bytes(data[104..112].try_into().ok()?);

    Some(RandomnessRequestedEvent {
        request_id,
        account,
        requester,
        seed,
        request_slot,
    })
}
