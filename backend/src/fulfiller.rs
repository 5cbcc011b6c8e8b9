//! Fulfillment engine: consumes randomness request events and delivers the
//! oracle callback with an Ed25519 signature proof.
//!
//! Each fulfillment consists of:
//! 1. The HMAC oracle output for the request (see [`crate::vrf`]).
//! 2. A native Ed25519 signature-verify instruction over
//!    `request_id || randomness`, signed by the oracle keypair.
//! 3. The `fulfill_randomness` callback, which checks the proof and writes
//!    the derived value into the user account regardless of who currently
//!    holds write authority over it.

use anyhow::Result;
use rollup_delegation::ed25519::{build_signature_proof, fulfillment_message};
use rollup_delegation::errors::DelegationError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::SharedProgram;
use crate::config::AppConfig;
use crate::listener::RandomnessRequestedEvent;
use crate::metrics::Metrics;
use crate::vrf::compute_randomness;

/// Errors that will never succeed on a later attempt.
fn is_non_retryable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<DelegationError>(),
        Some(
            DelegationError::AlreadyFulfilled
                | DelegationError::RequestNotFound
                | DelegationError::AccountNotFound
                | DelegationError::PermissionDenied
        )
    )
}

/// Main fulfiller loop.
pub async fn run_fulfiller(
    config: AppConfig,
    program: SharedProgram,
    mut rx: mpsc::Receiver<RandomnessRequestedEvent>,
    pending_count: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
) {
    let semaphore = Arc::new(Semaphore::new(config.fulfillment_concurrency));

    while let Some(event) = rx.recv().await {
        metrics.record_request();
        pending_count.fetch_add(1, Ordering::Relaxed);

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!("Semaphore closed, stopping fulfiller");
                break;
            }
        };
        let cfg = config.clone();
        let prog = program.clone();
        let pending = pending_count.clone();
        let met = metrics.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let start = Instant::now();

            info!(
                request_id = event.request_id,
                account = %event.account,
                requester = %event.requester,
                slot = event.request_slot,
                "Fulfilling randomness request"
            );

            match fulfill_with_retries(&cfg, &prog, &event).await {
                Ok(random_value) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    met.record_fulfillment(latency_ms);
                    info!(
                        request_id = event.request_id,
                        account = %event.account,
                        random_value,
                        latency_ms,
                        "Fulfilled successfully"
                    );
                }
                Err(e) => handle_fulfillment_error(event.request_id, e, &met),
            }

            pending.fetch_sub(1, Ordering::Relaxed);
        });
    }

    info!("Fulfiller channel closed, shutting down");
}

fn handle_fulfillment_error(request_id: u64, error: anyhow::Error, metrics: &Metrics) {
    if is_non_retryable(&error) {
        metrics.record_skip();
        warn!(
            request_id,
            reason = %error,
            "Skipping request (non-retryable)"
        );
    } else {
        metrics.record_failure();
        error!(
            request_id,
            error = %format!("{error:#}"),
            "Failed to fulfill"
        );
    }
}

/// Deliver the callback, backing off between attempts that may still succeed.
#[instrument(skip_all, fields(request_id = event.request_id))]
async fn fulfill_with_retries(
    config: &AppConfig,
    program: &SharedProgram,
    event: &RandomnessRequestedEvent,
) -> Result<u64> {
    let mut retry_delay = config.initial_retry_delay();

    for attempt in 0..config.max_retries {
        match fulfill_request(config, program, event).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_non_retryable(&e) && attempt + 1 < config.max_retries => {
                warn!(
                    attempt = attempt + 1,
                    delay = ?retry_delay,
                    reason = %e,
                    "Fulfillment rejected, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
            }
            Err(e) => return Err(e),
        }
    }

    anyhow::bail!(
        "max retries ({}) exceeded for request_id={}",
        config.max_retries,
        event.request_id
    )
}

/// Compute the oracle output, sign it, and deliver the callback.
async fn fulfill_request(
    config: &AppConfig,
    program: &SharedProgram,
    event: &RandomnessRequestedEvent,
) -> Result<u64> {
    let randomness = compute_randomness(
        &config.hmac_secret,
        &event.seed,
        event.request_slot,
        event.request_id,
        &event.account,
    );

    let message = fulfillment_message(event.request_id, &randomness);
    let proof = build_signature_proof(&config.oracle_keypair, &message);

    let mut program = program.lock().await;
    let random_value =
        program.fulfill_randomness(&config.oracle_keypair, event.request_id, randomness, &proof)?;
    program.prune_fulfilled_requests();
    Ok(random_value)
}
