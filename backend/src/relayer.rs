//! Checkpoint relayer: carries validator-signed checkpoints from the
//! ephemeral rollup back to the base layer.
//!
//! Checkpoints are applied one at a time in arrival order. The base layer
//! only accepts `last_applied_sequence + 1`, so an out-of-order checkpoint is
//! retried with exponential backoff until its predecessor lands or
//! `MAX_RETRIES` is exhausted. Replays of already-applied checkpoints are
//! counted and dropped.

use anyhow::Result;
use rollup_delegation::checkpoint::CommitCheckpoint;
use rollup_delegation::errors::DelegationError;
use rollup_delegation::instructions::ApplyOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::SharedProgram;
use crate::config::AppConfig;
use crate::metrics::Metrics;

/// Main relayer loop.
pub async fn run_relayer(
    config: AppConfig,
    program: SharedProgram,
    mut rx: mpsc::Receiver<CommitCheckpoint>,
    metrics: Arc<Metrics>,
) {
    while let Some(checkpoint) = rx.recv().await {
        metrics.record_checkpoint();

        match apply_with_retries(&config, &program, &checkpoint, &metrics).await {
            Ok(ApplyOutcome::Applied) => {
                metrics.record_checkpoint_applied();
                info!(
                    account = %checkpoint.account,
                    sequence = checkpoint.sequence,
                    data = checkpoint.data,
                    "Checkpoint applied"
                );
            }
            Ok(ApplyOutcome::Replayed) => {
                metrics.record_checkpoint_replayed();
                info!(
                    account = %checkpoint.account,
                    sequence = checkpoint.sequence,
                    "Checkpoint already applied, skipping"
                );
            }
            Err(e) => {
                metrics.record_checkpoint_failure();
                error!(
                    account = %checkpoint.account,
                    sequence = checkpoint.sequence,
                    error = %format!("{e:#}"),
                    "Failed to relay checkpoint"
                );
            }
        }
    }

    info!("Relayer channel closed, shutting down");
}

#[instrument(skip_all, fields(account = %checkpoint.account, sequence = checkpoint.sequence))]
async fn apply_with_retries(
    config: &AppConfig,
    program: &SharedProgram,
    checkpoint: &CommitCheckpoint,
    metrics: &Metrics,
) -> Result<ApplyOutcome> {
    let mut retry_delay = config.initial_retry_delay();

    for attempt in 0..config.max_retries {
        let result = program.lock().await.apply_checkpoint(checkpoint);

        match result {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt + 1 < config.max_retries => {
                metrics.record_checkpoint_retry();
                warn!(
                    attempt = attempt + 1,
                    delay = ?retry_delay,
                    reason = %e,
                    "Checkpoint not yet applicable, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
            }
            Err(e) => return Err(relay_error(e)),
        }
    }

    anyhow::bail!(
        "max retries ({}) exceeded for sequence={}",
        config.max_retries,
        checkpoint.sequence
    )
}

fn relay_error(error: DelegationError) -> anyhow::Error {
    anyhow::Error::new(error).context("apply_checkpoint failed")
}
