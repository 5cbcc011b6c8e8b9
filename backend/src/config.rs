//! Application configuration loaded from environment variables.
//!
//! Required: `HMAC_SECRET`, `PROGRAM_ID`
//! Optional: `ORACLE_KEYPAIR_PATH`, `ORACLE_QUEUE`, `HTTP_PORT`, `MAX_RETRIES`,
//!           `INITIAL_RETRY_DELAY_MS`, `FULFILLMENT_CONCURRENCY`, `POLL_INTERVAL_MS`

use anyhow::{Context, Result};
use rollup_delegation::config::ProgramConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Seed for the default oracle queue address: `["oracle-queue"]` under the program id.
const ORACLE_QUEUE_SEED: &[u8] = b"oracle-queue";

/// Application configuration for the delegation backend.
#[derive(Clone)]
pub struct AppConfig {
    /// Program id used to derive user account addresses.
    pub program_id: Pubkey,
    /// Ed25519 keypair of the randomness oracle.
    pub oracle_keypair: Arc<Keypair>,
    /// Queue this deployment's randomness requests are routed to.
    pub oracle_queue: Pubkey,
    /// Secret key for HMAC-SHA256 randomness generation.
    pub hmac_secret: Vec<u8>,
    /// HTTP server port.
    pub http_port: u16,
    /// Maximum attempts per checkpoint relay.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum concurrent fulfillment tasks.
    pub fulfillment_concurrency: usize,
    /// Interval between event log polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let keypair_path = std::env::var("ORACLE_KEYPAIR_PATH")
            .unwrap_or_else(|_| "~/.config/solana/id.json".into());
        let keypair_path = shellexpand::tilde(&keypair_path).to_string();
        let oracle_keypair = read_keypair_file(&keypair_path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to read keypair from {keypair_path}"))?;

        let hmac_secret = std::env::var("HMAC_SECRET")
            .context("HMAC_SECRET env var must be set")?
            .into_bytes();

        let program_id_str = std::env::var("PROGRAM_ID").context("PROGRAM_ID env var must be set")?;
        let program_id = Pubkey::from_str(&program_id_str)
            .with_context(|| format!("invalid PROGRAM_ID: {program_id_str}"))?;

        let oracle_queue = match std::env::var("ORACLE_QUEUE") {
            Ok(queue) => Pubkey::from_str(&queue)
                .with_context(|| format!("invalid ORACLE_QUEUE: {queue}"))?,
            Err(_) => default_oracle_queue(&program_id),
        };

        let http_port = env_or("HTTP_PORT", 8080);
        let max_retries = env_or("MAX_RETRIES", 5);
        let initial_retry_delay_ms = env_or("INITIAL_RETRY_DELAY_MS", 500);
        let fulfillment_concurrency = env_or("FULFILLMENT_CONCURRENCY", 4);
        let poll_interval_ms = env_or("POLL_INTERVAL_MS", 400);

        Ok(Self {
            program_id,
            oracle_keypair: Arc::new(oracle_keypair),
            oracle_queue,
            hmac_secret,
            http_port,
            max_retries,
            initial_retry_delay_ms,
            fulfillment_concurrency,
            poll_interval_ms,
        })
    }

    /// Configuration for the hosted program instance.
    pub fn program_config(&self) -> ProgramConfig {
        ProgramConfig::new(
            self.program_id,
            self.oracle_keypair.pubkey(),
            self.oracle_queue,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }
}

/// Queue address used when `ORACLE_QUEUE` is not set.
pub fn default_oracle_queue(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[ORACLE_QUEUE_SEED], program_id).0
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl AppConfig {
    /// In-memory configuration with short timings for tests.
    pub fn for_tests(oracle_keypair: Keypair) -> Self {
        let program_id = Pubkey::new_unique();
        Self {
            program_id,
            oracle_keypair: Arc::new(oracle_keypair),
            oracle_queue: default_oracle_queue(&program_id),
            hmac_secret: b"test-secret".to_vec(),
            http_port: 0,
            max_retries: 5,
            initial_retry_delay_ms: 10,
            fulfillment_concurrency: 2,
            poll_interval_ms: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_is_per_program() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        assert_eq!(default_oracle_queue(&a), default_oracle_queue(&a));
        assert_ne!(default_oracle_queue(&a), default_oracle_queue(&b));
    }

    #[test]
    fn program_config_uses_oracle_key() {
        let oracle = Keypair::new();
        let oracle_key = oracle.pubkey();
        let config = AppConfig::for_tests(oracle);
        let program_config = config.program_config();
        assert_eq!(program_config.oracle_identity, oracle_key);
        assert_eq!(program_config.validate(), Ok(()));
    }
}
