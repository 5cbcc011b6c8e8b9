//! Delegation Backend
//!
//! Off-chain service that hosts the account delegation program and keeps its
//! asynchronous flows moving. Runs four concurrent subsystems:
//!
//! - **Listener**: tails the program event log + startup catch-up scan.
//! - **Fulfiller**: answers randomness requests with signed oracle callbacks.
//! - **Relayer**: carries validator checkpoints back to the base layer in order.
//! - **HTTP server**: Liveness (`/health`), status (`/status`) and account
//!   views (`/accounts/{address}`).

use actix_web::{web, App, HttpResponse, HttpServer};
use rollup_delegation::errors::DelegationError;
use rollup_delegation::DelegationProgram;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod fulfiller;
mod listener;
mod metrics;
mod relayer;
mod vrf;


use config::AppConfig;
use listener::EventSinks;
use metrics::Metrics;

/// The hosted program. Every operation runs under this lock.
pub type SharedProgram = Arc<Mutex<DelegationProgram>>;

/// Shared application state accessible from HTTP handlers.
struct AppState {
    program: SharedProgram,
    /// Number of fulfillments currently in-flight.
    pending_count: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

/// JSON view of a user account.
#[derive(Debug, Serialize)]
struct AccountView {
    address: String,
    owner: String,
    data: u64,
    ephemeral_data: u64,
    random_value: u64,
    delegated: bool,
    validator: Option<String>,
    last_applied_sequence: u64,
}

fn account_view(program: &DelegationProgram, address: &Pubkey) -> Result<AccountView, DelegationError> {
    let ephemeral_data = program.ephemeral_data(address)?;
    program.account(address).map(|account| AccountView {
        address: address.to_string(),
        owner: account.owner.to_string(),
        data: account.data,
        ephemeral_data,
        random_value: account.random_value,
        delegated: account.authority.is_delegated(),
        validator: account.authority.validator().map(ToString::to_string),
        last_applied_sequence: account.last_applied_sequence,
    })
}

/// Liveness probe: returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Status probe: in-flight fulfillments, program slot and counters.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    let pending = data.pending_count.load(Ordering::Relaxed);
    let program = data.program.lock().await;
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "program_id": program.config().program_id.to_string(),
        "oracle_queue": program.config().oracle_queue.to_string(),
        "pending_fulfillments": pending,
        "pending_requests": program.pending_requests().len(),
        "tracked_requests": program.tracked_requests(),
        "delegated_accounts": program.delegated_count(),
        "retained_events": program.events().retained(),
        "slot": program.slot(),
        "metrics": data.metrics.to_json(),
    }))
}

async fn account(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let address = match Pubkey::from_str(&path) {
        Ok(address) => address,
        Err(_) => {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({"error": "invalid account address"}));
        }
    };

    let program = data.program.lock().await;
    let view = account_view(&program, &address);

    match view {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(DelegationError::AccountNotFound) => {
            HttpResponse::NotFound().json(serde_json::json!({"error": "account not found"}))
        }
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string(),
            "code": e.code(),
        })),
    }
}

/// Queue outstanding requests, then start the listener, fulfiller and relayer.
async fn spawn_services(
    config: &AppConfig,
    program: &SharedProgram,
    pending_count: &Arc<AtomicU64>,
    metrics: &Arc<Metrics>,
) {
    let (request_tx, request_rx) = mpsc::channel(256);
    let (checkpoint_tx, checkpoint_rx) = mpsc::channel(256);

    // Pick up any requests recorded before the listener starts.
    let cursor = listener::catch_up_pending_requests(program, &request_tx).await;

    // Background: tail the event log and forward to fulfiller and relayer.
    let listener_config = config.clone();
    let listener_program = program.clone();
    let sinks = EventSinks {
        requests: request_tx,
        checkpoints: checkpoint_tx,
    };
    tokio::spawn(async move {
        listener::listen_for_events(listener_config, listener_program, cursor, sinks).await;
    });

    // Background: answer randomness requests.
    let fulfiller_config = config.clone();
    let fulfiller_program = program.clone();
    let fulfiller_pending = pending_count.clone();
    let fulfiller_metrics = metrics.clone();
    tokio::spawn(async move {
        fulfiller::run_fulfiller(
            fulfiller_config,
            fulfiller_program,
            request_rx,
            fulfiller_pending,
            fulfiller_metrics,
        )
        .await;
    });

    // Background: relay checkpoints to the base layer.
    let relayer_config = config.clone();
    let relayer_program = program.clone();
    let relayer_metrics = metrics.clone();
    tokio::spawn(async move {
        relayer::run_relayer(relayer_config, relayer_program, checkpoint_rx, relayer_metrics).await;
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_server=warn,rollup_delegation=debug")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    info!(
        program = %config.program_id,
        oracle = %config.oracle_keypair.pubkey(),
        queue = %config.oracle_queue,
        "Starting delegation backend"
    );

    let program = DelegationProgram::new(config.program_config()).expect("invalid program configuration");
    let program: SharedProgram = Arc::new(Mutex::new(program));
    let pending_count = Arc::new(AtomicU64::new(0));
    let metrics = Arc::new(Metrics::new());

    spawn_services(&config, &program, &pending_count, &metrics).await;

    let state = web::Data::new(AppState {
        program,
        pending_count,
        metrics,
    });

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!(addr = %addr, "Starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/status", web::get().to(status))
            .route("/accounts/{address}", web::get().to(account))
    })
    .bind(addr)?
    .run()
    .await
}
