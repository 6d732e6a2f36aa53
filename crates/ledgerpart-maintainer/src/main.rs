//! # ledgerpart-maintainer
//!
//! Partition lifecycle maintainer for the day-partitioned ledger table.
//!
//! The maintainer keeps dated partitions provisioned ahead of the write
//! horizon and walks aging partitions through archive, deep archive, and
//! grace-gated deletion. All state lives in `PostgreSQL`; this process can
//! be restarted or replaced at any time.
//!
//! ## Modes
//!
//! - **Service Mode**: Runs continuously with HTTP health endpoints
//! - **CLI Mode**: One-shot maintenance or a dry-run plan for operators
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Shallow liveness check (always 200)
//! - `GET /ready` - Readiness check with maintenance health status
//!
//! ## Usage
//!
//! ```bash
//! # Run as service (default)
//! ledgerpart-maintainer serve --port 8082
//!
//! # One-shot maintenance without the deletion pass
//! ledgerpart-maintainer maintain
//!
//! # One-shot including deletions, or a dry run
//! ledgerpart-maintainer maintain --deep
//! ledgerpart-maintainer maintain --dry-run
//!
//! # Print the current plan as JSON
//! ledgerpart-maintainer plan
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

mod metrics;
pub mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

use ledgerpart_core::policy::LifecyclePolicy;
use ledgerpart_pg::{PgSnapshotStore, SnapshotStore};

use crate::scheduler::{CycleKind, Maintainer};

// ============================================================================
// CLI Arguments
// ============================================================================

const DB_CONNECT_TIMEOUT_SECS: u64 = 10;
const DB_MAX_CONNECTIONS: u32 = 5;
const RECENT_AUDIT_LIMIT: i64 = 20;

/// Ledger partition lifecycle maintainer.
#[derive(Debug, Parser)]
#[command(name = "ledgerpart-maintainer")]
#[command(about = "Maintains day partitions of the ledger table")]
#[command(version)]
struct Args {
    /// PostgreSQL connection string.
    #[arg(long, env = "LEDGERPART_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Use the short development policy windows instead of production defaults.
    #[arg(long, env = "LEDGERPART_DEV_POLICY", global = true)]
    dev_policy: bool,

    /// Age (days) through which a partition stays fully active.
    #[arg(long, env = "LEDGERPART_ACTIVE_DAYS", global = true)]
    active_days: Option<i64>,

    /// Age (days) through which a partition stays in the archive stage.
    #[arg(long, env = "LEDGERPART_ARCHIVE_DAYS", global = true)]
    archive_days: Option<i64>,

    /// Age (days) through which a partition stays deep-archived.
    #[arg(long, env = "LEDGERPART_DEEP_ARCHIVE_DAYS", global = true)]
    deep_archive_days: Option<i64>,

    /// Age (days) at which a partition enters the deletion path.
    #[arg(long, env = "LEDGERPART_DELETE_THRESHOLD_DAYS", global = true)]
    delete_threshold_days: Option<i64>,

    /// Minimum dwell time (days) in the marked state before deletion.
    #[arg(long, env = "LEDGERPART_DELETION_GRACE_DAYS", global = true)]
    deletion_grace_days: Option<i64>,

    /// How many days ahead of today dated partitions must already exist.
    #[arg(long, env = "LEDGERPART_CREATION_HORIZON_DAYS", global = true)]
    creation_horizon_days: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run as a service with health endpoints.
    Serve {
        /// HTTP port for health endpoints.
        #[arg(long, env = "LEDGERPART_PORT", default_value = "8082")]
        port: u16,

        /// Routine maintenance interval in seconds.
        #[arg(long, env = "LEDGERPART_INTERVAL_SECS", default_value = "3600")]
        interval_secs: u64,

        /// Deep-cleanup (deletion pass) interval in seconds.
        #[arg(
            long,
            env = "LEDGERPART_DEEP_CLEANUP_INTERVAL_SECS",
            default_value = "604800"
        )]
        deep_cleanup_interval_secs: u64,

        /// Maximum time without a successful cycle before unhealthy (seconds).
        #[arg(
            long,
            env = "LEDGERPART_UNHEALTHY_THRESHOLD_SECS",
            default_value = "7200"
        )]
        unhealthy_threshold_secs: u64,
    },

    /// Run a single maintenance cycle.
    Maintain {
        /// Include the deletion pass.
        #[arg(long)]
        deep: bool,

        /// Compute and print the plan without applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the current maintenance plan as JSON without applying it.
    Plan,
}

impl Args {
    fn policy(&self) -> Result<LifecyclePolicy> {
        let mut policy = if self.dev_policy {
            LifecyclePolicy::development()
        } else {
            LifecyclePolicy::default()
        };
        if let Some(v) = self.active_days {
            policy.active_days = v;
        }
        if let Some(v) = self.archive_days {
            policy.archive_days = v;
        }
        if let Some(v) = self.deep_archive_days {
            policy.deep_archive_days = v;
        }
        if let Some(v) = self.delete_threshold_days {
            policy.delete_threshold_days = v;
        }
        if let Some(v) = self.deletion_grace_days {
            policy.deletion_grace_days = v;
        }
        if let Some(v) = self.creation_horizon_days {
            policy.creation_horizon_days = v;
        }
        if let Some(message) = policy.validate() {
            return Err(anyhow!("invalid lifecycle policy: {message}"));
        }
        Ok(policy)
    }

    fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("missing LEDGERPART_DATABASE_URL"))
    }
}

async fn build_maintainer(args: &Args) -> Result<Maintainer> {
    let policy = args.policy()?;
    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(DB_CONNECT_TIMEOUT_SECS))
        .connect(args.database_url()?)
        .await?;

    let snapshots: Arc<dyn SnapshotStore> = Arc::new(PgSnapshotStore::new(pool.clone()));
    let maintainer = Maintainer::new(pool, policy, snapshots);
    maintainer.prepare().await?;
    Ok(maintainer)
}

// ============================================================================
// Health State
// ============================================================================

/// Shared state for tracking maintenance health.
#[derive(Debug)]
struct MaintainerHealth {
    /// Whether the service is ready to accept work.
    ready: AtomicBool,
    /// Unix timestamp of the last successful cycle.
    last_successful_cycle_ts: AtomicU64,
    /// Total successful maintenance cycles.
    successful_cycles: AtomicU64,
    /// Total failed maintenance cycles.
    failed_cycles: AtomicU64,
    /// Threshold (seconds) before marking unhealthy.
    unhealthy_threshold_secs: u64,
}

impl MaintainerHealth {
    fn new(unhealthy_threshold_secs: u64) -> Self {
        Self {
            ready: AtomicBool::new(false),
            last_successful_cycle_ts: AtomicU64::new(0),
            successful_cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            unhealthy_threshold_secs,
        }
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    fn record_success(&self) {
        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        self.last_successful_cycle_ts.store(now, Ordering::Release);
        self.successful_cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            return false;
        }

        if self.successful_cycles.load(Ordering::Acquire) == 0 {
            // Not healthy until at least one cycle has succeeded; until then
            // the write horizon may be uncovered.
            return false;
        }

        let last = self.last_successful_cycle_ts.load(Ordering::Acquire);
        if last == 0 {
            return false;
        }

        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        let elapsed = now.saturating_sub(last);
        elapsed < self.unhealthy_threshold_secs
    }

    fn last_successful_cycle(&self) -> Option<DateTime<Utc>> {
        let ts = self.last_successful_cycle_ts.load(Ordering::Acquire);
        if ts == 0 {
            None
        } else {
            let ts = i64::try_from(ts).ok()?;
            DateTime::from_timestamp(ts, 0)
        }
    }

    /// Operator-facing explanation for a not-ready verdict, if any.
    fn status_message(&self) -> Option<String> {
        if !self.ready.load(Ordering::Acquire) {
            return Some("maintainer is still starting".to_string());
        }
        if self.successful_cycles.load(Ordering::Acquire) == 0 {
            return Some("no maintenance cycle has completed yet".to_string());
        }
        if !self.is_healthy() {
            return Some(format!(
                "last successful cycle was more than {}s ago",
                self.unhealthy_threshold_secs
            ));
        }
        None
    }
}

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct ServiceState {
    health: Arc<MaintainerHealth>,
    maintainer: Arc<Maintainer>,
}

// ============================================================================
// Health Endpoints
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_successful_cycle: Option<String>,
    successful_cycles: u64,
    failed_cycles: u64,
    cycle_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET /health - Shallow liveness check.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Readiness check with maintenance health.
async fn ready(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    let ready = state.health.ready.load(Ordering::Acquire);
    let healthy = state.health.is_healthy();
    let last_successful = state.health.last_successful_cycle();
    let successful_cycles = state.health.successful_cycles.load(Ordering::Relaxed);
    let failed_cycles = state.health.failed_cycles.load(Ordering::Relaxed);
    let cycle_in_progress = state.maintainer.is_running();
    let message = state.health.status_message();

    let status = if ready && healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            healthy,
            last_successful_cycle: last_successful.map(|dt| dt.to_rfc3339()),
            successful_cycles,
            failed_cycles,
            cycle_in_progress,
            message,
        }),
    )
}

/// POST /maintain - Trigger a routine maintenance cycle on-demand.
///
/// Returns:
/// - `202 Accepted` if a new cycle was started
/// - `409 Conflict` if a cycle is already in progress
async fn maintain(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    if state.maintainer.is_running() {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "already_running",
                "message": "A maintenance cycle is already in progress"
            })),
        );
    }

    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        run_cycle_recorded(&state_clone, CycleKind::Routine).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "started",
            "message": "Maintenance cycle triggered"
        })),
    )
}

/// GET /plan - Current maintenance plan without applying it.
async fn plan_handler(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    match state.maintainer.plan_only().await {
        Ok(actions) => (StatusCode::OK, Json(serde_json::json!({ "actions": actions }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "plan_failed",
                "message": e.to_string()
            })),
        ),
    }
}

// ============================================================================
// Maintenance Loops
// ============================================================================

/// Runs a cycle and records the outcome in health state.
async fn run_cycle_recorded(state: &Arc<ServiceState>, kind: CycleKind) {
    match state.maintainer.run_cycle(kind).await {
        Ok(Some(outcome)) => {
            // A cycle with failed actions still counts as a completed run,
            // but readiness should not advance past it.
            if outcome.failed == 0 && outcome.overflow_healthy {
                state.health.record_success();
            } else {
                state.health.record_failure();
            }
        }
        Ok(None) => {
            // Skipped tick; the running cycle will record its own outcome.
        }
        Err(e) => {
            state.health.record_failure();
            tracing::error!(error = %e, kind = kind.as_str(), "maintenance cycle failed");
        }
    }
}

/// Runs the routine maintenance loop in service mode.
async fn run_maintenance_loop(state: Arc<ServiceState>, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    // The first `tick()` completes immediately, so the first cycle runs at
    // startup and readiness can become healthy without waiting an interval.
    interval_timer.tick().await;
    state.health.mark_ready();
    tracing::info!("Maintainer ready, starting maintenance loop");

    run_cycle_recorded(&state, CycleKind::Routine).await;

    loop {
        interval_timer.tick().await;
        run_cycle_recorded(&state, CycleKind::Routine).await;
    }
}

/// Runs the deep-cleanup loop (the only cadence that deletes partitions).
async fn run_deep_cleanup_loop(state: Arc<ServiceState>, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    // Skip the immediate first tick; the routine loop covers startup and the
    // deletion pass has no urgency.
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;
        run_cycle_recorded(&state, CycleKind::DeepCleanup).await;
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .json()
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve {
            port,
            interval_secs,
            deep_cleanup_interval_secs,
            unhealthy_threshold_secs,
        } => {
            // Initialize metrics before starting
            metrics::init_metrics();

            tracing::info!(
                port = port,
                interval_secs = interval_secs,
                deep_cleanup_interval_secs = deep_cleanup_interval_secs,
                unhealthy_threshold_secs = unhealthy_threshold_secs,
                "Starting partition maintainer service"
            );

            let maintainer = Arc::new(build_maintainer(&args).await?);
            let health_state = Arc::new(MaintainerHealth::new(unhealthy_threshold_secs));
            let state = Arc::new(ServiceState {
                health: Arc::clone(&health_state),
                maintainer,
            });

            // Build HTTP router
            let router = Router::new()
                .route("/health", get(health))
                .route("/ready", get(ready))
                .route("/metrics", get(metrics::serve_metrics))
                .route("/plan", get(plan_handler))
                .route("/maintain", post(maintain))
                .with_state(Arc::clone(&state));

            // Spawn the two maintenance loops
            let routine_state = Arc::clone(&state);
            tokio::spawn(async move {
                run_maintenance_loop(routine_state, Duration::from_secs(interval_secs)).await;
            });

            let deep_state = Arc::clone(&state);
            tokio::spawn(async move {
                run_deep_cleanup_loop(deep_state, Duration::from_secs(deep_cleanup_interval_secs))
                    .await;
            });

            // Start HTTP server
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(address = %addr, "Starting health server");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Maintain { deep, dry_run } => {
            let maintainer = build_maintainer(&args).await?;
            let kind = if deep {
                CycleKind::DeepCleanup
            } else {
                CycleKind::Routine
            };

            if dry_run {
                tracing::info!("Dry run mode - no changes will be made");
                let actions = maintainer.plan_only().await?;
                println!("{}", serde_json::to_string_pretty(&actions)?);
                return Ok(());
            }

            tracing::info!(kind = kind.as_str(), "Starting manual maintenance cycle");
            let outcome = maintainer
                .run_cycle(kind)
                .await?
                .ok_or_else(|| anyhow!("another maintenance cycle is already running"))?;

            tracing::info!(
                planned = outcome.planned,
                applied = outcome.applied,
                skipped = outcome.skipped,
                failed = outcome.failed,
                overflow_healthy = outcome.overflow_healthy,
                "Maintenance complete"
            );

            for entry in maintainer.recent_audit(RECENT_AUDIT_LIMIT).await? {
                tracing::info!(
                    operation = %entry.operation,
                    partition = %entry.partition_name,
                    status = %entry.status,
                    notes = entry.notes.as_deref().unwrap_or(""),
                    created_at = %entry.created_at.to_rfc3339(),
                    "audit entry"
                );
            }

            if outcome.failed > 0 {
                return Err(anyhow!("{} action(s) failed; see audit log", outcome.failed));
            }
        }

        Commands::Plan => {
            let maintainer = build_maintainer(&args).await?;
            let actions = maintainer.plan_only().await?;
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
    }

    Ok(())
}
