//! kestreld — the Kestrel daemon.
//!
//! Single binary that assembles all Kestrel subsystems:
//! - State store (redb)
//! - Result cache chain (in-memory ring + durable link)
//! - Metrics recorder (rolling windows + Prometheus registry)
//! - Dynamic scheduler + execution guard
//! - Relationship reconciliation loop
//! - Status event stream
//!
//! # Usage
//!
//! ```text
//! kestreld serve --data-dir /var/lib/kestrel --include-namespace 'prod-*'
//! ```
//!
//! Concrete probe implementations are external; the bundled runner only
//! marks every configured check as passing, which is enough to exercise
//! scheduling, caching, and reconciliation end to end. Deployments embed
//! the kestrel crates and supply their own `ProbeRunner`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use kestrel_core::ProbeRunner;

mod probes;

use probes::DryRunProbes;

#[derive(Parser)]
#[command(name = "kestreld", about = "Kestrel canary daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Serve {
        /// Data directory for the durable store.
        #[arg(long, default_value = "/var/lib/kestrel")]
        data_dir: PathBuf,

        /// Job sync interval in seconds.
        #[arg(long, default_value = "300")]
        sync_interval: u64,

        /// Relationship reconciliation interval in seconds.
        #[arg(long, default_value = "120")]
        topology_interval: u64,

        /// Minimum seconds between two runs of the same canary.
        #[arg(long, default_value = "10")]
        min_run_interval: u64,

        /// In-memory cache capacity per check.
        #[arg(long, default_value = "300")]
        mem_cache_size: usize,

        /// Namespace glob inclusion filters (repeatable).
        #[arg(long = "include-namespace")]
        include_namespaces: Vec<String>,

        /// Canary name glob inclusion filters (repeatable).
        #[arg(long = "include-canary")]
        include_names: Vec<String>,

        /// Label `key=value` inclusion filters (repeatable).
        #[arg(long = "include-label")]
        include_labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kestreld=debug,kestrel=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            data_dir,
            sync_interval,
            topology_interval,
            min_run_interval,
            mem_cache_size,
            include_namespaces,
            include_names,
            include_labels,
        } => {
            serve(ServeOptions {
                data_dir,
                sync_interval: Duration::from_secs(sync_interval),
                topology_interval: Duration::from_secs(topology_interval),
                min_run_interval: Duration::from_secs(min_run_interval),
                mem_cache_size,
                filters: kestrel_scheduler::IncludeFilters {
                    namespaces: include_namespaces,
                    names: include_names,
                    labels: include_labels,
                },
            })
            .await
        }
    }
}

struct ServeOptions {
    data_dir: PathBuf,
    sync_interval: Duration,
    topology_interval: Duration,
    min_run_interval: Duration,
    mem_cache_size: usize,
    filters: kestrel_scheduler::IncludeFilters,
}

async fn serve(options: ServeOptions) -> anyhow::Result<()> {
    info!("kestrel daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&options.data_dir)?;
    let db_path = options.data_dir.join("kestrel.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = kestrel_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let chain = Arc::new(kestrel_cache::CacheChain::new(
        store.clone(),
        options.mem_cache_size,
    ));
    let metrics = Arc::new(kestrel_metrics::MetricsRecorder::new()?);
    let events = Arc::new(kestrel_scheduler::StatusEventQueue::default());

    let probes: Arc<dyn ProbeRunner> = Arc::new(DryRunProbes);
    let runner = Arc::new(kestrel_scheduler::CanaryRunner::new(
        store.clone(),
        chain,
        metrics.clone(),
        events.clone(),
        probes,
        kestrel_scheduler::RunnerConfig {
            min_interval: options.min_run_interval,
            transform_exclusions: Vec::new(),
        },
    ));
    let scheduler = Arc::new(kestrel_scheduler::Scheduler::new(
        store.clone(),
        runner,
        options.filters,
    ));

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        let interval = options.sync_interval;
        async move { scheduler.run_sync_loop(interval, shutdown).await }
    });

    let topology_handle = tokio::spawn(topology_loop(
        store.clone(),
        options.topology_interval,
        shutdown_rx.clone(),
    ));

    let events_handle = tokio::spawn(status_loop(events, shutdown_rx.clone()));

    info!("kestrel daemon started");

    // ── Shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = sync_handle.await;
    let _ = topology_handle.await;
    let _ = events_handle.await;
    info!("kestrel daemon stopped");
    Ok(())
}

/// Periodic relationship reconciliation over all live components.
async fn topology_loop(
    store: kestrel_state::StateStore,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = interval.as_secs(),
        "topology reconciliation loop started"
    );
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match kestrel_topology::sync_components(&store, chrono::Utc::now()) {
                    Ok(synced) => tracing::debug!(components = synced, "topology tick complete"),
                    Err(e) => tracing::error!(error = %e, "topology tick failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("topology loop shutting down");
                break;
            }
        }
    }
}

/// Drain status events into the log.
///
/// Stands in for the status-reporting collaborator; the queue is bounded
/// and drop-oldest, so a stalled consumer cannot grow memory.
async fn status_loop(
    events: Arc<kestrel_scheduler::StatusEventQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                for event in events.drain() {
                    info!(
                        canary = %format!("{}/{}", event.namespace, event.canary_name),
                        pass = event.pass,
                        transitioned = event.transitioned,
                        uptime = %event.uptime,
                        latency = %event.latency,
                        "canary status"
                    );
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

