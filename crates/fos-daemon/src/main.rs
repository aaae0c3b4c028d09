//! fos-daemon — distributed file operation service.
//!
//! Exposes JSON-RPC 2.0 file operations over HTTP POST, bounded to a
//! configured root directory, with appends serialized fleet-wide
//! through a Redis-compatible lock coordinator. Multiple instances may
//! share one directory tree; the coordinator is the only cross-instance
//! state.
//!
//! Configuration comes from positional arguments first, environment
//! variables second (`FOS_ROOT_DIR`, `FOS_REDIS_HOST`, `FOS_REDIS_PORT`,
//! `FOS_REDIS_PASSWORD`). A missing or invalid value fails startup with
//! a descriptive message and a nonzero exit code.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fos_core::config::ServiceConfig;
use fos_core::lock::{LockClient, RedisLockBackend};
use fos_core::ops::FileOps;
use fos_core::path::RootDir;
use fos_daemon::health::HealthService;
use fos_daemon::http::{AppState, DEFAULT_RPC_PATH, router};
use fos_daemon::rpc::Dispatcher;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// fos daemon - networked file operation service
#[derive(Parser, Debug)]
#[command(name = "fos-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Root directory bounding all file operations
    #[arg(env = "FOS_ROOT_DIR")]
    root_dir: Option<String>,

    /// Lock coordinator hostname
    #[arg(env = "FOS_REDIS_HOST")]
    redis_host: Option<String>,

    /// Lock coordinator port
    #[arg(env = "FOS_REDIS_PORT")]
    redis_port: Option<String>,

    /// Lock coordinator password
    #[arg(env = "FOS_REDIS_PASSWORD")]
    redis_password: Option<String>,

    /// Socket address to serve on
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// URL path for the JSON-RPC endpoint
    #[arg(long, default_value = DEFAULT_RPC_PATH)]
    rpc_path: String,

    /// Per-request deadline in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = ServiceConfig::resolve(
        args.root_dir.clone(),
        args.redis_host.clone(),
        args.redis_port.clone(),
        args.redis_password.clone(),
    )
    .context("invalid configuration")?;

    info!(
        root_dir = %config.root_dir.display(),
        coordinator = %format!("{}:{}", config.redis.host, config.redis.port),
        "configuration resolved"
    );

    let backend =
        RedisLockBackend::connect(&config.redis).context("failed to build coordinator pool")?;
    let locks = LockClient::new(Arc::new(backend));
    let root = RootDir::new(config.root_dir.clone()).context("invalid root directory")?;
    let ops = Arc::new(FileOps::new(root, locks));

    let dispatcher = Dispatcher::new(ops)
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs.max(1)));
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        health: Arc::new(HealthService::new(&config.root_dir)),
    };

    let app = router(state, &args.rpc_path);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    info!(
        addr = %args.bind,
        rpc_path = %args.rpc_path,
        "fos daemon started (pid: {})",
        std::process::id()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("fos daemon shutdown complete");
    Ok(())
}

/// Initialize tracing to stdout or a file, filtered by `--log-level`
/// (overridable through `RUST_LOG`).
fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

/// Resolves when SIGTERM or SIGINT arrives.
async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}
