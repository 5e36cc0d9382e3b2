//! # skygate entry point
//!
//! Starts the JSON-RPC gateway in front of the AT Protocol upstream:
//! loads configuration, registers backup credentials and fallback payloads,
//! and runs the primary and health listeners until SIGINT/SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Start with environment configuration (BSKY_ID, BSKY_PASSWORD, BSKY_HOST)
//! skygate
//!
//! # Custom listeners and a config file
//! skygate -b 0.0.0.0:3000 --health-bind 0.0.0.0:3001 -c ./skygate.json
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use argh::FromArgs;
use tokio::sync::watch;

use skygate_common::AppConfig;
use skygate_gateway::{fallbacks, server, AppState};

/// skygate - JSON-RPC gateway for the AT Protocol
#[derive(FromArgs)]
struct Args {
    /// address for the JSON-RPC listener
    ///
    /// Clients send JSON-RPC 2.0 requests to POST /mcp/{method} on this
    /// address. Defaults to "0.0.0.0:3000".
    #[argh(option, short = 'b', default = "\"0.0.0.0:3000\".into()")]
    bind: String,

    /// address for the dedicated health listener
    ///
    /// Answers GET /health and GET /healthz, isolated from the request
    /// pipeline. Defaults to "0.0.0.0:3001".
    #[argh(option, long = "health-bind", default = "\"0.0.0.0:3001\".into()")]
    health_bind: String,

    /// directory of fallback JSON payloads
    ///
    /// Each file is registered verbatim under its endpoint key at startup
    /// and served when the upstream is unavailable.
    #[argh(option, long = "fallbacks-dir", default = "\"./configs/fallbacks\".into()")]
    fallbacks_dir: String,

    /// optional JSON config file
    ///
    /// Values in the file override environment settings. Equivalent to
    /// setting BSKY_CONFIG_FILE.
    #[argh(option, short = 'c', long = "config")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    // Default log level INFO; RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match &args.config {
        Some(path) => AppConfig::load_with_file(Path::new(path)),
        None => AppConfig::load(),
    };
    config
        .validate()
        .map_err(|err| anyhow!("configuration error: {err}"))?;

    let mut backups = Vec::new();
    if let Some(backup) = AppConfig::backup_from_env() {
        tracing::info!("registered backup credentials");
        backups.push(backup);
    }

    let state = AppState::new(config, backups)
        .map_err(|err| anyhow!("failed to initialize gateway: {err}"))?;

    if let Err(err) = fallbacks::initialize(&state.tokens.client(), Path::new(&args.fallbacks_dir)).await
    {
        tracing::warn!(error = %err, "failed to initialize fallbacks");
    }

    let bind: SocketAddr = args
        .bind
        .parse()
        .map_err(|err| anyhow!("invalid bind address {}: {err}", args.bind))?;
    let health_bind: SocketAddr = args
        .health_bind
        .parse()
        .map_err(|err| anyhow!("invalid health bind address {}: {err}", args.health_bind))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut health_task = tokio::spawn(server::serve_health(
        health_bind,
        wait_for_shutdown(shutdown_rx.clone()),
    ));
    let mut gateway_task = tokio::spawn(server::serve(
        state.clone(),
        bind,
        wait_for_shutdown(shutdown_rx),
    ));

    tokio::select! {
        result = &mut gateway_task => {
            return Err(flatten("gateway server", result));
        }
        result = &mut health_task => {
            return Err(flatten("health server", result));
        }
        _ = wait_for_signal() => {
            tracing::info!("shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(15), gateway_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_task).await;

    state.shutdown().await;
    tracing::info!("gateway stopped");
    Ok(())
}

/// Turns an early server exit into the fatal error for main.
fn flatten(
    name: &str,
    result: std::result::Result<skygate_common::Result<()>, tokio::task::JoinError>,
) -> anyhow::Error {
    match result {
        Ok(Ok(())) => anyhow!("{name} exited unexpectedly"),
        Ok(Err(err)) => anyhow!("{name} error: {err}"),
        Err(err) => anyhow!("{name} task failed: {err}"),
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.changed().await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
