//! dcstatd: the dcstat daemon.
//!
//! Probes every datacenter advertised by the remote configuration and
//! serves what it sees:
//! - Status page and JSON status on the public listener
//! - Prometheus metrics on a separate (usually private) listener
//!
//! # Usage
//!
//! ```text
//! APP_ID=12345 APP_HASH=... dcstatd serve --config dcstat.toml
//! dcstatd check --app-id 12345 --app-hash ...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use dcstat_api::{ApiState, build_router, metrics_router};
use dcstat_client::{Connector, TcpConnector};
use dcstat_core::{DcstatConfig, Settings};
use dcstat_probe::{ProbeSettings, Registry, discover};

#[derive(Parser)]
#[command(name = "dcstatd", about = "Datacenter status daemon")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application id.
    #[arg(long, env = "APP_ID", global = true)]
    app_id: Option<i32>,

    /// Application hash.
    #[arg(long, env = "APP_HASH", global = true, hide_env_values = true)]
    app_hash: Option<String>,

    /// Public listen address (status page, JSON status).
    #[arg(long, env = "HTTP_ADDR", global = true)]
    http_addr: Option<String>,

    /// Metrics listen address. Equal to the public address to serve both on one listener.
    #[arg(long, env = "METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Probe all datacenters and serve their status (default).
    Serve,
    /// Discover the probe targets once, print them and exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = load_settings(&cli)?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(settings).await,
        Command::Check => run_check(settings).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dcstat=debug,dcstatd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Config file first, then flags and environment on top.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut config = match &cli.config {
        Some(path) => DcstatConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DcstatConfig::default(),
    };
    if let Some(id) = cli.app_id {
        config.set_app_id(id);
    }
    if let Some(hash) = &cli.app_hash {
        config.set_app_hash(hash.clone());
    }
    if let Some(addr) = &cli.http_addr {
        config.set_http_addr(addr.clone());
    }
    if let Some(addr) = &cli.metrics_addr {
        config.set_metrics_addr(addr.clone());
    }
    Ok(config.resolve()?)
}

fn connector(settings: &Settings) -> Arc<dyn Connector> {
    Arc::new(TcpConnector::new(
        settings.bootstrap_address.clone(),
        settings.catalog.clone(),
    ))
}

/// Flip `shutdown` on Ctrl-C.
fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown.send(true);
            }
            Err(e) => {
                // Keep the sender alive: dropping it would stop the daemon.
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
        }
    });
}

async fn run_serve(settings: Settings) -> anyhow::Result<()> {
    info!(app_id = settings.identity.app_id, "dcstat daemon starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx.clone());

    // ── Prober ─────────────────────────────────────────────────

    let registry = Arc::new(Registry::new(
        connector(&settings),
        ProbeSettings::from(&settings),
    ));
    let registry_handle = tokio::spawn({
        let registry = registry.clone();
        async move { registry.start(shutdown_rx).await }
    });

    // ── HTTP ───────────────────────────────────────────────────

    let state = ApiState::new(registry, settings.down_after);
    let mut router = build_router(state.clone());
    let mut metrics = None;
    if settings.metrics_addr == settings.http_addr {
        warn!(addr = %settings.http_addr, "serving metrics on public endpoint");
        router = router.merge(metrics_router(state));
    } else {
        metrics = Some((settings.metrics_addr.as_str(), metrics_router(state)));
    }

    let served = serve_all(&settings.http_addr, router, metrics, &shutdown_tx).await;

    match registry_handle.await {
        Ok(Err(e)) if e.is_shutdown() => {}
        Ok(result) => warn!(?result, "registry stopped unexpectedly"),
        Err(e) => error!(error = %e, "registry task failed"),
    }

    served?;
    info!("dcstat daemon stopped");
    Ok(())
}

/// Run the public listener and, if given, the metrics listener until
/// shutdown. Either one stopping, cleanly or not, stops the other.
async fn serve_all(
    http_addr: &str,
    router: Router,
    metrics: Option<(&str, Router)>,
    shutdown: &watch::Sender<bool>,
) -> anyhow::Result<()> {
    let public = serve_until_stopped("http", http_addr, router, shutdown);
    match metrics {
        None => public.await,
        Some((addr, metrics)) => {
            let (public, metrics) =
                tokio::join!(public, serve_until_stopped("metrics", addr, metrics, shutdown));
            public.and(metrics)
        }
    }
}

async fn serve_until_stopped(
    name: &'static str,
    addr: &str,
    router: Router,
    shutdown: &watch::Sender<bool>,
) -> anyhow::Result<()> {
    let result = serve(name, addr, router, shutdown.subscribe()).await;
    if let Err(e) = &result {
        error!(server = name, error = ?e, "server failed, shutting down");
    }
    shutdown.send_replace(true);
    result
}

async fn serve(
    name: &'static str,
    addr: &str,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {name} listener on {addr}"))?;
    info!(server = name, addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

async fn run_check(settings: Settings) -> anyhow::Result<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let probe = ProbeSettings::from(&settings);
    let connector = connector(&settings);
    let endpoints = match discover(
        connector.as_ref(),
        &probe.identity,
        probe.bootstrap_timeout,
        probe.backoff,
        &mut shutdown_rx,
    )
    .await
    {
        Ok(endpoints) => endpoints,
        Err(e) => {
            info!(error = %e, "check interrupted");
            return Ok(());
        }
    };

    for endpoint in &endpoints {
        println!("DC {:02}: {}", endpoint.id, endpoint.address);
    }
    Ok(())
}
