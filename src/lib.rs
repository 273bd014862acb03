pub mod api;
pub mod catalog;
pub mod checksum;
pub mod descriptor;
pub mod error;
pub mod metrics;
pub mod packager;
pub mod protocol;
pub mod version;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::router::api_router;
use crate::catalog::Catalog;
use crate::metrics::router::metrics_router;
use crate::protocol::{SessionOptions, DEFAULT_VERIFY_OFFSET};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Root folder laid out as `<firmware>/<board version>/{*.des,*.bin}`
    #[clap(long, env, default_value = "firmwares")]
    pub firmware_dir: PathBuf,
    #[clap(long, env, default_value = "0.0.0.0:4040")]
    pub listen_addr: String,
    #[clap(long, env, default_value = "0.0.0.0:9090")]
    pub metrics_listen_addr: String,
    #[clap(long, env, default_value = "info")]
    log_level: LevelFilter,
    /// Data block offset from which devices receive the firmware checksum
    #[clap(long, env, default_value_t = DEFAULT_VERIFY_OFFSET, value_parser = parse_u32)]
    pub verify_offset: u32,
    /// Do not answer unknown firmware selections with an `unsupported` notice
    #[clap(long, env, required(false), default_value_t = false)]
    pub silent_unsupported: bool,
}

impl Cli {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            verify_offset: self.verify_offset,
            notify_unsupported: !self.silent_unsupported,
        }
    }
}

/// Parses a `u32` given in decimal or `0x`-prefixed hexadecimal.
fn parse_u32(val: &str) -> Result<u32, String> {
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => val.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{val}': {e}"))
}

/// Loads the firmware catalog and checks it can be fully served with the
/// given verify offset.
///
/// # Errors
///
/// Returns an error if the catalog fails to load or holds an image whose
/// tail would overlap the verify offset.
pub async fn load_catalog(firmware_dir: PathBuf, verify_offset: u32) -> Result<Arc<Catalog>> {
    let dir = firmware_dir.clone();
    let catalog = tokio::task::spawn_blocking(move || Catalog::load(dir))
        .await?
        .with_context(|| format!("loading firmware catalog from {}", firmware_dir.display()))?;

    if let Some(largest) = catalog.largest_image_size() {
        if largest >= verify_offset {
            bail!(
                "firmware image of {largest} bytes cannot be served below verify offset {verify_offset:#x}"
            );
        }
    }

    Ok(Arc::new(catalog))
}

/// Installs the Prometheus recorder, then loads the catalog so that metrics
/// recorded while loading are exported.
///
/// Returns the `/metrics` router along with the catalog.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or the catalog fails
/// to load (see [`load_catalog`]).
pub async fn init_metrics_and_catalog(
    firmware_dir: PathBuf,
    verify_offset: u32,
) -> Result<(axum::Router, Arc<Catalog>)> {
    let metrics = metrics_router()?;
    let catalog = load_catalog(firmware_dir, verify_offset).await?;
    Ok((metrics, catalog))
}

/// Runs the firmware streaming server with the provided CLI configuration.
///
/// Initializes logging, loads the firmware catalog (fatal on any error, no
/// connection is accepted before it is complete), then serves devices and
/// metrics until Ctrl+C.
///
/// # Errors
///
/// Returns an error if:
/// - The firmware catalog fails to load or validate.
/// - The metrics recorder cannot be installed.
/// - Binding to the configured listen addresses fails.
pub async fn run(cli: Cli) -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(cli.log_level)
        .with(fmt::layer())
        .init();

    let session_options = cli.session_options();
    let (metrics, catalog) =
        init_metrics_and_catalog(cli.firmware_dir.clone(), session_options.verify_offset).await?;

    info!(
        entries = catalog.len(),
        verify_offset = session_options.verify_offset,
        notify_unsupported = session_options.notify_unsupported,
        "Firmware catalog loaded"
    );

    // Graceful shutdown setup
    let cancel_token = CancellationToken::new();

    let ctrl_c_listener_task = tokio::spawn({
        let cancel_token_clone = cancel_token.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C signal");
            } else {
                info!("Ctrl+C received, proceeding with graceful shutdown...");
            }
            cancel_token_clone.cancel();
        }
    });

    tokio::try_join!(
        start_main_server(
            &cli.listen_addr,
            catalog,
            session_options,
            cancel_token.clone()
        ),
        start_metrics_server(&cli.metrics_listen_addr, metrics, cancel_token.clone()),
    )?;

    // Waits for signal before exiting gracefully
    ctrl_c_listener_task.await?;

    info!("All services shut down gracefully.");

    Ok(())
}

async fn start_main_server(
    listen_address: &str,
    catalog: Arc<Catalog>,
    session_options: SessionOptions,
    cancel_token: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(listen_address).await?;
    info!("Firmware server listening on {}", listener.local_addr()?);

    let shutdown_future = async move {
        cancel_token.cancelled().await;
    };

    axum::serve(listener, api_router(catalog, session_options))
        .with_graceful_shutdown(shutdown_future)
        .await?;
    info!("Main server shut down gracefully");
    Ok(())
}

async fn start_metrics_server(
    listen_address: &str,
    router: axum::Router,
    cancel_token: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(listen_address).await?;
    info!("Metrics server listening on {}", listener.local_addr()?);

    let shutdown_future = async move {
        cancel_token.cancelled().await;
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_future)
        .await?;
    info!("Metrics server shut down gracefully");
    Ok(())
}
