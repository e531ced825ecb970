//! # fplsync CLI
//!
//! ```bash
//! fplsync --config ./config/fplsync.toml serve     # server + background worker
//! fplsync --config ./config/fplsync.toml refresh   # one scrape/upload cycle
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use fplsync::blob::HttpBlobStore;
use fplsync::config::{self, Config};
use fplsync::fpl::FplClient;
use fplsync::manifest::ManifestStore;
use fplsync::notify::UpdatePublisher;
use fplsync::scrape::RosterScraper;
use fplsync::server::{self, AppState};
use fplsync::worker::RefreshWorker;

/// FPL snapshot sync — content-addressed scrape/upload cycle with an SSE
/// update stream and TTL-cached read API.
#[derive(Parser)]
#[command(
    name = "fplsync",
    about = "Content-addressed FPL snapshot sync with SSE live updates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fplsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/SSE server with the background refresh worker.
    Serve,

    /// Run exactly one refresh cycle and exit.
    ///
    /// Scrapes every available gameweek, uploads novel content, and
    /// updates the manifest backup. Useful for cron-style deployments
    /// and smoke tests.
    Refresh,
}

/// Wire the shared components from config.
struct App {
    manifest: Arc<ManifestStore>,
    publisher: Arc<UpdatePublisher>,
    worker: Arc<RefreshWorker>,
    blobs: Arc<HttpBlobStore>,
    fpl: Arc<FplClient>,
    stop_tx: watch::Sender<bool>,
}

fn build(config: &Config) -> Result<App> {
    let manifest = Arc::new(ManifestStore::new());
    let publisher = Arc::new(UpdatePublisher::new());
    let blobs = Arc::new(HttpBlobStore::new(&config.upload)?);
    let fpl = Arc::new(FplClient::new(&config.origin)?);
    let scraper = Arc::new(RosterScraper::new(
        fpl.clone(),
        config.scraper.entries.clone(),
    ));
    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = Arc::new(RefreshWorker::new(
        scraper,
        blobs.clone(),
        manifest.clone(),
        publisher.clone(),
        config.scraper.clone(),
        stop_rx,
    ));
    Ok(App {
        manifest,
        publisher,
        worker,
        blobs,
        fpl,
        stop_tx,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    let app = build(&config)?;

    match cli.command {
        Commands::Serve => {
            app.worker.load_backup_manifest().await;

            let worker = app.worker.clone();
            let worker_handle = tokio::spawn(async move { worker.run().await });

            let state = AppState::new(
                app.manifest.clone(),
                app.publisher.clone(),
                app.worker.clone(),
                app.blobs.clone(),
                app.fpl.clone(),
                &config.scraper,
            );

            let stop_tx = app.stop_tx.clone();
            let shutdown = async move {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("received shutdown signal, stopping gracefully");
                let _ = stop_tx.send(true);
            };

            server::run_server(&config.server.bind, state, shutdown).await?;

            // Server is down; wait for the worker to finish its cycle.
            let _ = app.stop_tx.send(true);
            let _ = worker_handle.await;
        }
        Commands::Refresh => {
            app.worker.load_backup_manifest().await;
            let stats = app.worker.run_cycle().await;
            println!(
                "refresh: {}/{} gameweeks updated, {} unchanged, {} failed",
                stats.updated, stats.attempted, stats.unchanged, stats.failed
            );
            if stats.failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
