use anyhow::Result;
use clap::Parser;
use pdf_merge::LopdfBackend;
use pdf_merge_jobs::{BlobStore, DiskStore, JobStore, MemoryStore, StoreConfig, spawn_sweeper};
use pdf_merge_server::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pdfm-server", about = "PDF merge web service", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "PDFM_ADDR", default_value = "127.0.0.1:5000")]
    addr: SocketAddr,

    /// JSON file with upload limits and retention settings
    #[arg(long, env = "PDFM_CONFIG")]
    config: Option<PathBuf>,

    /// Keep uploaded and merged files in this directory instead of memory
    #[arg(long, env = "PDFM_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => StoreConfig::load(path).await?,
        None => StoreConfig::default(),
    };
    config.validate()?;

    let storage: Arc<dyn BlobStore> = match &cli.storage_dir {
        Some(dir) => Arc::new(DiskStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };
    let store = JobStore::with_parts(config, storage, Arc::new(LopdfBackend));
    let sweeper = spawn_sweeper(&store);

    let app = create_app(AppState::new(store));
    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
