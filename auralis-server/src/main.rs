//! Composition root: wires the chunk geometry/DSP/cache/worker/controller
//! tiers (C1-C9) into a WebSocket server.

mod library;
mod rate_limit;
mod session;
mod ws;

use auralis_cache::Cache;
use auralis_core::config::exit_code;
use auralis_core::{AuralisConfig, TrackId};
use auralis_worker::{NoPredictions, PresetPredictor, Worker};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use library::DirectoryLibrary;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "auralis-server", about = "Interactive mastering stream server")]
struct Cli {
    /// Directory of source WAV files served by the library collaborator.
    #[arg(long)]
    music_dir: PathBuf,

    /// Directory the cache tiers are bootstrapped into (recreated on start).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Address to bind the WebSocket listener to.
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    max_concurrent_streams: Option<usize>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

pub struct AppState {
    cache: Arc<Cache>,
    worker: Arc<Worker<DirectoryLibrary>>,
    library: Arc<DirectoryLibrary>,
    config: AuralisConfig,
    semaphore: Arc<Semaphore>,
    /// Track id -> liveness flag for the session currently streaming it,
    /// across every connection. Entries are inserted when a session starts
    /// and removed once it retires, so an empty map means nothing is
    /// streaming anywhere on the server.
    pub active_streams: Mutex<HashMap<TrackId, Arc<AtomicBool>>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log_level))
      .init();

    let mut config = AuralisConfig::default();
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(bind) = &cli.bind {
        config.bind_addr = bind.clone();
    }
    if let Some(n) = cli.max_concurrent_streams {
        config.max_concurrent_streams = n;
    }

    let library = match DirectoryLibrary::scan(&cli.music_dir) {
        Ok(l) => Arc::new(l),
        Err(e) => {
            error!(error = %e, dir = %cli.music_dir.display(), "failed to scan music directory");
            return ExitCode::from(exit_code::CONFIG_ERROR as u8);
        }
    };

    let cache = match Cache::bootstrap(
        &config.cache_dir,
        config.tier1_bytes,
        config.tier2_bytes_with_headroom(),
    ) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, dir = %config.cache_dir.display(), "cache directory unwritable");
            return ExitCode::from(exit_code::CACHE_DIR_UNWRITABLE as u8);
        }
    };

    let worker = Arc::new(Worker::new(
        cache.clone(),
        library.clone(),
        Arc::new(NoPredictions) as Arc<dyn PresetPredictor>,
        config.clone(),
    ));
    tokio::spawn(worker.clone().run());

    let monitor = Arc::new(auralis_stream::MemoryMonitor::new(
        cache.clone(),
        worker.clone(),
        config.clone(),
    ));
    tokio::spawn(monitor.run(Box::new(auralis_stream::SysinfoSampler::new())));

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_streams));
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState {
        cache,
        worker,
        library,
        config,
        semaphore,
        active_streams: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
      .route("/ws", get(ws_handler))
      .with_state(state);

    let addr: SocketAddr = match bind_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "invalid bind address");
            return ExitCode::from(exit_code::CONFIG_ERROR as u8);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %addr, "failed to bind transport listener");
            return ExitCode::from(exit_code::TRANSPORT_BIND_FAILED as u8);
        }
    };

    info!(%addr, "auralis-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server loop exited with error");
        return ExitCode::FAILURE;
    }

    ExitCode::from(exit_code::OK as u8)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::handle_socket(socket, state))
}
