use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use recast::analysis::AnalysisManager;
use recast::config::Config;
use recast::data::{AnalysisStore, Database, ReplayTaskStore, TraceStore};
use recast::replay::ReplayManager;
use recast::sandbox::{DockerGateway, SandboxGateway};
use recast::util;
use recast::web::{run_server, WebAppState};

/// Replay captured network traffic against a sandboxed target
#[derive(Parser, Debug)]
#[command(name = "recast", version, about)]
struct Args {
    /// Address to bind the web server to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Data directory (default ~/.recast, or RECAST_DATA_DIR)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

fn data_dir_override(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| std::env::var_os("RECAST_DATA_DIR").map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RECAST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    util::init_data_dir(data_dir_override(args.data_dir));

    let mut config = Config::load();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let uploads_dir = util::uploads_dir();
    std::fs::create_dir_all(&uploads_dir)
        .with_context(|| format!("creating uploads directory {}", uploads_dir.display()))?;

    // The server stays up without a database; records then live in memory
    // only and do not survive a restart
    let database = match Database::open_default() {
        Ok(db) => {
            info!(path = %db.path.display(), "Database ready");
            Some(db)
        }
        Err(e) => {
            warn!(error = %e, "Database unavailable, keeping records in memory only");
            None
        }
    };

    let trace_store = database.as_ref().map(|db| TraceStore::new(db.connection()));
    let task_store = ReplayTaskStore::new(database.as_ref().map(|db| db.connection()));
    let analysis = AnalysisManager::new(
        database
            .as_ref()
            .map(|db| AnalysisStore::new(db.connection())),
    );

    let gateway: Arc<dyn SandboxGateway> = Arc::new(
        DockerGateway::new(&config.sandbox)
            .context("docker binary not found; install docker or set sandbox.docker_bin")?,
    );
    let replay = ReplayManager::new(
        task_store,
        gateway,
        config.replay.clone(),
        config.sandbox.remote_dir.clone(),
    );

    let state = WebAppState::new(config.clone(), trace_store, replay, analysis, uploads_dir);

    run_server(state, config.server).await
}
