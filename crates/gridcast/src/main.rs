//! gridcast server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gridcast_identity::{HttpIdentityService, IdentityService, StaticIdentityService};
use gridcast_server::config::ServerConfig;
use gridcast_server::metrics::install_recorder;
use gridcast_server::server::GridServer;
use gridcast_store::sqlite::{self, SqliteGridStore};
use gridcast_store::{GridStore, MemoryGridStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Real-time collaborative grid server.
#[derive(Debug, Parser)]
#[command(name = "gridcast", version, about)]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// SQLite database path. Omit for an in-memory grid.
    #[arg(long)]
    db: Option<PathBuf>,

    /// SQLite connection pool size.
    #[arg(long, default_value_t = 4)]
    db_pool_size: u32,

    /// Half-width of the writable world; updates outside are rejected.
    #[arg(long, default_value_t = 1000)]
    world_bound: i64,

    /// Base URL of the identity/color service.
    #[arg(long)]
    identity_url: Option<String>,

    /// Static identity as `uid=color`, repeatable. Used when no
    /// --identity-url is given.
    #[arg(long = "demo-user", value_name = "UID=COLOR")]
    demo_users: Vec<String>,

    /// Maximum concurrent WebSocket connections.
    #[arg(long, default_value_t = 500)]
    max_connections: usize,

    /// Requests allowed per identity per window.
    #[arg(long, default_value_t = 60)]
    rate_limit: usize,

    /// Rolling rate-limit window in seconds.
    #[arg(long, default_value_t = 60)]
    rate_window_secs: u64,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_store(cli: &Cli) -> anyhow::Result<Arc<dyn GridStore>> {
    match &cli.db {
        Some(path) => {
            let path = path.to_str().context("database path is not valid UTF-8")?;
            let pool = sqlite::new_file(path, cli.db_pool_size)
                .with_context(|| format!("opening sqlite database at {path}"))?;
            let conn = pool.get().context("checking out a connection")?;
            sqlite::run_migrations(&conn).context("running migrations")?;
            drop(conn);
            info!(path, pool_size = cli.db_pool_size, "using sqlite store");
            Ok(Arc::new(
                SqliteGridStore::new(pool).with_world_bound(cli.world_bound),
            ))
        }
        None => {
            warn!("no --db given, grid state will not survive a restart");
            Ok(Arc::new(
                MemoryGridStore::new().with_world_bound(cli.world_bound),
            ))
        }
    }
}

fn build_identity(cli: &Cli) -> anyhow::Result<Arc<dyn IdentityService>> {
    if let Some(url) = &cli.identity_url {
        info!(url, "using HTTP identity service");
        return Ok(Arc::new(HttpIdentityService::new(url.clone())));
    }

    anyhow::ensure!(
        !cli.demo_users.is_empty(),
        "provide --identity-url or at least one --demo-user uid=color"
    );
    let mut identity = StaticIdentityService::default();
    for entry in &cli.demo_users {
        let (uid, color) = entry
            .split_once('=')
            .with_context(|| format!("--demo-user {entry:?} is not uid=color"))?;
        identity = identity.with_user(uid, color);
    }
    info!(users = cli.demo_users.len(), "using static identity service");
    Ok(Arc::new(identity))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let metrics = install_recorder().context("installing metrics recorder")?;
    let store = build_store(&cli)?;
    let identity = build_identity(&cli)?;

    let config = ServerConfig {
        host: cli.host.clone(),
        port: cli.port,
        max_connections: cli.max_connections,
        rate_limit_window_secs: cli.rate_window_secs,
        rate_limit_max_requests: cli.rate_limit,
        ..ServerConfig::default()
    };

    let server = GridServer::new(config, store, identity, Some(metrics));
    let state = server.state();

    let _signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received ctrl-c, shutting down");
                state.shutdown.shutdown();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    server.serve().await.context("server failed")?;
    Ok(())
}
