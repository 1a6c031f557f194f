//! Roulette server: round engine behind an axum HTTP/WebSocket surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use roulette::{
    db::Database,
    dispatch::Dispatcher,
    fairness::DrawGenerator,
    hub::HubActor,
    ledger::LedgerManager,
    round::{RoundManager, repository},
};
use roulette_server::{api, config::ServerConfig, logging, metrics};
use tokio::signal;

const HELP: &str = "\
Run the provably fair roulette server

USAGE:
  roulette_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  DISPATCHER_QUEUE_SIZE    Bounded job queue capacity (default 100)
  DISPATCHER_WORKERS       Worker pool size (default 10)
  SETTLE_DELAY_SECS        Delay before winner/close notices (default 15)
  MAX_BETS_PER_ROUND       Bets a user may hold on one round (default 2)
  REQUEST_TIMEOUT_SECS     Per-request deadline (default 10)
  HUB_INBOX_SIZE           Hub inbox capacity (default 256)
  WS_BUFFER_SIZE           Outbound frames buffered per connection (default 64)
  METRICS_BIND             Prometheus listener, disabled when unset
  WHEEL_CONFIG_PATH        JSON wheel table, built-in table when unset
  RUST_LOG                 Log filter (default info,sqlx=warn,hyper=warn)
";

/// Interval for copying dispatcher and hub counters into gauges
const GAUGE_INTERVAL: Duration = Duration::from_secs(15);

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;
    let wheel = config.wheel_table()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exposed at http://{}/metrics", addr);
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.run_migrations()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
    info!("Database connected successfully");

    let pool = Arc::new(db.pool().clone());

    let nonce = repository::next_nonce(&pool).await?;
    info!("Draw generator resuming at nonce {}", nonce);

    let (dispatcher, _workers) = Dispatcher::start(config.dispatcher)?;

    let (hub_actor, hub) = HubActor::new(config.hub);
    tokio::spawn(hub_actor.run());

    let rounds = Arc::new(RoundManager::new(
        pool.clone(),
        LedgerManager::new(pool.clone()),
        DrawGenerator::starting_at(nonce),
        wheel,
        dispatcher.clone(),
        hub.clone(),
        config.round.clone(),
    ));

    if config.metrics_bind.is_some() {
        metrics::spawn_background_gauges(dispatcher.clone(), hub.clone(), GAUGE_INTERVAL);
    }

    let state = api::AppState {
        rounds,
        hub,
        dispatcher,
        db: db.clone(),
        request_timeout: config.request_timeout,
        ws_buffer: config.ws_buffer,
        ws_connections: Arc::default(),
    };
    let app = api::create_router(state);

    info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    db.close().await;

    Ok(())
}

/// Graceful shutdown on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
