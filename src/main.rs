//! Lost & Found game server entry point.
//!
//! Startup order matters: config and database failures are fatal before the
//! listener ever opens, and a state-file restore that disagrees with the
//! config aborts the process. Shutdown drains HTTP work, then writes a
//! final snapshot.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lostfound_server::app::{spawn_auto_ticker, AppOptions, AppState, Application};
use lostfound_server::config::{self, Args};
use lostfound_server::http::build_router;
use lostfound_server::store::{restore_from_file, RecordStore, StateSaver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_tracing(&log_level);

    let loaded = config::load_game(&args.config_file)?;

    let db_url = std::env::var("GAME_DB_URL")
        .context("GAME_DB_URL environment variable must be set")?;
    let records = RecordStore::connect(&db_url)
        .await
        .context("failed to connect to the records database")?;
    records
        .prepare()
        .await
        .context("failed to prepare the records schema")?;

    let mut application = Application::new(
        loaded.game,
        loaded.loot_generator,
        loaded.retirement_time,
        AppOptions {
            randomize_spawn_points: args.randomize_spawn_points,
            auto_tick_enabled: args.tick_period.is_some(),
        },
        Some(records),
    );

    if let Some(state_file) = &args.state_file {
        restore_from_file(&mut application, state_file)
            .context("failed to restore server state")?;
    }

    let saver = args
        .state_file
        .clone()
        .map(|path| StateSaver::new(path, args.save_state_period));
    let state = AppState::new(application, saver);

    if let Some(period) = args.tick_period {
        spawn_auto_ticker(state.clone(), Duration::from_millis(period));
    }

    let router = build_router(state.clone(), args.www_root.clone());

    let addr: SocketAddr = bind_address().parse().context("invalid bind address")?;
    let listener = TcpListener::bind(addr).await?;
    info!("server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist the world after outstanding requests have drained.
    state.save_now().await.context("final state save failed")?;

    info!("server shutdown complete");
    Ok(())
}

fn bind_address() -> String {
    if let Ok(port) = std::env::var("PORT") {
        format!("0.0.0.0:{}", port)
    } else {
        std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
    }
}

/// Initialize tracing. `LOG_LEVEL` sets the default level; a full
/// `RUST_LOG` filter still wins when present.
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves when the process is asked to stop. The caller then drains the
/// listener and snapshots the world before exiting.
async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let signal = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!(signal, "stopping the game server; world state will be saved");
}
