/*
 * File: src/main.rs
 * Purpose: Process entry point: parse config, init logging, serve routes
 *
 * Follows the teacher's `main.rs` shape (init logging, build shared state,
 * mount routes, serve) generalized from a single hard-coded document map to
 * the full room coordinator.
 */

use std::sync::Arc;

use clap::Parser;
use room_coordinator::config::{LogFormat, ServerConfig};
use room_coordinator::http::{self, AppState};
use room_coordinator::room::RoomRegistry;
use room_coordinator::storage::MemoryStorage;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(config.log_format);

    let state = AppState {
        registry: Arc::new(RoomRegistry::new()),
        storage: Arc::new(MemoryStorage::new()),
        room_name_max_len: config.room_name_max_len,
    };

    let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "starting room coordinator");

    let routes = http::routes(state);
    let server = warp::serve(routes).run(addr);

    tokio::select! {
        _ = server => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
    }
}
