/*
 * File: src/config.rs
 * Purpose: Server configuration, mirroring the teacher's `ServerConfig`
 *
 * The teacher's `websocket::server::ServerConfig` covers host/port and
 * heartbeat timing; this generalizes it with a CLI/env surface (`clap`) and
 * the room-name length bound the HTTP front end enforces (spec.md §6).
 */

use std::time::Duration;

use clap::Parser;

/// Runtime configuration for the room coordinator.
#[derive(Debug, Clone, Parser)]
#[command(name = "room-coordinator", about = "Per-room realtime session coordinator")]
pub struct ServerConfig {
    /// Host address to bind to.
    #[arg(long, env = "ROOM_COORDINATOR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the server to.
    #[arg(long, env = "ROOM_COORDINATOR_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Interval for sending heartbeat pings to clients.
    #[arg(long, value_parser = parse_seconds, default_value = "30")]
    pub heartbeat_interval: Duration,

    /// Time before considering a connection timed out.
    #[arg(long, value_parser = parse_seconds, default_value = "60")]
    pub connection_timeout: Duration,

    /// Maximum room-name length in bytes (spec.md §6).
    #[arg(long, default_value_t = 128)]
    pub room_name_max_len: usize,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn parse_seconds(s: &str) -> Result<Duration, std::num::ParseIntError> {
    s.parse::<u64>().map(Duration::from_secs)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(60),
            room_name_max_len: 128,
            log_format: LogFormat::Pretty,
        }
    }
}
