//! ClawMedic Daemon - HTTP front end and CLI for the diagnostic engine

pub mod commands;
pub mod config;
pub mod routes;
pub mod server;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing on stderr; `RUST_LOG` overrides the `info` default
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
