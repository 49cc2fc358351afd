//! # home-mcp
//!
//! MCP (Model Context Protocol) server that reports the health of a fleet of
//! Netdata-monitored servers, the state of an optional MikroTik router and
//! container logs from an optional Dozzle instance.
//! Runs as a stdio JSON-RPC server, launched by an AI agent host.
//!
//! ## Architecture
//!
//! ```text
//! main.rs         — entry point, config loading, logging, MCP server launch
//! config.rs       — CLI / env-var / JSON file configuration
//! error.rs        — caller-visible error descriptor
//! model.rs        — tool-facing value types
//! netdata.rs      — HTTP client for the Netdata REST API
//! dozzle.rs       — HTTP client for Dozzle (event stream and logs)
//! routeros/       — RouterOS API codec, session and queries
//! normalize/      — raw backend responses → model types (pure)
//! collect.rs      — per-server Netdata operations
//! fleet.rs        — concurrent fan-out with per-server isolation
//! registry.rs     — configured servers and router, resolved by name
//! mcp.rs          — MCP JSON-RPC protocol handler (stdio)
//! tools.rs        — tool definitions and handlers
//! ```
//!
//! ## Tools
//!
//! - **Fleet**: `list_servers`, `get_all_servers_overview`, `get_server_health`,
//!   `get_network_stats`, `list_containers`, `get_container_stats`
//! - **Router**: `get_mikrotik_interfaces`, `get_mikrotik_resources`,
//!   `get_mikrotik_dhcp_leases`, `get_mikrotik_traffic`
//! - **Logs**: `get_dozzle_hosts`, `get_dozzle_containers`,
//!   `get_dozzle_container_logs`

mod collect;
mod config;
mod dozzle;
mod error;
mod fleet;
mod mcp;
mod model;
mod netdata;
mod normalize;
mod registry;
mod routeros;
mod tools;

#[cfg(test)]
mod testutil;

use clap::Parser;
use config::Cli;
use registry::ServerRegistry;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let resolved = match config::load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("home-mcp: configuration error: {e}");
            std::process::exit(1);
        }
    };

    // stdout carries JSON-RPC; logs go to stderr.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| resolved.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %resolved.source.display(),
        "home-mcp starting"
    );

    let router = resolved
        .router
        .as_ref()
        .map(|r| format!("{}:{}", r.host, r.port));
    let registry = match ServerRegistry::from_config(resolved) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to build HTTP clients");
            std::process::exit(1);
        }
    };

    if registry.is_empty() {
        warn!("no servers configured; fleet tools will report config_error");
    }
    info!(
        servers = registry.len(),
        router = router.as_deref().unwrap_or("disabled"),
        dozzle = registry.dozzle_enabled(),
        "registry ready"
    );

    mcp::run_stdio(registry).await;
}
