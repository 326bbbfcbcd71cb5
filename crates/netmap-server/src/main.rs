// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network map synchronization server
//!
//! # Usage
//!
//! ```bash
//! # Start server on default port (15001) with ./netmap.db
//! netmap-server
//!
//! # Custom port and database
//! netmap-server --port 16000 --database /var/lib/netmap/netmap.db
//!
//! # Everything from a config file
//! netmap-server --config server.json
//! ```

use clap::Parser;
use netmap_server::{MapServer, ServerConfig, SqliteStore};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Synchronization server for the shared network-map editor
#[derive(Parser, Debug)]
#[command(name = "netmap-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long)]
    bind: Option<String>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Log filter (a level such as `debug`, or directives like
    /// `netmap_server=trace,info`)
    #[arg(long)]
    log_level: Option<String>,

    /// Maximum number of connected sessions
    #[arg(long)]
    max_sessions: Option<usize>,
}

/// Filter from a level or directive string; invalid input falls back to `info`.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config, then let explicit flags override it
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind_address = bind.parse()?;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.max_sessions = max_sessions;
    }

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(&config.log_level))
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded config from {:?}", path);
    }

    info!("+----------------------------------------------------+");
    info!(
        "|       Netmap Server v{}                         |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:     {:38} |", config.listen_address());
    info!(
        "|  Database: {:38} |",
        config.database_path.display().to_string()
    );
    info!("|  Sessions: {:38} |", config.max_sessions);
    info!(
        "|  Frames:   {:38} |",
        format!("<= {} bytes", config.max_frame_size)
    );
    info!("+----------------------------------------------------+");

    let store = SqliteStore::open(&config.database_path)?;
    let server = MapServer::new(config)?;

    // Handle shutdown signals
    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        server_handle.shutdown();
    });

    server.run(store).await?;

    info!("Map server stopped");
    Ok(())
}
