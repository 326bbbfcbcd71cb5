// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synchronization server for a shared network-map editor.
//!
//! Many editor sessions view and change a few shared aggregates: maps
//! (symbols and the connections between them) and nodes (device records
//! with their interfaces). The server keeps every session's view consistent,
//! lets only one session at a time edit a node, and writes aggregates back
//! to the store when nobody needs them any more.
//!
//! # Layers
//!
//! - [`protocol`]: length-prefixed big-endian frames and their payloads
//! - [`idmap`]: placeholder-to-permanent id reconciliation per session
//! - [`cache`]: reference-counted map and node caches with fan-out
//! - [`dispatcher`]: frame reassembly and request routing
//! - [`store`]: load/save boundary, SQLite and in-memory backends
//! - [`server`]: tokio TCP front end feeding a single engine task
//!
//! # Example
//!
//! ```no_run
//! use netmap_server::{MapServer, ServerConfig, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::default();
//! let store = SqliteStore::open(&config.database_path)?;
//! let server = MapServer::new(config)?;
//! server.run(store).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod idmap;
pub mod model;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use config::{ConfigError, ServerConfig};
pub use dispatcher::Dispatcher;
pub use server::{MapServer, ServerError};
pub use session::SessionId;
pub use store::{MapStore, MemoryStore, SqliteStore};
