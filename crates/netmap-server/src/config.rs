// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server configuration.

use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 15001)
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file; `:memory:` for a throwaway database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Largest accepted frame, header included (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Maximum number of connected sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Socket read buffer size (bytes)
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Disable Nagle's algorithm on client connections
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    15001
}

fn default_database_path() -> PathBuf {
    PathBuf::from("netmap.db")
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_max_sessions() -> usize {
    256
}

fn default_read_chunk_size() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            database_path: default_database_path(),
            max_frame_size: default_max_frame_size(),
            max_sessions: default_max_sessions(),
            read_chunk_size: default_read_chunk_size(),
            tcp_nodelay: true,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// `host:port` to listen on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.max_frame_size < FRAME_HEADER_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "max_frame_size must be at least {}",
                FRAME_HEADER_SIZE
            )));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue("max_sessions cannot be 0".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "read_chunk_size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
