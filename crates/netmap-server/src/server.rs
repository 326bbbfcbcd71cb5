// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP front end and the engine task.
//!
//! Connection tasks only move bytes. Everything they read is forwarded as an
//! [`EngineEvent`] to a single engine task that owns the [`Dispatcher`];
//! replies come back through each session's outbound queue. Requests are
//! therefore applied one at a time, in arrival order, with no shared-state
//! locking.

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::protocol::Frame;
use crate::session::SessionId;
use crate::store::MapStore;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

pub mod connection;

pub use connection::{ConnectionError, SessionConnection};

/// Input of the engine task.
#[derive(Debug)]
pub enum EngineEvent {
    Connected {
        id: SessionId,
        host: String,
        outbound: mpsc::UnboundedSender<Frame>,
    },
    Data {
        id: SessionId,
        bytes: Vec<u8>,
    },
    Disconnected {
        id: SessionId,
    },
    /// Write back every cached aggregate and stop.
    Shutdown,
}

/// Drive a dispatcher until shutdown or until every event sender is gone.
pub fn run_engine<S: MapStore>(
    mut dispatcher: Dispatcher<S>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) -> Dispatcher<S> {
    while let Some(event) = events.blocking_recv() {
        match event {
            EngineEvent::Connected { id, host, outbound } => {
                dispatcher.connect(id, host, outbound)
            }
            EngineEvent::Data { id, bytes } => dispatcher.receive(id, &bytes),
            EngineEvent::Disconnected { id } => dispatcher.disconnect(id),
            EngineEvent::Shutdown => {
                debug!("Engine shutting down");
                break;
            }
        }
    }
    dispatcher.shutdown();
    dispatcher
}

/// Map synchronization server.
#[derive(Clone)]
pub struct MapServer {
    config: Arc<ServerConfig>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    active_sessions: Arc<AtomicUsize>,
    next_session: Arc<AtomicU64>,
}

impl MapServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            active_sessions: Arc::new(AtomicUsize::new(0)),
            next_session: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run<S: MapStore + 'static>(&self, store: S) -> Result<(), ServerError> {
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        info!("Map server listening on {}", addr);
        self.serve(listener, store).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve<S: MapStore + 'static>(
        &self,
        listener: TcpListener,
        store: S,
    ) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(store, self.config.max_frame_size);
        let engine = tokio::task::spawn_blocking(move || {
            run_engine(dispatcher, events_rx);
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let active = self.active_sessions.load(Ordering::SeqCst);
                            if active >= self.config.max_sessions {
                                warn!("Max sessions reached, rejecting {}", peer_addr);
                                continue;
                            }
                            if self.config.tcp_nodelay {
                                if let Err(e) = stream.set_nodelay(true) {
                                    warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                                }
                            }

                            let id = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
                            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                            let connected = EngineEvent::Connected {
                                id,
                                host: peer_addr.to_string(),
                                outbound: outbound_tx,
                            };
                            if events_tx.send(connected).is_err() {
                                error!("Engine stopped, no longer accepting");
                                break;
                            }
                            info!("New connection from {} ({})", peer_addr, id);

                            self.active_sessions.fetch_add(1, Ordering::SeqCst);
                            let conn = SessionConnection::new(
                                stream,
                                peer_addr,
                                id,
                                self.config.read_chunk_size,
                            );
                            let events = events_tx.clone();
                            let active = self.active_sessions.clone();

                            tokio::spawn(async move {
                                if let Err(e) = conn.run(events, outbound_rx).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // The engine may already be gone if it failed; nothing left to flush then.
        let _ = events_tx.send(EngineEvent::Shutdown);
        drop(events_tx);
        let result = engine
            .await
            .map_err(|e| ServerError::Engine(e.to_string()));

        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Signal the server to shut down. Safe to call before `serve` starts
    /// waiting.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Currently open connections.
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Bind error: {0}")]
    Bind(String),
    #[error("Server already running")]
    AlreadyRunning,
    #[error("Engine task failed: {0}")]
    Engine(String),
}
