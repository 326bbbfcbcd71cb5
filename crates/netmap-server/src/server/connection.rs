// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client connection handling.

use super::EngineEvent;
use crate::protocol::Frame;
use crate::session::SessionId;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One accepted TCP connection.
///
/// Raw chunks go to the engine untouched; frame reassembly happens there.
/// Frames queued by the engine are written back in order.
pub struct SessionConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: SessionId,
    read_buffer: Vec<u8>,
}

impl SessionConnection {
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: SessionId,
        read_chunk_size: usize,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            id,
            read_buffer: vec![0u8; read_chunk_size.max(1)],
        }
    }

    /// Pump bytes until either side closes, then tell the engine.
    pub async fn run(
        mut self,
        events: mpsc::UnboundedSender<EngineEvent>,
        mut outbound: mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), ConnectionError> {
        let result = self.pump(&events, &mut outbound).await;
        // Harmless when the engine already dropped the session.
        let _ = events.send(EngineEvent::Disconnected { id: self.id });
        result
    }

    async fn pump(
        &mut self,
        events: &mpsc::UnboundedSender<EngineEvent>,
        outbound: &mut mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                read = self.stream.read(&mut self.read_buffer) => {
                    let n = read?;
                    if n == 0 {
                        info!("Connection closed: {}", self.peer_addr);
                        return Ok(());
                    }
                    let data = EngineEvent::Data {
                        id: self.id,
                        bytes: self.read_buffer[..n].to_vec(),
                    };
                    if events.send(data).is_err() {
                        return Err(ConnectionError::EngineStopped);
                    }
                }
                frame = outbound.recv() => {
                    match frame {
                        Some(frame) => self.stream.write_all(frame.as_bytes()).await?,
                        None => {
                            debug!("{} released by engine, closing {}", self.id, self.peer_addr);
                            self.stream.shutdown().await?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine stopped")]
    EngineStopped,
}
