//! Player connection tracking for the multiplayer server
//!
//! This module holds the server-side view of each synchronized player:
//! - Connection lifecycle (accepted, handshaking, ready, active, closed)
//! - The write half used for broadcasts
//!
//! Read halves are multiplexed by the supervisor loop in `network`. A
//! connection is removed on its first I/O failure; the others keep going.

use log::{debug, info, warn};
use shared::protocol::write_frame;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub type FrameWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle of one player connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Handshaking,
    Ready,
    Active,
    Closed,
}

/// A synchronized player and the handles needed to talk to them
pub struct PlayerConnection {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Display name sent during the handshake
    pub name: String,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// Round-trip time measured during the handshake
    pub rtt: Duration,
    pub state: ConnectionState,
    writer: FrameWriter,
}

impl PlayerConnection {
    pub fn new(id: u32, name: String, addr: SocketAddr, rtt: Duration, writer: FrameWriter) -> Self {
        Self {
            id,
            name,
            addr,
            rtt,
            state: ConnectionState::Ready,
            writer,
        }
    }

    /// Marks the player as taking part in gameplay.
    pub fn activate(&mut self) {
        self.state = ConnectionState::Active;
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Closed;
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutting down writer for player {}: {}", self.id, e);
        }
    }
}

/// Roster of live player connections
///
/// Enforces the player limit and fans broadcasts out to every live
/// connection, reporting which ones failed so the caller can drop them.
pub struct ClientManager {
    clients: BTreeMap<u32, PlayerConnection>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            max_clients,
        }
    }

    /// Adds a synchronized player. Returns false when the roster is full.
    pub fn add_client(&mut self, connection: PlayerConnection) -> bool {
        if self.clients.len() >= self.max_clients {
            warn!(
                "Refusing player {} ({}): roster full",
                connection.name, connection.addr
            );
            return false;
        }

        info!(
            "Player {} ({}) joined from {} with rtt {:?}",
            connection.id, connection.name, connection.addr, connection.rtt
        );
        self.clients.insert(connection.id, connection);
        true
    }

    /// Removes a player and shuts down its write half. Returns false if
    /// already gone.
    pub async fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(mut connection) = self.clients.remove(client_id) {
            connection.close().await;
            info!("Player {} ({}) disconnected", connection.id, connection.name);
            true
        } else {
            false
        }
    }

    pub fn name(&self, client_id: &u32) -> Option<&str> {
        self.clients.get(client_id).map(|connection| connection.name.as_str())
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.values().map(|connection| connection.name.clone()).collect()
    }

    /// Writes one frame to every live player and returns the ids whose
    /// write failed.
    pub async fn broadcast(&mut self, payload: &str) -> Vec<u32> {
        let mut failed = Vec::new();
        for (id, connection) in self.clients.iter_mut() {
            if let Err(e) = write_frame(&mut connection.writer, payload).await {
                warn!("Broadcast to player {} failed: {}", id, e);
                failed.push(*id);
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
