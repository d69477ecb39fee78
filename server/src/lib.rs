//! # Snowfall Server Library
//!
//! This library provides the authoritative server for the two-player rhythm
//! game. It synchronizes both players' clocks, merges the judgments each
//! player reports into one canonical score, and echoes the canonical result
//! back so both screens agree.
//!
//! ## Core Responsibilities
//!
//! ### Clock Synchronization
//! Every accepted connection goes through a fixed handshake: the player sends
//! its name, acknowledges the connection, answers a latency probe, and finally
//! receives the wall-clock instant at which playback starts. The instant is
//! shifted by each player's own round-trip time.
//!
//! ### Score Reconciliation
//! Both players judge every note locally. The server keeps the first hit it
//! receives for a note, and only counts a miss against the combo once both
//! players have missed it.
//!
//! ### Client Management
//! Handles the lifecycle of player connections:
//! - Handshake failures drop that player only
//! - A failed broadcast removes the player it was addressed to
//! - The session ends once every player has disconnected or the chart is over
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Roster of synchronized players and the write halves used for echoes.
//!
//! ### Game Module (`game`)
//! The authoritative note list, the merge rule and the lock around it.
//!
//! ### Handshake Module (`handshake`)
//! Server half of the name exchange, latency probe and start scheduling.
//!
//! ### Network Module (`network`)
//! Listener and the supervisor loop that multiplexes every player's frames
//! into the reconciler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use shared::Chart;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chart = Chart::load("charts/basic.chart")?;
//!     let server = Server::bind("127.0.0.1:65432", &chart, ServerConfig::default()).await?;
//!
//!     // Waits for both players, synchronizes them and reconciles judgments
//!     // until they have both left or the chart is over.
//!     let stats = server.run().await?;
//!     println!("{}", stats);
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod error;
pub mod game;
pub mod handshake;
pub mod network;
