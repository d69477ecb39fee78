//! # Snowfall Client Library
//!
//! This library provides the player side of the two-player rhythm game. It
//! joins the server's handshake to learn the shared start instant, judges the
//! player's key presses against the chart locally, and keeps its view of the
//! other player's judgments in step through the server.
//!
//! ## Architecture Overview
//!
//! ### Local Judgment
//! Every key press is judged immediately against the local copy of the chart.
//! The result is shown at once and sent to the server; the client never waits
//! for confirmation before giving feedback.
//!
//! ### Remote Judgments
//! The server echoes the canonical judgment for each note and the client
//! applies every echo, so a note the other player hit or missed stops falling
//! on this screen too. The one exception is a miss for a hold this player is
//! still holding: the hold keeps running and its release is judged locally.
//!
//! ### Single Owner
//! The judgment engine is owned by the render loop. The network tasks only
//! talk to it through channels that the loop drains once per frame.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The judgment engine: note lifecycle, hit and release judgment, misses,
//! the visible-window cursor and the judgment banner.
//!
//! ### Handshake Module (`handshake`)
//! Client half of the name exchange, latency probe and start instant.
//!
//! ### Input Module (`input`)
//! Keyboard to lane mapping and per-frame press/release edges.
//!
//! ### Network Module (`network`)
//! Send and receive tasks over the framed channel with a bounded outbound
//! queue.
//!
//! ### Rendering Module (`rendering`)
//! Lanes, falling notes, hold bodies, the judge line, pressed keys, the
//! countdown and the score.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::JudgmentEngine;
//! use shared::Chart;
//!
//! let chart = Chart::load("charts/basic.chart").unwrap();
//! let mut engine = JudgmentEngine::new(&chart);
//!
//! // Lane 3 pressed 1615 ms into the session
//! if let Some(judged) = engine.key_down(3, 1615.0) {
//!     println!("note {} judged {}", judged.note_id, judged.judgment);
//! }
//!
//! // Once per frame: misses decided by the passage of time
//! for missed in engine.tick(1700.0) {
//!     println!("note {} missed", missed.note_id);
//! }
//! ```

pub mod error;
pub mod game;
pub mod handshake;
pub mod input;
pub mod network;
pub mod rendering;
