//! # Tick Client Library
//!
//! The predicting half of the sync core. A client samples local input every
//! frame, moves its own unit immediately, sends the input to the server and
//! corrects itself whenever an authoritative snapshot arrives.
//!
//! ## Client-Side Prediction
//! Each frame with a key held produces a numbered input message. The input is
//! applied to the local unit right away and kept in an unacknowledged list
//! until a snapshot reports that the server has applied it.
//!
//! ## Server Reconciliation
//! A snapshot carries every entity's authoritative position and the highest
//! input sequence the server applied for it. The client moves its own unit
//! back to the authoritative position, drops the inputs the server has
//! acknowledged and replays the rest in send order. Remote units are simply
//! placed where the server says; units missing from a snapshot are removed.
//!
//! ## Module Organization
//!
//! - `config`: server address, frame period and movement limits
//! - `game`: the prediction engine and replay
//! - `input`: the [`input::InputSource`] seam plus scripted and random sources
//! - `rendering`: the [`rendering::Renderer`] seam plus a logging renderer
//! - `network`: the TCP connection and the per-frame client loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::ScriptedInput;
//! use client::network::{Client, Connection};
//! use client::rendering::LogRenderer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let connection = Connection::connect(&config.server_addr).await?;
//!
//!     let mut client = Client::new(
//!         connection,
//!         &config,
//!         ScriptedInput::square(30).with_frame_limit(600),
//!         LogRenderer::default(),
//!     );
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
