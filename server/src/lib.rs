//! # Tick Server Library
//!
//! The authoritative half of the sync core. The server owns the canonical
//! position of every connected player, validates and applies their inputs
//! once per tick, and broadcasts the resulting world snapshot to everyone.
//!
//! ## Architecture
//!
//! ### Connection Tasks
//! Each accepted TCP connection gets two tasks. The reader decodes
//! newline-delimited messages, stamps each valid input with its arrival time
//! and pushes it onto the shared [`shared::MessageQueue`]. The writer drains
//! a per-connection channel onto the socket, so a slow client never holds
//! up the tick loop or other clients.
//!
//! ### Tick Loop
//! A single task owns simulation. Every tick it takes the whole queue in one
//! swap, applies the inputs in arrival order and sends one encoded snapshot
//! to every client. Only the tick loop mutates entity positions.
//!
//! ### Input Validation
//! A client reports how long each input was held. The server compares that
//! claim with the time that actually passed since the player's previous
//! input and rejects claims exceeding it by more than a small tolerance.
//! Accepted inputs are clamped to a maximum step before being applied.
//!
//! ## Module Organization
//!
//! - `config`: listen address, tick rate and validation limits
//! - `registry`: id-keyed concurrent maps and the id allocator
//! - `entity`: per-player authoritative state
//! - `client`: per-connection outbound handle and writer task
//! - `game`: input validation and the tick engine
//! - `network`: listener, handshake and reader tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default()
//!         .with_addr("127.0.0.1:1339")
//!         .with_tick_rate(30);
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod entity;
pub mod game;
pub mod network;
pub mod registry;
