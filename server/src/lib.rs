//! # Voxel Arena Server Library
//!
//! This library provides the authoritative server for a voxel capture-the-flag
//! shooter. It owns the canonical map and player state, streams the map to
//! joining players, validates what clients claim and replicates the outcome
//! to everyone else.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Every peer moves through `Disconnected → Connecting → Connected`:
//! - Connect requests are checked for protocol version, then capacity, and
//!   refused with a reason code otherwise
//! - Connecting players download the compressed map one at a time
//! - A finished download is followed by a snapshot of existing players and
//!   the game state, after which broadcasts reach the player
//! - Disconnects release the map transfer, drop carried intel, announce the
//!   departure and recycle the slot
//!
//! ### Authoritative Simulation
//! The server steps player movement and grenades against the voxel map on a
//! fixed tick, applies fall and weapon damage, counts down respawns and
//! drives the capture-the-flag rules.
//!
//! ### Replication
//! Outgoing packets are encoded into per-kind scratch buffers and fanned out
//! over the transport. Position snapshots for all players go out on their
//! own fixed period as an unreliable world update.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One task owns all game state. Each iteration drains pending transport
//! events, then runs tick work. No locks guard game state.
//!
//! ### Transport Seam
//! The server talks to the network through the [`transport::Transport`]
//! trait. [`udp::UdpTransport`] carries packets over UDP;
//! [`transport::MemoryTransport`] records traffic for tests.
//!
//! ## Module Organization
//!
//! - `config`: defaults, TOML file and command-line overrides
//! - `error`: startup and runtime failures
//! - `transport` / `udp`: the network seam and its adapters
//! - `entity`: intels and bases placed in the world
//! - `connection`: player slots and the fixed-capacity pool
//! - `replication`: scratch buffers, sends and broadcasts
//! - `map_transfer`: compressed map streaming with a single owner
//! - `game`: spawn selection and the capture state machine
//! - `combat`: hit validation, grenades and damage falloff
//! - `network` / `handlers`: the server core and per-packet handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::udp::UdpTransport;
//! use shared::VoxelMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let transport = UdpTransport::bind(&config.bind_address(), config.peer_timeout()).await?;
//!     let mut server = Server::new(config, VoxelMap::flat(40), transport);
//!
//!     // Runs until Ctrl-C: drains packets, ticks the simulation and
//!     // broadcasts world updates
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod combat;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod game;
pub mod handlers;
pub mod map_transfer;
pub mod network;
pub mod replication;
pub mod transport;
pub mod udp;
