//! `lantern_server`
//!
//! Server-side systems:
//! - World-owning actor with a fixed-interval tick
//! - Session lifecycle (connect, move, chat, flashlight, disconnect)
//! - NPC chase/attack simulation
//! - Fan-out replication to sessions
//! - Liveness endpoint
//!
//! Networking model:
//! - TCP: one length-prefixed JSON stream per session
//! - HTTP: `GET /health` on a separate, optional listener

pub mod health;
pub mod registry;
pub mod replicator;
pub mod server;
pub mod session;
pub mod simulation;

pub use server::{GameServer, ServerHandle, ServerRuntime};
