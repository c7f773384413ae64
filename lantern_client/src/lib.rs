//! `lantern_client`
//!
//! Client-side helpers:
//! - Session connection (`init` handshake, typed sends, inbox receive)
//! - A local mirror of the server world built from replicated events

pub mod client;
pub mod mirror;

pub use client::GameClient;
pub use mirror::WorldMirror;
