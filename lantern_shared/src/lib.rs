//! `lantern_shared`
//!
//! Types used by both the server and its clients.
//!
//! Design goals:
//! - One authoritative data model for players and NPC entities.
//! - Explicit, validated wire schemas for every session event.
//! - Deterministic math (planar, `f32`, no SIMD).
//! - No `unsafe`.

pub mod config;
pub mod error;
pub mod math;
pub mod net;
pub mod rules;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::world::*;
}
