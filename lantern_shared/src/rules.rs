//! Gameplay tuning constants.

/// Maximum (and starting) player health.
pub const MAX_HEALTH: u8 = 100;

/// Players spawn with `x` and `z` drawn from `[-PLAYER_SPAWN_HALF_EXTENT, PLAYER_SPAWN_HALF_EXTENT]`.
pub const PLAYER_SPAWN_HALF_EXTENT: f32 = 5.0;

/// Eye height players spawn at.
pub const PLAYER_SPAWN_Y: f32 = 1.6;

/// Fixed vertical position of every NPC entity.
pub const ENTITY_Y: f32 = 1.0;

/// Per-tick movement range for entity speed, sampled once at startup.
pub const ENTITY_MIN_SPEED: f32 = 0.02;
pub const ENTITY_MAX_SPEED: f32 = 0.05;

/// Planar distance below which an entity can hit a player.
pub const ATTACK_RANGE: f32 = 1.5;

/// Seconds an entity waits after landing a hit.
pub const ATTACK_COOLDOWN: f32 = 1.0;

/// Damage applied per hit.
pub const ATTACK_DAMAGE: u8 = 1;

/// Nominal simulation period.
pub const DEFAULT_TICK_MS: u64 = 16;

/// Longest chat message relayed, in characters.
pub const MAX_CHAT_CHARS: usize = 256;
