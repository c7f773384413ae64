//! World data model.
//!
//! `WorldState` is plain data. It is owned by exactly one task on the server
//! (see `lantern_server::server`), which is what makes every mutation below
//! single-writer. Clients receive copies of it through `init` and
//! `entitiesUpdate`.
//!
//! Players are keyed in a `BTreeMap`, so iterating `players` always visits
//! sessions in ascending id order. The simulation relies on that order for
//! its nearest-target and collision tie-breaks.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{math::Vec3, rules::MAX_HEALTH};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one connected session for the lifetime of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Allocates a process-unique id. Ids are never reused.
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected player's replicated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: SessionId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
    /// Always within `0..=MAX_HEALTH`.
    pub health: u8,
    pub username: String,
}

impl Player {
    pub fn new(id: SessionId, position: Vec3, username: String) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
            z: position.z,
            rotation: 0.0,
            health: MAX_HEALTH,
            username,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn set_pose(&mut self, position: Vec3, rotation: f32) {
        self.x = position.x;
        self.y = position.y;
        self.z = position.z;
        self.rotation = rotation;
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Subtracts `amount` health, flooring at zero. Returns the new health.
    pub fn apply_damage(&mut self, amount: u8) -> u8 {
        self.health = self.health.saturating_sub(amount);
        self.health
    }
}

/// A server-driven NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Distance covered per tick while chasing.
    pub speed: f32,
    /// Countdown in seconds. Not clamped: the entity acts once it reaches
    /// zero or below.
    pub wait_time: f32,
}

impl Entity {
    /// Creates the entity at `index` in the world's fixed sequence.
    pub fn new(index: usize, position: Vec3, speed: f32) -> Self {
        Self {
            id: format!("entity_{index}"),
            x: position.x,
            y: position.y,
            z: position.z,
            speed,
            wait_time: 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Moves on the ground plane only; `y` never changes after creation.
    pub fn set_planar(&mut self, position: Vec3) {
        self.x = position.x;
        self.z = position.z;
    }
}

/// All mutable game state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub players: BTreeMap<SessionId, Player>,
    pub entities: Vec<Entity>,
}

impl WorldState {
    /// Creates a world with a fixed entity set and no players.
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            players: BTreeMap::new(),
            entities,
        }
    }

    pub fn player(&self, id: SessionId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: SessionId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn has_players(&self) -> bool {
        !self.players.is_empty()
    }
}
