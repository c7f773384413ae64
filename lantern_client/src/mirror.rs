//! Local copy of the server world.
//!
//! Applies server events in arrival order. The server is authoritative, so
//! nothing here is predicted or reconciled; the mirror only ever reflects
//! the last thing the server said.

use std::collections::{BTreeMap, VecDeque};

use lantern_shared::{
    net::{ChatMessage, InitSnapshot, ServerMsg},
    world::{Player, SessionId, WorldState},
};

/// Chat lines kept for display.
pub const CHAT_HISTORY: usize = 64;

#[derive(Debug, Clone)]
pub struct WorldMirror {
    pub own_id: SessionId,
    pub world: WorldState,
    pub flashlights: BTreeMap<SessionId, bool>,
    pub chat: VecDeque<ChatMessage>,
    pub dead: bool,
    /// `entitiesUpdate` messages applied so far.
    pub updates: u64,
}

impl WorldMirror {
    pub fn from_init(init: &InitSnapshot) -> Self {
        Self {
            own_id: init.id,
            world: WorldState {
                players: init.players.clone(),
                entities: init.entities.clone(),
            },
            flashlights: BTreeMap::new(),
            chat: VecDeque::with_capacity(CHAT_HISTORY),
            dead: false,
            updates: 0,
        }
    }

    pub fn own_player(&self) -> Option<&Player> {
        self.world.player(self.own_id)
    }

    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Init(init) => *self = Self::from_init(init),
            ServerMsg::PlayerJoined(player) => {
                self.world.players.insert(player.id, player.clone());
            }
            ServerMsg::PlayerMoved(moved) => {
                if let Some(p) = self.world.player_mut(moved.id) {
                    p.x = moved.x;
                    p.y = moved.y;
                    p.z = moved.z;
                    p.rotation = moved.rotation;
                }
            }
            ServerMsg::ChatMessage(chat) => {
                if self.chat.len() == CHAT_HISTORY {
                    self.chat.pop_front();
                }
                self.chat.push_back(chat.clone());
            }
            ServerMsg::PlayerFlashlight(toggle) => {
                self.flashlights.insert(toggle.id, toggle.is_on);
            }
            ServerMsg::Damage(health) => {
                let own_id = self.own_id;
                if let Some(p) = self.world.player_mut(own_id) {
                    p.health = *health;
                }
            }
            ServerMsg::Death => self.dead = true,
            ServerMsg::EntitiesUpdate(entities) => {
                self.world.entities = entities.clone();
                self.updates += 1;
            }
            ServerMsg::PlayerLeft(id) => {
                self.world.players.remove(id);
                self.flashlights.remove(id);
            }
        }
    }
}
