//! Session lifecycle: connect, per-session events, disconnect.
//!
//! Every handler runs on the server actor, so each one sees and leaves
//! `WorldState` whole. Events from a session without a player (a late frame
//! racing its own disconnect) are ignored.

use chrono::Utc;
use lantern_shared::{
    math::Vec3,
    net::{ChatMessage, ClientMsg, FlashlightToggle, InitSnapshot, MovePayload, PlayerMoved, ServerMsg},
    rules::{PLAYER_SPAWN_HALF_EXTENT, PLAYER_SPAWN_Y},
    world::{Player, SessionId, WorldState},
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng};
use tracing::{debug, info, warn};

use crate::replicator::{Outbound, Replicator};

const NAME_ADJECTIVES: &[&str] = &[
    "Quiet", "Pale", "Lost", "Hollow", "Brave", "Restless", "Dim", "Silent", "Wary", "Faint",
];
const NAME_NOUNS: &[&str] = &[
    "Moth", "Wanderer", "Candle", "Echo", "Lantern", "Shade", "Ember", "Owl", "Drifter", "Wick",
];

pub struct SessionRegistry {
    rng: StdRng,
}

impl SessionRegistry {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    fn generate_username(&mut self) -> String {
        let adjective = NAME_ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("Quiet");
        let noun = NAME_NOUNS.choose(&mut self.rng).copied().unwrap_or("Moth");
        let suffix: u16 = self.rng.gen_range(0..100);
        format!("{adjective}{noun}{suffix:02}")
    }

    fn spawn_position(&mut self) -> Vec3 {
        let x = self
            .rng
            .gen_range(-PLAYER_SPAWN_HALF_EXTENT..=PLAYER_SPAWN_HALF_EXTENT);
        let z = self
            .rng
            .gen_range(-PLAYER_SPAWN_HALF_EXTENT..=PLAYER_SPAWN_HALF_EXTENT);
        Vec3::new(x, PLAYER_SPAWN_Y, z)
    }

    /// Admits a session: spawns its player, sends it the world, and announces
    /// it to everyone else.
    pub fn connect(
        &mut self,
        world: &mut WorldState,
        replicator: &mut Replicator,
        id: SessionId,
        outbound: Outbound,
    ) -> Player {
        if world.players.contains_key(&id) {
            warn!(session = %id, "Session connected twice, replacing player");
        }
        let player = Player::new(id, self.spawn_position(), self.generate_username());
        world.players.insert(id, player.clone());
        replicator.attach(id, outbound);

        let init = ServerMsg::Init(InitSnapshot {
            id,
            players: world.players.clone(),
            entities: world.entities.clone(),
        });
        replicator.to_one(id, &init);
        replicator.to_all_except(id, &ServerMsg::PlayerJoined(player.clone()));

        info!(
            session = %id,
            username = %player.username,
            players = world.player_count(),
            "Player joined"
        );
        player
    }

    /// Dispatches one validated session event.
    pub fn handle(
        &mut self,
        world: &mut WorldState,
        replicator: &Replicator,
        id: SessionId,
        msg: ClientMsg,
    ) -> bool {
        match msg {
            ClientMsg::Move(pose) => self.on_move(world, replicator, id, pose),
            ClientMsg::Chat(text) => self.on_chat(world, replicator, id, text),
            ClientMsg::Flashlight(is_on) => self.on_flashlight(world, replicator, id, is_on),
        }
    }

    /// Overwrites the player's pose and relays it to the other sessions.
    pub fn on_move(
        &mut self,
        world: &mut WorldState,
        replicator: &Replicator,
        id: SessionId,
        pose: MovePayload,
    ) -> bool {
        let Some(player) = world.player_mut(id) else {
            debug!(session = %id, "Move from unknown session ignored");
            return false;
        };
        player.set_pose(pose.position(), pose.rotation);

        let moved = ServerMsg::PlayerMoved(PlayerMoved {
            id,
            x: pose.x,
            y: pose.y,
            z: pose.z,
            rotation: pose.rotation,
        });
        replicator.to_all_except(id, &moved);
        true
    }

    /// Broadcasts a chat line to everyone, the sender included.
    pub fn on_chat(
        &mut self,
        world: &WorldState,
        replicator: &Replicator,
        id: SessionId,
        message: String,
    ) -> bool {
        let Some(player) = world.player(id) else {
            debug!(session = %id, "Chat from unknown session ignored");
            return false;
        };
        let chat = ServerMsg::ChatMessage(ChatMessage {
            id,
            username: player.username.clone(),
            message,
            timestamp: Utc::now().timestamp_millis(),
        });
        replicator.to_all(&chat);
        true
    }

    /// Relays a flashlight toggle. Nothing is stored.
    pub fn on_flashlight(
        &mut self,
        world: &WorldState,
        replicator: &Replicator,
        id: SessionId,
        is_on: bool,
    ) -> bool {
        if world.player(id).is_none() {
            debug!(session = %id, "Flashlight toggle from unknown session ignored");
            return false;
        }
        replicator.to_all_except(id, &ServerMsg::PlayerFlashlight(FlashlightToggle { id, is_on }));
        true
    }

    /// Removes the session's player and tells the remaining sessions.
    pub fn disconnect(
        &mut self,
        world: &mut WorldState,
        replicator: &mut Replicator,
        id: SessionId,
    ) -> bool {
        replicator.detach(id);
        let Some(player) = world.players.remove(&id) else {
            debug!(session = %id, "Disconnect for unknown session ignored");
            return false;
        };
        replicator.to_all(&ServerMsg::PlayerLeft(id));
        info!(
            session = %id,
            username = %player.username,
            players = world.player_count(),
            "Player left"
        );
        true
    }
}
