//! NPC simulation.
//!
//! One call to `Simulation::tick` is one fixed step:
//! - skipped entirely while nobody is connected,
//! - every entity burns `tick_delta` seconds of its `wait_time`,
//! - entities whose `wait_time` reached zero chase the nearest player on the
//!   ground plane and hit the first player within `ATTACK_RANGE`,
//! - the full entity list is then broadcast.
//!
//! Player scans walk `WorldState::players` in ascending session id order, so
//! equal distances always resolve to the lowest id.

use std::collections::BTreeMap;

use lantern_shared::{
    config::DeathPolicy,
    math::Vec3,
    net::ServerMsg,
    rules::{ATTACK_COOLDOWN, ATTACK_DAMAGE, ATTACK_RANGE, ENTITY_MAX_SPEED, ENTITY_MIN_SPEED, ENTITY_Y},
    world::{Entity, Player, SessionId, WorldState},
};
use rand::Rng;
use tracing::{debug, info};

use crate::replicator::Replicator;

/// One landed attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Index into `WorldState::entities`.
    pub entity: usize,
    pub session: SessionId,
    /// Victim health after the hit.
    pub health: u8,
    /// Whether a `death` notification goes out for this hit.
    pub fatal: bool,
}

/// Creates the fixed entity set, `entity_0 .. entity_{count-1}`.
pub fn spawn_entities(count: usize, half_extent: f32, rng: &mut impl Rng) -> Vec<Entity> {
    let half_extent = half_extent.abs();
    (0..count)
        .map(|index| {
            let x = rng.gen_range(-half_extent..=half_extent);
            let z = rng.gen_range(-half_extent..=half_extent);
            let speed = rng.gen_range(ENTITY_MIN_SPEED..ENTITY_MAX_SPEED);
            Entity::new(index, Vec3::new(x, ENTITY_Y, z), speed)
        })
        .collect()
}

/// Closest player to `from` on the ground plane, with its position and
/// distance. The first player in iteration order wins ties.
pub fn nearest_player(
    players: &BTreeMap<SessionId, Player>,
    from: Vec3,
) -> Option<(SessionId, Vec3, f32)> {
    let mut best: Option<(SessionId, Vec3, f32)> = None;
    for player in players.values() {
        let pos = player.position();
        let dist = from.planar_distance(pos);
        if best.map_or(true, |(_, _, d)| dist < d) {
            best = Some((player.id, pos, dist));
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct Simulation {
    tick_delta: f32,
    death_policy: DeathPolicy,
    ticks: u64,
    active_ticks: u64,
}

impl Simulation {
    pub fn new(tick_delta: f32, death_policy: DeathPolicy) -> Self {
        Self {
            tick_delta,
            death_policy,
            ticks: 0,
            active_ticks: 0,
        }
    }

    pub fn tick_delta(&self) -> f32 {
        self.tick_delta
    }

    /// Ticks seen so far, idle ones included.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that ran the entity update.
    pub fn active_ticks(&self) -> u64 {
        self.active_ticks
    }

    /// Advances every entity by one step. Returns `None` when the world has
    /// no players, in which case nothing was touched.
    pub fn step(&self, world: &mut WorldState) -> Option<Vec<Hit>> {
        if !world.has_players() {
            return None;
        }

        let WorldState { players, entities } = world;
        let mut hits = Vec::new();
        for (index, entity) in entities.iter_mut().enumerate() {
            entity.wait_time -= self.tick_delta;
            if entity.wait_time > 0.0 {
                continue;
            }

            let Some((_, target, distance)) = nearest_player(players, entity.position()) else {
                continue;
            };
            if distance > 0.0 {
                entity.set_planar(entity.position().planar_step_toward(target, entity.speed));
            }

            if let Some(hit) = self.strike(index, entity, players) {
                hits.push(hit);
            }
        }
        Some(hits)
    }

    /// Hits the first eligible player within reach, if any.
    fn strike(
        &self,
        index: usize,
        entity: &mut Entity,
        players: &mut BTreeMap<SessionId, Player>,
    ) -> Option<Hit> {
        let from = entity.position();
        let victim = players.values_mut().find(|p| {
            from.planar_distance(p.position()) < ATTACK_RANGE
                && (p.is_alive() || self.death_policy == DeathPolicy::RepeatWhileInRange)
        })?;

        let health = victim.apply_damage(ATTACK_DAMAGE);
        entity.wait_time = ATTACK_COOLDOWN;
        Some(Hit {
            entity: index,
            session: victim.id,
            health,
            fatal: health == 0,
        })
    }

    /// Runs one step and replicates its results. Returns `false` for an idle
    /// tick, which sends nothing.
    pub fn tick(&mut self, world: &mut WorldState, replicator: &Replicator) -> bool {
        self.ticks += 1;
        let Some(hits) = self.step(world) else {
            return false;
        };
        self.active_ticks += 1;

        for hit in &hits {
            replicator.to_one(hit.session, &ServerMsg::Damage(hit.health));
            if hit.fatal {
                replicator.to_one(hit.session, &ServerMsg::Death);
                info!(session = %hit.session, entity = hit.entity, "Player died");
            } else {
                debug!(
                    session = %hit.session,
                    entity = hit.entity,
                    health = hit.health,
                    "Player hit"
                );
            }
        }

        replicator.to_all(&ServerMsg::EntitiesUpdate(world.entities.clone()));
        true
    }
}
