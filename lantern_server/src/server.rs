//! Server actor and runtime.
//!
//! `GameServer` exclusively owns the `WorldState`. Session tasks never touch
//! it: they post `Command`s through a `ServerHandle`, and the actor applies
//! them one at a time between simulation ticks. Since the tick and every
//! command handler run to completion on the same task, no reader ever sees a
//! half-applied mutation and snapshots are always point-in-time.
//!
//! Timing notes:
//! - Each tick advances the simulation by the constant `tick_delta`.
//! - The interval uses `MissedTickBehavior::Burst`, so ticks delayed by a
//!   busy loop are caught up and gameplay speed tracks wall-clock time on
//!   average instead of drifting slower.
//! - Gaps longer than twice the nominal period are counted as late ticks.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use anyhow::Context;
use lantern_shared::{
    config::ServerConfig,
    net::{encode_frame, ClientMsg, ReliableListener, ServerMsg, MAX_FRAME_LEN},
    world::{SessionId, WorldState},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    health::{self, HealthReport},
    registry::SessionRegistry,
    replicator::{Outbound, Replicator},
    session,
    simulation::{spawn_entities, Simulation},
};

/// Commands queued before session tasks start waiting on the actor.
const COMMAND_CAPACITY: usize = 1024;

/// Share of a frame the entity list may take. The rest of `init` is players.
pub const ENTITY_FRAME_BUDGET: usize = MAX_FRAME_LEN / 2;

/// Work posted to the actor.
#[derive(Debug)]
pub enum Command {
    Connect { id: SessionId, outbound: Outbound },
    Event { id: SessionId, msg: ClientMsg },
    Disconnect { id: SessionId },
    Health { reply: oneshot::Sender<HealthReport> },
}

/// Cloneable sender side of the actor.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<Command>,
}

impl ServerHandle {
    async fn post(&self, cmd: Command) -> anyhow::Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("server actor stopped"))
    }

    pub async fn connect(&self, id: SessionId, outbound: Outbound) -> anyhow::Result<()> {
        self.post(Command::Connect { id, outbound }).await
    }

    pub async fn event(&self, id: SessionId, msg: ClientMsg) -> anyhow::Result<()> {
        self.post(Command::Event { id, msg }).await
    }

    pub async fn disconnect(&self, id: SessionId) -> anyhow::Result<()> {
        self.post(Command::Disconnect { id }).await
    }

    pub async fn health(&self) -> anyhow::Result<HealthReport> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Health { reply }).await?;
        rx.await.context("health reply dropped")
    }
}

/// The world-owning actor.
pub struct GameServer {
    cfg: ServerConfig,
    world: WorldState,
    registry: SessionRegistry,
    simulation: Simulation,
    replicator: Replicator,
    started: Instant,
    late_ticks: u64,
    rx: mpsc::Receiver<Command>,
}

impl GameServer {
    /// Builds the world (entities included) and the handle used to reach it.
    pub fn new(cfg: ServerConfig) -> (Self, ServerHandle) {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let entities = spawn_entities(cfg.entity_count, cfg.entity_half_extent, &mut rng);
        let registry = SessionRegistry::new(StdRng::seed_from_u64(rng.gen()));
        let simulation = Simulation::new(cfg.tick_delta(), cfg.death_policy);

        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let server = Self {
            cfg,
            world: WorldState::new(entities),
            registry,
            simulation,
            replicator: Replicator::default(),
            started: Instant::now(),
            late_ticks: 0,
            rx,
        };
        (server, ServerHandle { tx })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Fails when the entity list alone would crowd `init` out of a frame.
    ///
    /// An oversized `init` or `entitiesUpdate` cannot be sent at all, so a
    /// world that big is refused up front instead of going silent.
    pub fn check_frame_budget(&self) -> anyhow::Result<()> {
        let frame = encode_frame(&ServerMsg::EntitiesUpdate(self.world.entities.clone()))
            .with_context(|| {
                format!("{} entities do not fit in one frame", self.world.entity_count())
            })?;
        anyhow::ensure!(
            frame.len() <= ENTITY_FRAME_BUDGET,
            "{} entities need {} bytes per update, budget is {ENTITY_FRAME_BUDGET}",
            self.world.entity_count(),
            frame.len(),
        );
        Ok(())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            player_count: self.world.player_count(),
            entity_count: self.world.entity_count(),
            uptime_seconds: self.started.elapsed().as_secs(),
            ticks: self.simulation.ticks(),
            late_ticks: self.late_ticks,
        }
    }

    /// Applies one command to the world.
    pub fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { id, outbound } => {
                self.registry
                    .connect(&mut self.world, &mut self.replicator, id, outbound);
            }
            Command::Event { id, msg } => {
                self.registry
                    .handle(&mut self.world, &self.replicator, id, msg);
            }
            Command::Disconnect { id } => {
                self.registry
                    .disconnect(&mut self.world, &mut self.replicator, id);
            }
            Command::Health { reply } => {
                let _ = reply.send(self.health());
            }
        }
    }

    /// Executes one fixed simulation step.
    pub fn tick(&mut self) -> bool {
        self.simulation.tick(&mut self.world, &self.replicator)
    }

    /// Runs until `shutdown` flips to `true` or every handle is dropped.
    ///
    /// Returning drops the replicator, which closes every outbound queue and
    /// lets the session writers finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.cfg.tick_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut last_tick = Instant::now();

        info!(
            tick_ms = period.as_millis() as u64,
            entities = self.world.entity_count(),
            "Simulation started"
        );

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Simulation stopping");
                    break;
                }
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All server handles dropped");
                        break;
                    }
                },
                _ = interval.tick() => {
                    let now = Instant::now();
                    let gap = now.duration_since(last_tick);
                    last_tick = now;
                    if gap > period * 2 {
                        self.late_ticks += 1;
                        debug!(
                            gap_ms = gap.as_millis() as u64,
                            tick = self.simulation.ticks(),
                            "Tick ran late"
                        );
                    }
                    self.tick();
                }
            }
        }

        info!(
            ticks = self.simulation.ticks(),
            late_ticks = self.late_ticks,
            players = self.world.player_count(),
            "Simulation stopped"
        );
    }
}

/// Resolves once `shutdown` reads `true` or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Accepts sessions until shutdown and gives each its own task.
pub async fn accept_loop(
    listener: ReliableListener,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("No longer accepting sessions");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    let id = SessionId::new_unique();
                    tokio::spawn(session::run_session(conn, peer, id, handle.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
        }
    }
}

/// A running server: actor, accept loop and optional health endpoint.
pub struct ServerRuntime {
    pub addr: SocketAddr,
    pub health_addr: Option<SocketAddr>,
    pub handle: ServerHandle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerRuntime {
    /// Binds every listener named in `cfg` and spawns the server tasks.
    pub async fn launch(cfg: ServerConfig) -> anyhow::Result<Self> {
        let (server, handle) = GameServer::new(cfg.clone());
        server.check_frame_budget()?;

        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let health_listener = match &cfg.health_addr {
            Some(health_addr) => {
                let health_addr: SocketAddr = health_addr.parse().context("parse health_addr")?;
                Some(
                    tokio::net::TcpListener::bind(health_addr)
                        .await
                        .context("health bind")?,
                )
            }
            None => None,
        };
        let health_addr = match &health_listener {
            Some(l) => Some(l.local_addr().context("health local_addr")?),
            None => None,
        };

        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![
            tokio::spawn(server.run(shutdown_rx.clone())),
            tokio::spawn(accept_loop(listener, handle.clone(), shutdown_rx.clone())),
        ];
        if let Some(l) = health_listener {
            let handle = handle.clone();
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = health::serve(l, handle, shutdown_rx).await {
                    warn!(error = %e, "Health endpoint failed");
                }
            }));
        }

        info!(%addr, health = ?health_addr, "Server listening");
        Ok(Self {
            addr,
            health_addr,
            handle,
            shutdown,
            tasks,
        })
    }

    /// Stops accepting sessions and stops the tick timer.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for every server task to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Server task panicked");
            }
        }
    }
}

/// Helper for tests: launch on an ephemeral localhost port.
pub async fn bind_ephemeral(tick_ms: u64) -> anyhow::Result<(ServerRuntime, ServerConfig)> {
    let mut cfg = ServerConfig {
        server_addr: "127.0.0.1:0".to_string(),
        health_addr: Some("127.0.0.1:0".to_string()),
        tick_ms,
        seed: Some(42),
        ..Default::default()
    };
    let runtime = ServerRuntime::launch(cfg.clone()).await?;
    cfg.server_addr = runtime.addr.to_string();
    cfg.health_addr = runtime.health_addr.map(|a| a.to_string());
    Ok((runtime, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replicator::outbound_channel;
    use bytes::Bytes;
    use lantern_shared::net::{decode_server, MovePayload, ServerMsg};

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_ms: 5,
            seed: Some(1),
            entity_count: 3,
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(decode_server(&frame[4..]).unwrap());
        }
        out
    }

    #[test]
    fn new_server_has_fixed_entities_and_no_players() {
        let (server, _handle) = GameServer::new(test_config());
        assert_eq!(server.world().entity_count(), 3);
        assert_eq!(server.world().player_count(), 0);
        let report = server.health();
        assert_eq!(report.status, "ok");
        assert_eq!(report.entity_count, 3);
        assert_eq!(report.player_count, 0);
    }

    #[test]
    fn simulation_steps_by_configured_tick() {
        let (server, _handle) = GameServer::new(test_config());
        assert_eq!(server.simulation().tick_delta(), test_config().tick_delta());
        assert_eq!(server.simulation().ticks(), 0);
    }

    #[test]
    fn default_world_fits_in_a_frame() {
        let (server, _handle) = GameServer::new(ServerConfig::default());
        server.check_frame_budget().unwrap();
    }

    #[test]
    fn oversized_world_is_refused() {
        let cfg = ServerConfig {
            entity_count: 1000,
            ..test_config()
        };
        let (server, _handle) = GameServer::new(cfg);
        assert!(server.check_frame_budget().is_err());
    }

    #[tokio::test]
    async fn launch_rejects_world_too_big_to_replicate() {
        let cfg = ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            entity_count: 1000,
            ..test_config()
        };
        assert!(ServerRuntime::launch(cfg).await.is_err());
    }

    #[test]
    fn largest_accepted_world_still_delivers_init_and_updates() {
        let mut count = 1;
        loop {
            let cfg = ServerConfig {
                entity_count: count + 1,
                ..test_config()
            };
            if GameServer::new(cfg).0.check_frame_budget().is_err() {
                break;
            }
            count += 1;
        }
        let (mut server, _handle) = GameServer::new(ServerConfig {
            entity_count: count,
            ..test_config()
        });
        let (tx, mut rx) = outbound_channel();
        server.handle_command(Command::Connect {
            id: SessionId(1),
            outbound: tx,
        });
        assert!(server.tick());
        let msgs = drain(&mut rx);
        assert!(matches!(msgs.first(), Some(ServerMsg::Init(init)) if init.entities.len() == count));
        assert!(msgs
            .iter()
            .any(|m| matches!(m, ServerMsg::EntitiesUpdate(e) if e.len() == count)));
    }

    #[test]
    fn same_seed_builds_same_world() {
        let (a, _) = GameServer::new(test_config());
        let (b, _) = GameServer::new(test_config());
        assert_eq!(a.world().entities, b.world().entities);
    }

    #[test]
    fn last_disconnect_freezes_entities() {
        let (mut server, _handle) = GameServer::new(test_config());
        let (tx, mut rx) = outbound_channel();
        let id = SessionId(1);
        server.handle_command(Command::Connect { id, outbound: tx });
        server.handle_command(Command::Event {
            id,
            msg: ClientMsg::Move(MovePayload {
                x: 0.0,
                y: 1.6,
                z: 0.0,
                rotation: 0.0,
            }),
        });
        assert!(server.tick());
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::EntitiesUpdate(_))));

        server.handle_command(Command::Disconnect { id });
        let frozen = server.world().entities.clone();
        for _ in 0..10 {
            assert!(!server.tick());
        }
        assert_eq!(server.world().entities, frozen);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn actor_ticks_and_answers_health() -> anyhow::Result<()> {
        let (server, handle) = GameServer::new(test_config());
        let (stop_tx, stop_rx) = watch::channel(false);
        let actor = tokio::spawn(server.run(stop_rx));

        let (tx, mut rx) = outbound_channel();
        handle.connect(SessionId(1), tx).await?;

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await?
            .context("outbound closed")?;
        assert!(matches!(decode_server(&first[4..])?, ServerMsg::Init(_)));

        let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await?
            .context("outbound closed")?;
        assert!(matches!(
            decode_server(&update[4..])?,
            ServerMsg::EntitiesUpdate(_)
        ));

        let report = handle.health().await?;
        assert_eq!(report.player_count, 1);
        assert_eq!(report.entity_count, 3);
        assert!(report.ticks >= 1);

        stop_tx.send(true)?;
        actor.await?;
        // The replicator is gone with the actor, so the queue ends.
        while rx.recv().await.is_some() {}
        assert!(handle.health().await.is_err());
        Ok(())
    }
}
