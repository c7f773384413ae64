//! Client implementation.
//!
//! The client keeps:
//! - the write half of the session stream, used directly for sends,
//! - a reader task that decodes server frames into an inbox channel,
//! - the `init` snapshot it was admitted with.
//!
//! Receiving goes through the inbox, so `recv_timeout` can be cancelled
//! without tearing a frame in half.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use lantern_shared::{
    net::{
        decode_server, ClientMsg, FrameWriter, InitSnapshot, MovePayload, ReliableConn, ServerMsg,
    },
    world::SessionId,
};
use tokio::{net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// How long `connect` waits for the server's `init`.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GameClient {
    pub id: SessionId,
    pub init: InitSnapshot,
    writer: FrameWriter<OwnedWriteHalf>,
    inbox: mpsc::UnboundedReceiver<ServerMsg>,
    reader_task: JoinHandle<()>,
}

impl GameClient {
    /// Connects and waits for the session's `init` snapshot.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let conn = ReliableConn::connect(addr).await?;
        let (mut reader, writer) = conn.into_split();

        let (tx, mut inbox) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(Some(payload)) => match decode_server(&payload) {
                        Ok(msg) => {
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Undecodable server message"),
                    },
                    Ok(None) => {
                        debug!("Server closed the session");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Session read failed");
                        break;
                    }
                }
            }
        });

        let first = tokio::time::timeout(INIT_TIMEOUT, inbox.recv())
            .await
            .context("timed out waiting for init")?
            .context("server closed before init")?;
        let init = match first {
            ServerMsg::Init(init) => init,
            other => anyhow::bail!("expected init, got {other:?}"),
        };

        info!(session = %init.id, players = init.players.len(), "Joined server");
        Ok(Self {
            id: init.id,
            init,
            writer,
            inbox,
            reader_task,
        })
    }

    pub async fn send(&mut self, msg: &ClientMsg) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn send_move(&mut self, x: f32, y: f32, z: f32, rotation: f32) -> anyhow::Result<()> {
        self.send(&ClientMsg::Move(MovePayload { x, y, z, rotation }))
            .await
    }

    pub async fn send_chat(&mut self, message: &str) -> anyhow::Result<()> {
        self.send(&ClientMsg::Chat(message.to_string())).await
    }

    pub async fn send_flashlight(&mut self, is_on: bool) -> anyhow::Result<()> {
        self.send(&ClientMsg::Flashlight(is_on)).await
    }

    /// Sends an arbitrary payload as one frame. Lets tests speak badly.
    pub async fn send_raw(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        self.writer.send_frame(&frame).await
    }

    /// Next server message, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<ServerMsg> {
        self.inbox.recv().await
    }

    /// Next server message within `timeout`. `Ok(None)` on timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => anyhow::bail!("session closed"),
            Err(_) => Ok(None),
        }
    }

    /// Skips messages until one satisfies `pred`, failing after `timeout`.
    pub async fn recv_until<F>(&mut self, timeout: Duration, mut pred: F) -> anyhow::Result<ServerMsg>
    where
        F: FnMut(&ServerMsg) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.inbox.recv())
                .await
                .context("timed out waiting for message")?
                .context("session closed")?;
            if pred(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Everything already received, without waiting.
    pub fn drain(&mut self) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Closes the write side and stops reading.
    pub async fn close(mut self) -> anyhow::Result<()> {
        let result = self.writer.shutdown().await;
        self.reader_task.abort();
        result
    }
}
