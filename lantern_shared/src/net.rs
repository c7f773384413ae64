//! Wire protocol and framing.
//!
//! Every session is a single TCP stream carrying length-prefixed frames:
//! a big-endian `u32` byte count followed by one JSON document. Messages
//! are adjacently tagged, `{"event": "<name>", "data": <payload>}`, with
//! event names matching the session event table (`move`, `playerMoved`,
//! `entitiesUpdate`, ...).
//!
//! Inbound messages are decoded through `decode_client`, which also
//! validates them. Outbound messages are encoded once per broadcast with
//! `encode_frame` and the resulting `Bytes` is shared by every recipient.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, net::SocketAddr};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{
    error::ValidationError,
    math::Vec3,
    rules::MAX_CHAT_CHARS,
    world::{Entity, Player, SessionId},
};

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Client -> server events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    Move(MovePayload),
    Chat(String),
    Flashlight(bool),
}

/// Reported pose. Trusted as-is apart from the finiteness check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MovePayload {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
}

impl MovePayload {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl ClientMsg {
    /// Checks and normalizes a decoded message.
    ///
    /// Chat text is trimmed and cut to `MAX_CHAT_CHARS` characters.
    pub fn validate(self) -> Result<Self, ValidationError> {
        match self {
            ClientMsg::Move(m) => {
                if !m.position().is_finite() {
                    return Err(ValidationError::NonFinite { field: "position" });
                }
                if !m.rotation.is_finite() {
                    return Err(ValidationError::NonFinite { field: "rotation" });
                }
                Ok(ClientMsg::Move(m))
            }
            ClientMsg::Chat(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ValidationError::EmptyChat);
                }
                Ok(ClientMsg::Chat(text.chars().take(MAX_CHAT_CHARS).collect()))
            }
            other @ ClientMsg::Flashlight(_) => Ok(other),
        }
    }
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Sent once, to the new session only.
    Init(InitSnapshot),
    PlayerJoined(Player),
    PlayerMoved(PlayerMoved),
    ChatMessage(ChatMessage),
    PlayerFlashlight(FlashlightToggle),
    /// The recipient's new health.
    Damage(u8),
    Death,
    /// Full entity sequence, every tick while anyone is connected.
    EntitiesUpdate(Vec<Entity>),
    PlayerLeft(SessionId),
}

/// Point-in-time copy of the world for a new session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitSnapshot {
    pub id: SessionId,
    pub players: BTreeMap<SessionId, Player>,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlayerMoved {
    pub id: SessionId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: SessionId,
    pub username: String,
    pub message: String,
    /// Milliseconds since the Unix epoch, assigned by the server.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlashlightToggle {
    pub id: SessionId,
    pub is_on: bool,
}

/// Serializes `msg` into one complete frame (length prefix included).
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    anyhow::ensure!(
        payload.len() <= MAX_FRAME_LEN,
        "frame of {} bytes exceeds {MAX_FRAME_LEN}",
        payload.len()
    );
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes and validates one inbound payload.
pub fn decode_client(payload: &[u8]) -> Result<ClientMsg, ValidationError> {
    let msg: ClientMsg = serde_json::from_slice(payload)?;
    msg.validate()
}

/// Decodes one outbound payload. Used by clients and tests.
pub fn decode_server(payload: &[u8]) -> anyhow::Result<ServerMsg> {
    serde_json::from_slice(payload).context("deserialize server msg")
}

/// Reads length-prefixed frames.
///
/// `recv` is not cancel-safe: dropping it mid-frame desynchronizes the
/// stream. Drive it from a dedicated task.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the next payload, or `None` when the peer closed cleanly
    /// between frames.
    pub async fn recv(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("tcp read len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        anyhow::ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds {MAX_FRAME_LEN}");
        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        Ok(Some(Bytes::from(payload)))
    }

    /// Reads and deserializes the next frame as `T`.
    pub async fn recv_msg<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        match self.recv().await? {
            Some(payload) => {
                let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }
}

/// Writes length-prefixed frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes a frame produced by `encode_frame`.
    pub async fn send_frame(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(frame).await.context("tcp write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.send_frame(&frame).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }
}

/// One session's TCP stream, before it is split into reader and writer.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (FrameReader::new(read), FrameWriter::new(write))
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
