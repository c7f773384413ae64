//! Per-connection tasks.
//!
//! A session is two tasks around one TCP stream:
//! - the reader (this task) decodes frames and forwards valid events to the
//!   actor, in arrival order;
//! - the writer drains the session's outbound queue onto the socket.
//!
//! Invalid events are dropped one at a time. Anything that ends either half
//! ends the session, and the session always finishes by posting exactly one
//! `Disconnect`.

use std::net::SocketAddr;

use lantern_shared::{
    net::{decode_client, ReliableConn},
    world::SessionId,
};
use tracing::{debug, info, warn};

use crate::{replicator::outbound_channel, server::ServerHandle};

pub async fn run_session(conn: ReliableConn, peer: SocketAddr, id: SessionId, handle: ServerHandle) {
    info!(session = %id, %peer, "Session opened");
    let (mut reader, mut writer) = conn.into_split();
    let (outbound, mut outbound_rx) = outbound_channel();

    if handle.connect(id, outbound).await.is_err() {
        debug!(session = %id, "Server stopped before session could join");
        return;
    }

    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = writer.send_frame(&frame).await {
                debug!(session = %id, error = %e, "Session write failed");
                return;
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        tokio::select! {
            read = reader.recv() => match read {
                Ok(Some(payload)) => match decode_client(&payload) {
                    Ok(msg) => {
                        if handle.event(id, msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(session = %id, error = %e, "Dropped invalid event");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(session = %id, error = %e, "Session read failed");
                    break;
                }
            },
            _ = &mut writer_task => {
                debug!(session = %id, "Session writer finished");
                break;
            }
        }
    }

    let _ = handle.disconnect(id).await;
    info!(session = %id, %peer, "Session closed");
}
