//! Fan-out of server events to connected sessions.
//!
//! Each session has a bounded outbound queue drained by its writer task.
//! A message is serialized once per call and the frame is shared by every
//! recipient. Sends never wait: a full or closed queue loses that one frame
//! for that one session and the fan-out carries on.

use std::collections::BTreeMap;

use bytes::Bytes;
use lantern_shared::{
    net::{encode_frame, ServerMsg},
    world::SessionId,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Frames a session may have queued before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 512;

pub type Outbound = mpsc::Sender<Bytes>;

/// Creates the queue pair for one session.
pub fn outbound_channel() -> (Outbound, mpsc::Receiver<Bytes>) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

#[derive(Debug, Default)]
pub struct Replicator {
    sinks: BTreeMap<SessionId, Outbound>,
}

impl Replicator {
    pub fn attach(&mut self, id: SessionId, outbound: Outbound) {
        self.sinks.insert(id, outbound);
    }

    /// Forgets a session. Dropping its sender lets the writer task finish.
    pub fn detach(&mut self, id: SessionId) -> bool {
        self.sinks.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sends to one session. Returns the number of sessions reached.
    pub fn to_one(&self, id: SessionId, msg: &ServerMsg) -> usize {
        self.fan_out(msg, |sid| sid == id)
    }

    /// Sends to every session except `except`.
    pub fn to_all_except(&self, except: SessionId, msg: &ServerMsg) -> usize {
        self.fan_out(msg, |sid| sid != except)
    }

    pub fn to_all(&self, msg: &ServerMsg) -> usize {
        self.fan_out(msg, |_| true)
    }

    fn fan_out(&self, msg: &ServerMsg, include: impl Fn(SessionId) -> bool) -> usize {
        let mut targets = self.sinks.iter().filter(|(id, _)| include(**id)).peekable();
        if targets.peek().is_none() {
            return 0;
        }

        let frame = match encode_frame(msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                return 0;
            }
        };

        let mut reached = 0;
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(session = %id, "Outbound queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session = %id, "Outbound queue closed, frame dropped");
                }
            }
        }
        reached
    }
}
