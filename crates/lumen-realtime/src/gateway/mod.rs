//! Realtime gateway: authenticated sessions grouped into per-owner rooms.
//!
//! Job updates are delivered only to the room named by the event's owner.
//! There is no broadcast path; an event without listeners is dropped.

mod auth;
mod heartbeat;
mod relay;

pub use auth::{extract_credential, JwtSessionAuthenticator, SessionAuthenticator};
pub use heartbeat::start_heartbeat;
pub use relay::RelayHandler;

use crate::error::GatewayError;
use axum::extract::ws::Message;
use lumen_core::{JobEvent, JobUpdate, OwnerId, JOB_UPDATE_EVENT};
use lumen_jobs::EventMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Channel sender half for pushing frames to one session.
pub type SessionSender = mpsc::UnboundedSender<Message>;

/// Frame sent to clients.
#[derive(Debug, Serialize)]
pub struct ServerMessage<'a> {
    pub event: &'a str,
    pub data: JobUpdate,
}

/// A joined connection.
///
/// The receiver yields every frame addressed to this session; it ends when
/// the session leaves or the gateway shuts down.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub owner_id: OwnerId,
    pub outbound: mpsc::UnboundedReceiver<Message>,
}

type Rooms = HashMap<OwnerId, HashMap<String, SessionSender>>;

/// Tracks open sessions per owner and relays job updates to them.
pub struct Gateway {
    authenticator: Arc<dyn SessionAuthenticator>,
    rooms: RwLock<Rooms>,
}

impl Gateway {
    pub fn new(authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        Self {
            authenticator,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Verifies a credential without joining.
    pub fn authenticate(&self, credential: Option<&str>) -> Result<OwnerId, GatewayError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::MissingCredential)?;
        self.authenticator.authenticate(credential).map_err(|e| {
            warn!(error = %e, "Session authentication failed");
            e
        })
    }

    /// Verifies a credential and joins the owner's room.
    pub async fn connect(&self, credential: Option<&str>) -> Result<Session, GatewayError> {
        let owner = self.authenticate(credential)?;
        Ok(self.join(owner).await)
    }

    /// Joins an already authenticated owner's room.
    pub async fn join(&self, owner_id: OwnerId) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();

        let total = {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(owner_id.clone())
                .or_default()
                .insert(id.clone(), tx);
            count(&rooms)
        };
        EventMetrics::sessions(total);
        info!(session_id = %id, owner_id = %owner_id, "Session joined");

        Session {
            id,
            owner_id,
            outbound: rx,
        }
    }

    /// Removes a session. Unknown ids are ignored.
    pub async fn leave(&self, owner_id: &OwnerId, session_id: &str) {
        let total = {
            let mut rooms = self.rooms.write().await;
            if let Some(room) = rooms.get_mut(owner_id) {
                room.remove(session_id);
                if room.is_empty() {
                    rooms.remove(owner_id);
                }
            }
            count(&rooms)
        };
        EventMetrics::sessions(total);
        info!(session_id = %session_id, owner_id = %owner_id, "Session left");
    }

    /// Delivers an event to every session in its owner's room.
    ///
    /// Returns the number of sessions the update was handed to.
    pub async fn relay(&self, event: &JobEvent) -> usize {
        let frame = match serde_json::to_string(&ServerMessage {
            event: JOB_UPDATE_EVENT,
            data: event.to_update(),
        }) {
            Ok(text) => text,
            Err(e) => {
                warn!(job_id = %event.job_id, error = %e, "Failed to encode job update");
                return 0;
            }
        };

        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(event.room()) else {
            debug!(job_id = %event.job_id, owner_id = %event.owner_id, "No sessions for owner");
            return 0;
        };

        // Closed channels belong to sessions that are about to leave.
        let delivered = room
            .values()
            .filter(|tx| tx.send(Message::Text(frame.clone())).is_ok())
            .count();

        EventMetrics::relayed(delivered);
        debug!(
            job_id = %event.job_id,
            owner_id = %event.owner_id,
            status = %event.status,
            delivered,
            "Relayed job update"
        );
        delivered
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        count(&*self.rooms.read().await)
    }

    /// Number of open sessions for one owner.
    pub async fn sessions_for(&self, owner_id: &OwnerId) -> usize {
        self.rooms
            .read()
            .await
            .get(owner_id)
            .map_or(0, HashMap::len)
    }

    /// Sends a ping frame to every session.
    pub async fn ping_all(&self) {
        let rooms = self.rooms.read().await;
        for tx in rooms.values().flat_map(HashMap::values) {
            let _ = tx.send(Message::Ping(Vec::new()));
        }
    }

    /// Sends a close frame to every session and forgets them all.
    pub async fn shutdown_all(&self) {
        let mut rooms = self.rooms.write().await;
        let total = count(&rooms);
        for tx in rooms.values().flat_map(HashMap::values) {
            let _ = tx.send(Message::Close(None));
        }
        rooms.clear();
        EventMetrics::sessions(0);
        info!(count = total, "Closed all realtime sessions");
    }
}

fn count(rooms: &Rooms) -> usize {
    rooms.values().map(HashMap::len).sum()
}
