use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use whiteboard_sync::ProtocolError;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
struct SessionEntry {
    state: SessionState,
    outbound: mpsc::UnboundedSender<Message>,
    connected_at: DateTime<Utc>,
}

/// Handle given to the task serving one connection. Frames broadcast by other
/// participants arrive on `outbound`.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub outbound: mpsc::UnboundedReceiver<Message>,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Malformed(#[from] ProtocolError),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame carries no message")]
    UnsupportedFrame,
}

/// The registry of connected sessions.
/// Registration, removal and fan-out all go through the one Mutex, so no
/// broadcast ever sees a half-updated registry.
#[derive(Debug, Default)]
pub struct Relay {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection. It receives nothing until [`Relay::open`].
    pub async fn accept(&self) -> Session {
        let id = nanoid!(10);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            id.clone(),
            SessionEntry {
                state: SessionState::Connecting,
                outbound: tx,
                connected_at: Utc::now(),
            },
        );
        debug!(session = %id, total = sessions.len(), "Session registered");

        Session { id, outbound: rx }
    }

    pub async fn open(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(entry) if entry.state == SessionState::Connecting => {
                entry.state = SessionState::Open;
                true
            }
            _ => false,
        }
    }

    /// Forwards `frame` unmodified to every other open session and returns how
    /// many received it. Only the `type` tag is read; frames without a known
    /// tag are logged and dropped. The sender stays connected either way.
    pub async fn on_message(&self, sender: &str, frame: Message) -> Result<usize, RelayError> {
        let kind = match Self::message_type(&frame) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(session = %sender, error = %e, payload = ?frame, "Ignoring message");
                return Err(e);
            }
        };

        let sessions = self.sessions.lock().await;
        let mut delivered = 0;
        for (id, entry) in sessions.iter() {
            if id == sender || entry.state != SessionState::Open {
                continue;
            }
            // A dead writer is the same as a closed channel: skip, the close
            // path removes it.
            if entry.outbound.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(session = %sender, kind, delivered, "Broadcast message");

        Ok(delivered)
    }

    fn message_type(frame: &Message) -> Result<&'static str, RelayError> {
        let text = match frame {
            Message::Text(text) => text.as_str(),
            Message::Binary(bytes) => std::str::from_utf8(bytes).map_err(|_| RelayError::NotUtf8)?,
            _ => return Err(RelayError::UnsupportedFrame),
        };
        Ok(whiteboard_sync::message_type(text)?)
    }

    pub async fn on_close(&self, id: &str) -> bool {
        self.remove(id).await
    }

    pub async fn on_error(&self, id: &str, error: &axum::Error) -> bool {
        warn!(session = %id, error = %error, "WebSocket error");
        self.remove(id).await
    }

    // Idempotent: ids are never reused, so a second removal finds nothing.
    async fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.remove(id) else {
            return false;
        };

        let connected_for = Utc::now() - entry.connected_at;
        info!(
            session = %id,
            seconds = connected_for.num_seconds(),
            remaining = sessions.len(),
            "Session removed"
        );
        true
    }

    /// Unknown ids report `Closed`: a session leaves the registry only by closing.
    pub async fn session_state(&self, id: &str) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(id)
            .map_or(SessionState::Closed, |entry| entry.state)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn open_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|entry| entry.state == SessionState::Open)
            .count()
    }
}
