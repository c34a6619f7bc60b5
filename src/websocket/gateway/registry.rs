//! Live gateway sessions keyed by connection id.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::websocket::protocol::{GatewayCloseCode, GatewayMessage};

/// Outbound half of a gateway socket.
///
/// Frames are queued to the connection's writer task. The first `close`
/// wins; later closes and sends after a close are no-ops.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    tx: mpsc::UnboundedSender<Message>,
    closing: Arc<AtomicBool>,
    closed: CancellationToken,
}

impl SocketHandle {
    /// Wrap the sending side of a writer queue
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            closing: Arc::new(AtomicBool::new(false)),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a frame. Returns false once the socket is closing.
    pub fn send(&self, frame: &GatewayMessage) -> bool {
        if self.is_closing() {
            return false;
        }
        self.tx.send(Message::Text(frame.to_json())).is_ok()
    }

    /// Send the close notice followed by the transport close.
    /// Returns false if the socket was already closing.
    pub fn close(&self, code: GatewayCloseCode, reason: &str) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self
            .tx
            .send(Message::Text(GatewayMessage::close_notice(code, reason).to_json()));
        let _ = self.tx.send(Message::Close(Some(CloseFrame {
            code: code.code(),
            reason: Cow::Owned(reason.to_string()),
        })));
        self.closed.cancel();
        true
    }

    /// Mark the socket closed by the peer; nothing more will be sent.
    pub fn mark_closing(&self) -> bool {
        let first = !self.closing.swap(true, Ordering::AcqRel);
        self.closed.cancel();
        first
    }

    /// Whether a close has started
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Resolves once the socket starts closing
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// One authenticated, open gateway connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: String,
    pub socket: SocketHandle,
    pub last_heartbeat: Instant,
    pub identified: bool,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateConnection(Uuid),
}

/// In-memory table of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. An id that is already present is rejected.
    pub fn register(
        &self,
        connection_id: Uuid,
        user_id: impl Into<String>,
        socket: SocketHandle,
    ) -> Result<Session, RegistryError> {
        match self.sessions.entry(connection_id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateConnection(connection_id)),
            Entry::Vacant(slot) => {
                let session = Session {
                    connection_id,
                    user_id: user_id.into(),
                    socket,
                    last_heartbeat: Instant::now(),
                    identified: false,
                    connected_at: chrono::Utc::now(),
                };
                slot.insert(session.clone());
                debug!(conn_id = %connection_id, user_id = %session.user_id, "Session registered");
                Ok(session)
            }
        }
    }

    /// Refresh the heartbeat timestamp. Returns false for an unknown id.
    pub fn touch(&self, connection_id: Uuid) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(mut session) => {
                session.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Flag the session as having spoken at least once
    pub fn mark_identified(&self, connection_id: Uuid) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(mut session) => {
                session.identified = true;
                true
            }
            None => false,
        }
    }

    pub fn last_heartbeat(&self, connection_id: Uuid) -> Option<Instant> {
        self.sessions.get(&connection_id).map(|s| s.last_heartbeat)
    }

    /// Remove a session; removing an absent id is a no-op.
    pub fn remove(&self, connection_id: Uuid) -> Option<Session> {
        self.sessions.remove(&connection_id).map(|(_, s)| s)
    }

    /// Snapshot of a session
    pub fn get(&self, connection_id: Uuid) -> Option<Session> {
        self.sessions.get(&connection_id).map(|s| s.clone())
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.sessions.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Connection ids owned by a user
    pub fn connections_for_user(&self, user_id: &str) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.connection_id)
            .collect()
    }

    /// Close every live session of a user. Returns how many were closed.
    ///
    /// Sessions are removed by their own connection tasks once the close
    /// lands, so cleanup runs exactly once.
    pub fn disconnect_user(&self, user_id: &str, code: GatewayCloseCode, reason: &str) -> usize {
        let sockets: Vec<SocketHandle> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.socket.clone())
            .collect();

        sockets.iter().filter(|s| s.close(code, reason)).count()
    }

    /// Close every live session
    pub fn close_all(&self, code: GatewayCloseCode, reason: &str) -> usize {
        let sockets: Vec<SocketHandle> = self.sessions.iter().map(|s| s.socket.clone()).collect();
        sockets.iter().filter(|s| s.close(code, reason)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket() -> (SocketHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SocketHandle::new(tx), rx)
    }

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let (handle, _rx) = socket();

        let session = registry.register(id, "alice", handle).unwrap();
        assert_eq!(session.user_id, "alice");
        assert!(!session.identified);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().connection_id, id);
    }

    #[test]
    fn test_duplicate_connection_id_rejected() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let (first, _rx1) = socket();
        let (second, _rx2) = socket();

        registry.register(id, "alice", first).unwrap();
        let err = registry.register(id, "mallory", second).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateConnection(dup) if dup == id));
        assert_eq!(registry.get(id).unwrap().user_id, "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let (handle, _rx) = socket();
        registry.register(id, "alice", handle).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
        assert!(!registry.touch(id));
        assert!(!registry.mark_identified(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_refreshes_heartbeat() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let (handle, _rx) = socket();
        registry.register(id, "alice", handle).unwrap();
        let before = registry.last_heartbeat(id).unwrap();

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        assert!(registry.touch(id));
        assert_eq!(
            registry.last_heartbeat(id).unwrap() - before,
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn test_close_sends_notice_then_close_frame_once() {
        let (handle, mut rx) = socket();

        assert!(handle.close(GatewayCloseCode::SessionTimeOut, "Session timed out"));
        assert!(!handle.close(GatewayCloseCode::UnknownError, "again"));
        assert!(!handle.send(&GatewayMessage::heartbeat_ack()));

        match rx.try_recv().unwrap() {
            Message::Text(text) => assert!(text.contains("\"CLOSE\"")),
            other => panic!("expected close notice, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 4005);
                assert_eq!(frame.reason, "Session timed out");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_user_closes_only_that_user() {
        let registry = SessionRegistry::new();
        let (a1, mut a1_rx) = socket();
        let (a2, _a2_rx) = socket();
        let (b, mut b_rx) = socket();
        registry.register(Uuid::new_v4(), "alice", a1).unwrap();
        registry.register(Uuid::new_v4(), "alice", a2).unwrap();
        registry.register(Uuid::new_v4(), "bob", b).unwrap();

        let closed = registry.disconnect_user("alice", GatewayCloseCode::NotAuthenticated, "User banned");
        assert_eq!(closed, 2);
        assert_eq!(registry.connections_for_user("alice").len(), 2);
        assert!(a1_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());

        assert_eq!(registry.close_all(GatewayCloseCode::UnknownError, "bye"), 1);
    }
}
