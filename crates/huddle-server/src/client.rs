use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use huddle_core::{ParticipantId, SessionId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::handlers::{self, HandlerState};

/// Unique client identifier, one per WebSocket connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The client was unregistered before the call reached it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("client is no longer connected")]
pub struct ClientGone;

/// The session seat a connection joined as.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
}

/// A connected WebSocket client.
pub struct Client {
    pub id: ClientId,
    pub tx: mpsc::Sender<String>,
    attachment: RwLock<Option<Attachment>>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            attachment: RwLock::new(None),
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment.read().clone()
    }

    fn is_in_session(&self, session_id: &SessionId) -> bool {
        self.attachment
            .read()
            .as_ref()
            .is_some_and(|a| &a.session_id == session_id)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients and the seat each one holds.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new client and return its ID + outbound queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(Client::new(id.clone(), tx));
        self.clients.insert(id.clone(), client);
        (id, rx)
    }

    /// Remove a client, returning the seat it held.
    pub fn unregister(&self, id: &ClientId) -> Option<Attachment> {
        let (_, client) = self.clients.remove(id)?;
        let mut attachment = client.attachment.write();
        client.connected.store(false, Ordering::Relaxed);
        attachment.take()
    }

    /// Attach a client to a seat, returning the seat it held before.
    ///
    /// Fails once the client has been unregistered, so a seat is never
    /// handed to a connection whose disconnect already ran.
    pub fn attach(
        &self,
        client_id: &ClientId,
        attachment: Attachment,
    ) -> Result<Option<Attachment>, ClientGone> {
        let client = self.client(client_id).ok_or(ClientGone)?;
        let mut current = client.attachment.write();
        if !client.is_connected() {
            return Err(ClientGone);
        }
        Ok(current.replace(attachment))
    }

    /// Detach a client if it currently holds `attachment`.
    pub fn detach_if(&self, client_id: &ClientId, attachment: &Attachment) -> bool {
        let Some(client) = self.client(client_id) else {
            return false;
        };
        let mut current = client.attachment.write();
        if current.as_ref() == Some(attachment) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn attachment(&self, client_id: &ClientId) -> Option<Attachment> {
        self.client(client_id)?.attachment()
    }

    /// Whether any connected client still holds this seat.
    pub fn is_held(&self, attachment: &Attachment) -> bool {
        self.clients.iter().any(|entry| {
            let client = entry.value();
            client.is_connected() && client.attachment.read().as_ref() == Some(attachment)
        })
    }

    /// Send a message to a specific client. Drops the message if its queue is full.
    pub fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        let Some(client) = self.client(client_id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %client_id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a message for each recipient still connected. Returns the
    /// number of recipients whose queue was full.
    pub fn deliver(&self, recipients: &[ClientId], message: &str) -> usize {
        let mut dropped = 0;
        for client_id in recipients {
            let Some(client) = self.client(client_id) else {
                continue;
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = client.tx.try_send(message.to_string())
            {
                tracing::warn!(client_id = %client_id, "Send queue full, dropping broadcast");
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Connected clients attached to a session.
    pub fn clients_for_session(&self, session_id: &SessionId) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|entry| entry.value().is_connected() && entry.value().is_in_session(session_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Clients that haven't answered a ping within the timeout.
    pub fn dead_clients(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn client(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage lifecycle with heartbeat.
///
/// Inbound frames from one connection are handled in arrival order. When
/// either half ends the client is disconnected, which may unseat its
/// participant.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    state: Arc<HandlerState>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket + periodic ping
    let writer_cid = client_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "Sent ping");
                }
            }
        }
    });

    // Reader task: apply inbound frames, track pongs
    let reader_cid = client_id.clone();
    let reader_state = Arc::clone(&state);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let response = handlers::handle_text(&reader_state, &reader_cid, text.as_str());
                    reader_state.clients.send_to(&reader_cid, response);
                }
                WsMessage::Pong(_) => {
                    if let Some(client) = reader_state.clients.client(&reader_cid) {
                        client.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half ends first takes the other down with it.
    let (writer_abort, reader_abort) = (writer.abort_handle(), reader.abort_handle());
    tokio::select! {
        _ = writer => reader_abort.abort(),
        _ = reader => writer_abort.abort(),
    }

    handlers::disconnect(&state, &client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(32, Duration::from_secs(90))
    }

    fn seat(session: &str, participant: &str) -> Attachment {
        Attachment {
            session_id: SessionId::from_raw(session),
            participant_id: ParticipantId::from_raw(participant),
        }
    }

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("client_"));
    }

    #[test]
    fn registry_register_and_unregister() {
        let registry = registry();
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&id1);
        assert_eq!(registry.count(), 1);

        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn unregister_returns_attachment_once() {
        let registry = registry();
        let (id, _rx) = registry.register();
        registry.attach(&id, seat("s1", "u1")).unwrap();

        assert_eq!(registry.unregister(&id), Some(seat("s1", "u1")));
        assert_eq!(registry.unregister(&id), None);
    }

    #[test]
    fn attach_returns_previous_seat() {
        let registry = registry();
        let (id, _rx) = registry.register();
        assert_eq!(registry.attach(&id, seat("s1", "u1")), Ok(None));
        assert_eq!(registry.attach(&id, seat("s2", "u1")), Ok(Some(seat("s1", "u1"))));
        assert_eq!(registry.attachment(&id), Some(seat("s2", "u1")));
    }

    #[test]
    fn detach_if_only_matches_same_seat() {
        let registry = registry();
        let (id, _rx) = registry.register();
        registry.attach(&id, seat("s1", "u1")).unwrap();
        assert!(!registry.detach_if(&id, &seat("s1", "u2")));
        assert!(registry.detach_if(&id, &seat("s1", "u1")));
        assert_eq!(registry.attachment(&id), None);
    }

    #[test]
    fn seat_held_by_second_tab() {
        let registry = registry();
        let (tab1, _rx1) = registry.register();
        let (tab2, _rx2) = registry.register();
        registry.attach(&tab1, seat("s1", "u1")).unwrap();
        registry.attach(&tab2, seat("s1", "u1")).unwrap();

        let released = registry.unregister(&tab1).unwrap();
        assert!(registry.is_held(&released));

        let released = registry.unregister(&tab2).unwrap();
        assert!(!registry.is_held(&released));
    }

    #[test]
    fn registry_clients_for_session() {
        let registry = registry();
        let (id, _rx) = registry.register();
        registry.attach(&id, seat("s1", "u1")).unwrap();

        let clients = registry.clients_for_session(&SessionId::from_raw("s1"));
        assert_eq!(clients, vec![id]);
        assert!(registry
            .clients_for_session(&SessionId::from_raw("s2"))
            .is_empty());
    }

    #[test]
    fn attach_after_unregister_fails() {
        let registry = registry();
        let (id, _rx) = registry.register();
        registry.unregister(&id);
        assert_eq!(registry.attach(&id, seat("s1", "u1")), Err(ClientGone));
        assert!(!registry.is_held(&seat("s1", "u1")));
    }

    #[test]
    fn deliver_reaches_only_recipients() {
        let registry = registry();
        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();
        let (_id3, mut rx3) = registry.register();

        let dropped = registry.deliver(&[id1, id2], "hello");
        assert_eq!(dropped, 0);

        assert_eq!(rx1.try_recv().unwrap(), "hello");
        assert_eq!(rx2.try_recv().unwrap(), "hello");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn deliver_skips_gone_recipients() {
        let registry = registry();
        let (gone, _gone_rx) = registry.register();
        let (live, mut live_rx) = registry.register();
        registry.unregister(&gone);

        assert_eq!(registry.deliver(&[gone, live], "hello"), 0);
        assert_eq!(live_rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn deliver_skips_full_queue_without_blocking_others() {
        let registry = ClientRegistry::new(1, Duration::from_secs(90));
        let (slow, _slow_rx) = registry.register();
        let (fast, mut fast_rx) = registry.register();

        // Fill the slow client's queue.
        assert!(registry.send_to(&slow, "pending".into()));
        assert!(fast_rx.try_recv().is_err());

        let dropped = registry.deliver(&[slow, fast], "update");
        assert_eq!(dropped, 1);
        assert_eq!(fast_rx.try_recv().unwrap(), "update");
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = registry();
        let (id, mut rx) = registry.register();

        assert!(registry.send_to(&id, "test message".into()));
        assert_eq!(rx.recv().await.unwrap(), "test message");
    }

    #[test]
    fn send_to_nonexistent_client() {
        let registry = registry();
        assert!(!registry.send_to(&ClientId::new(), "test".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = ClientRegistry::new(2, Duration::from_secs(90));
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, "msg1".into()));
        assert!(registry.send_to(&id, "msg2".into()));
        assert!(!registry.send_to(&id, "msg3".into()));
    }

    #[test]
    fn dead_clients_are_reported() {
        let registry = registry();
        let (id, _rx) = registry.register();
        assert!(registry.dead_clients().is_empty());

        registry.client(&id).unwrap().last_pong.store(0, Ordering::Relaxed);
        assert_eq!(registry.dead_clients(), vec![id]);
    }

    #[test]
    fn pong_keeps_client_alive() {
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(ClientId::new(), tx);
        client.last_pong.store(0, Ordering::Relaxed);
        assert!(!client.is_alive(Duration::from_secs(90)));
        client.record_pong();
        assert!(client.is_alive(Duration::from_secs(90)));
    }
}
