//! Client registry and fan-out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use wraith_router::{EventKind, EventPipeline, Payload};

use crate::error::{HubError, Result};
use crate::message::{SseEvent, WsMessage};
use crate::room::RoomHub;

/// Which push channel a hub serves. Decides the lifecycle events it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubKind {
    /// Bidirectional WebSocket connections.
    WebSocket,
    /// One-way server-sent event streams.
    Sse,
}

impl HubKind {
    const fn connect_event(self) -> EventKind {
        match self {
            Self::WebSocket => EventKind::WsConnect,
            Self::Sse => EventKind::SseConnect,
        }
    }

    const fn disconnect_event(self) -> EventKind {
        match self {
            Self::WebSocket => EventKind::WsDisconnect,
            Self::Sse => EventKind::SseDisconnect,
        }
    }
}

/// Hub for WebSocket clients.
pub type WsHub = Hub<WsMessage>;

/// Hub for SSE clients.
pub type SseHub = Hub<SseEvent>;

/// Registry of connected clients with room-based fan-out.
///
/// Every registered client owns the receiving half of an unbounded channel;
/// the transport task drains it and writes to the socket. Sends never block
/// and never hold a lock while delivering.
pub struct Hub<M> {
    kind: HubKind,
    clients: RwLock<HashMap<String, UnboundedSender<M>>>,
    rooms: RoomHub,
    pipeline: Option<Arc<EventPipeline>>,
}

impl<M> fmt::Debug for Hub<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("kind", &self.kind)
            .field("clients", &self.clients.read().len())
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}

impl<M: Clone + Send + 'static> Hub<M> {
    /// Creates a hub that emits no events.
    pub fn new(kind: HubKind) -> Self {
        Self {
            kind,
            clients: RwLock::new(HashMap::new()),
            rooms: RoomHub::new(),
            pipeline: None,
        }
    }

    /// Creates a hub that reports connects, disconnects and messages to
    /// `pipeline`.
    pub fn with_pipeline(kind: HubKind, pipeline: Arc<EventPipeline>) -> Self {
        Self {
            pipeline: Some(pipeline),
            ..Self::new(kind)
        }
    }

    /// Creates a WebSocket hub without events.
    pub fn websocket() -> Self {
        Self::new(HubKind::WebSocket)
    }

    /// Creates an SSE hub without events.
    pub fn sse() -> Self {
        Self::new(HubKind::Sse)
    }

    /// Returns the hub flavour.
    pub const fn kind(&self) -> HubKind {
        self.kind
    }

    /// Returns the room table.
    pub const fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    fn emit(&self, kind: EventKind, payload: Payload<'_>) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.emit(kind, payload);
        }
    }

    // --- Clients ---

    /// Registers a client and returns the receiver for its messages.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ClientExists`] if the id is taken.
    pub fn register(&self, client_id: &str) -> Result<UnboundedReceiver<M>> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut clients = self.clients.write();
            if clients.contains_key(client_id) {
                return Err(HubError::ClientExists(client_id.to_string()));
            }
            clients.insert(client_id.to_string(), tx);
        }

        info!(kind = ?self.kind, client_id, "Client connected");
        self.emit(self.kind.connect_event(), Payload::Client { id: client_id });
        Ok(rx)
    }

    /// Removes a client from every room and drops its sender.
    ///
    /// Returns false if the client was not registered.
    pub fn unregister(&self, client_id: &str) -> bool {
        // Lock order is clients, then rooms; see `join_room`.
        let (removed, left) = {
            let mut clients = self.clients.write();
            let removed = clients.remove(client_id).is_some();
            (removed, self.rooms.leave_all(client_id))
        };
        if !removed {
            return false;
        }

        info!(kind = ?self.kind, client_id, rooms = left.len(), "Client disconnected");
        self.emit(self.kind.disconnect_event(), Payload::Client { id: client_id });
        true
    }

    /// Unregisters every client.
    pub fn close(&self) {
        let ids: Vec<String> = self.clients.read().keys().cloned().collect();
        for id in &ids {
            self.unregister(id);
        }
    }

    /// Returns the number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if `client_id` is registered.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.read().contains_key(client_id)
    }

    // --- Rooms ---

    /// Adds a registered client to a room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownClient`] if the client is not registered.
    pub fn join_room(&self, client_id: &str, room: &str) -> Result<bool> {
        // The read guard spans the join so a concurrent `unregister` cannot
        // run its `leave_all` between the check and the insert.
        let clients = self.clients.read();
        if !clients.contains_key(client_id) {
            return Err(HubError::UnknownClient(client_id.to_string()));
        }
        Ok(self.rooms.join(client_id, room))
    }

    /// Removes a client from a room. Returns false if it was not a member.
    pub fn leave_room(&self, client_id: &str, room: &str) -> bool {
        self.rooms.leave(client_id, room)
    }

    /// Returns the number of clients in `room`.
    pub fn room_count(&self, room: &str) -> usize {
        self.rooms.count(room)
    }

    /// Returns the clients in `room`, sorted.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        self.rooms.members(room)
    }

    // --- Delivery ---

    /// Sends a message to one client.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownClient`] for an unregistered id and
    /// [`HubError::Disconnected`] if the client's receiver is gone.
    pub fn send_to(&self, client_id: &str, message: M) -> Result<()> {
        let sender = self
            .clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or_else(|| HubError::UnknownClient(client_id.to_string()))?;
        sender
            .send(message)
            .map_err(|_| HubError::Disconnected(client_id.to_string()))
    }

    /// Sends a message to every client. Returns how many received it.
    pub fn broadcast(&self, message: &M) -> usize {
        let targets: Vec<(String, UnboundedSender<M>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();
        Self::deliver(targets, message)
    }

    /// Sends a message to every client in `room`. Returns how many received it.
    pub fn broadcast_to_room(&self, room: &str, message: &M) -> usize {
        let members = self.rooms.members(room);
        if members.is_empty() {
            debug!(room, "Broadcast to empty room");
            return 0;
        }

        let targets: Vec<(String, UnboundedSender<M>)> = {
            let clients = self.clients.read();
            members
                .into_iter()
                .filter_map(|id| clients.get(&id).cloned().map(|tx| (id, tx)))
                .collect()
        };
        Self::deliver(targets, message)
    }

    fn deliver(targets: Vec<(String, UnboundedSender<M>)>, message: &M) -> usize {
        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(client_id = %id, "Failed to deliver message, receiver closed");
            }
        }
        delivered
    }

    /// Reports a message received from a client.
    ///
    /// WebSocket hubs emit the ws-message event; SSE is one-way, so an SSE
    /// hub only checks the client.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownClient`] if the client is not registered.
    pub fn receive(&self, client_id: &str, data: &[u8]) -> Result<()> {
        if !self.is_connected(client_id) {
            return Err(HubError::UnknownClient(client_id.to_string()));
        }
        match self.kind {
            HubKind::WebSocket => {
                self.emit(EventKind::WsMessage, Payload::Message { client_id, data });
            }
            HubKind::Sse => {
                debug!(client_id, bytes = data.len(), "Ignoring inbound data on SSE hub");
            }
        }
        Ok(())
    }
}

impl<M: Clone + Send + 'static> Default for Hub<M> {
    fn default() -> Self {
        Self::websocket()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_register_and_send() {
        let hub = WsHub::websocket();
        let mut rx = hub.register("c1").unwrap();
        hub.send_to("c1", WsMessage::text("hi")).unwrap();
        assert_eq!(rx.recv().await, Some(WsMessage::text("hi")));
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let hub = WsHub::websocket();
        let _rx = hub.register("c1").unwrap();
        assert!(matches!(hub.register("c1"), Err(HubError::ClientExists(_))));
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_send_errors() {
        let hub = WsHub::websocket();
        assert!(matches!(
            hub.send_to("ghost", WsMessage::text("x")),
            Err(HubError::UnknownClient(_))
        ));

        let rx = hub.register("c1").unwrap();
        drop(rx);
        assert!(matches!(
            hub.send_to("c1", WsMessage::text("x")),
            Err(HubError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_to_room_only_reaches_members() {
        let hub = SseHub::sse();
        let mut a = hub.register("a").unwrap();
        let mut b = hub.register("b").unwrap();
        hub.join_room("a", "news").unwrap();

        assert_eq!(hub.broadcast_to_room("news", &SseEvent::new("headline")), 1);
        assert_eq!(a.recv().await.unwrap().data, "headline");
        assert!(b.try_recv().is_err());

        assert_eq!(hub.broadcast(&SseEvent::new("all")), 2);
        assert_eq!(a.recv().await.unwrap().data, "all");
        assert_eq!(b.recv().await.unwrap().data, "all");
    }

    #[test]
    fn test_broadcast_skips_closed_receivers() {
        let hub = WsHub::websocket();
        let _a = hub.register("a").unwrap();
        drop(hub.register("b").unwrap());
        assert_eq!(hub.broadcast(&WsMessage::text("x")), 1);
    }

    #[test]
    fn test_join_requires_registration() {
        let hub = WsHub::websocket();
        assert!(matches!(
            hub.join_room("ghost", "r"),
            Err(HubError::UnknownClient(_))
        ));
        assert_eq!(hub.room_count("r"), 0);
    }

    #[test]
    fn test_unregister_leaves_rooms() {
        let hub = WsHub::websocket();
        let _rx = hub.register("c1").unwrap();
        hub.join_room("c1", "a").unwrap();
        hub.join_room("c1", "b").unwrap();

        assert!(hub.unregister("c1"));
        assert!(!hub.unregister("c1"));
        assert_eq!(hub.room_count("a"), 0);
        assert!(hub.rooms().rooms().is_empty());
        assert!(!hub.is_connected("c1"));
    }

    #[test]
    fn test_lifecycle_events() {
        let pipeline = Arc::new(EventPipeline::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            pipeline.on_ws_connect(move |id| log.lock().push(format!("connect {id}")));
        }
        {
            let log = log.clone();
            pipeline.on_ws_message(move |id, data| {
                log.lock()
                    .push(format!("message {id} {}", String::from_utf8_lossy(data)));
            });
        }
        {
            let log = log.clone();
            pipeline.on_ws_disconnect(move |id| log.lock().push(format!("disconnect {id}")));
        }

        let hub = WsHub::with_pipeline(HubKind::WebSocket, pipeline);
        let _rx = hub.register("c1").unwrap();
        hub.receive("c1", b"ping").unwrap();
        hub.unregister("c1");

        assert_eq!(
            *log.lock(),
            vec!["connect c1", "message c1 ping", "disconnect c1"]
        );
    }

    #[test]
    fn test_sse_hub_emits_sse_events() {
        let pipeline = Arc::new(EventPipeline::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            pipeline.on_sse_connect(move |id| log.lock().push(format!("sse+ {id}")));
        }
        {
            let log = log.clone();
            pipeline.on_sse_disconnect(move |id| log.lock().push(format!("sse- {id}")));
        }

        let hub = SseHub::with_pipeline(HubKind::Sse, pipeline.clone());
        let _rx = hub.register("s1").unwrap();
        hub.receive("s1", b"ignored").unwrap();
        hub.close();

        assert_eq!(*log.lock(), vec!["sse+ s1", "sse- s1"]);
        assert!(!pipeline.has_handlers(EventKind::WsConnect));
    }
}
