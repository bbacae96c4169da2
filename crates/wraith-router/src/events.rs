//! Lifecycle event pipeline.
//!
//! Each [`Router`](crate::Router) owns one [`EventPipeline`]. Handlers are
//! grouped by [`EventKind`] and run in registration order by [`EventPipeline::emit`],
//! or each on its own task by [`EventPipeline::emit_async`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::Context;

/// Kinds of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Before the route is resolved.
    BeforeRequest,
    /// After the chain finished, successfully or not.
    AfterRequest,
    /// A handler or middleware returned an error.
    Error,
    /// The server started.
    ServerStart,
    /// The server is stopping.
    ServerStop,
    /// A WebSocket client connected.
    WsConnect,
    /// A WebSocket client disconnected.
    WsDisconnect,
    /// A WebSocket client sent a message.
    WsMessage,
    /// An SSE client connected.
    SseConnect,
    /// An SSE client disconnected.
    SseDisconnect,
}

impl EventKind {
    /// Returns the wire name of the event.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeRequest => "before_request",
            Self::AfterRequest => "after_request",
            Self::Error => "on_error",
            Self::ServerStart => "server_start",
            Self::ServerStop => "server_stop",
            Self::WsConnect => "ws_connect",
            Self::WsDisconnect => "ws_disconnect",
            Self::WsMessage => "ws_message",
            Self::SseConnect => "sse_connect",
            Self::SseDisconnect => "sse_disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data passed to event handlers.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Nothing beyond the event kind (server start/stop).
    Empty,
    /// The request being dispatched.
    Request(&'a Context),
    /// A push-channel client.
    Client {
        /// Client identifier.
        id: &'a str,
    },
    /// A message received from a push-channel client.
    Message {
        /// Sending client.
        client_id: &'a str,
        /// Raw message bytes.
        data: &'a [u8],
    },
}

impl<'a> Payload<'a> {
    /// Returns the request context, if any.
    pub const fn context(&self) -> Option<&'a Context> {
        match self {
            Self::Request(ctx) => Some(*ctx),
            _ => None,
        }
    }

    /// Returns the client id, if any.
    pub const fn client_id(&self) -> Option<&'a str> {
        match self {
            Self::Client { id } | Self::Message { client_id: id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Owned counterpart of [`Payload`] for asynchronous emission.
///
/// Request payloads hold a detached context, never a pooled one.
#[derive(Debug, Clone)]
pub enum OwnedPayload {
    /// Nothing beyond the event kind.
    Empty,
    /// A detached copy of the request context.
    Request(Arc<Context>),
    /// A push-channel client.
    Client {
        /// Client identifier.
        id: String,
    },
    /// A message received from a push-channel client.
    Message {
        /// Sending client.
        client_id: String,
        /// Raw message bytes.
        data: Vec<u8>,
    },
}

impl OwnedPayload {
    /// Builds a request payload from a detached copy of `ctx`.
    pub fn detached(ctx: &Context) -> Self {
        Self::Request(Arc::new(ctx.detach()))
    }

    /// Borrows this payload.
    pub fn as_payload(&self) -> Payload<'_> {
        match self {
            Self::Empty => Payload::Empty,
            Self::Request(ctx) => Payload::Request(ctx),
            Self::Client { id } => Payload::Client { id },
            Self::Message { client_id, data } => Payload::Message { client_id, data },
        }
    }
}

/// An event handler.
pub type EventHandler = Arc<dyn Fn(&Payload<'_>) + Send + Sync>;

/// Registry of event handlers, keyed by event kind.
#[derive(Default)]
pub struct EventPipeline {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut map = f.debug_map();
        for (kind, list) in handlers.iter() {
            map.entry(kind, &list.len());
        }
        map.finish()
    }
}

impl EventPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&Payload<'_>) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Removes every handler for `kind`.
    pub fn off(&self, kind: EventKind) -> &Self {
        self.handlers.write().remove(&kind);
        self
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Returns true if `kind` has at least one handler.
    pub fn has_handlers(&self, kind: EventKind) -> bool {
        self.handlers
            .read()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    /// Snapshot of the handlers for `kind`, taken under the read lock.
    fn snapshot(&self, kind: EventKind) -> Vec<EventHandler> {
        self.handlers.read().get(&kind).cloned().unwrap_or_default()
    }

    /// Runs every handler for `kind` in registration order on the caller.
    ///
    /// Handlers registered while an emission runs are not part of it. A
    /// panicking handler unwinds into the caller.
    pub fn emit(&self, kind: EventKind, payload: Payload<'_>) {
        let handlers = self.snapshot(kind);
        if handlers.is_empty() {
            return;
        }
        debug!(event = %kind, handlers = handlers.len(), "Emitting event");
        for handler in &handlers {
            handler(&payload);
        }
    }

    /// Runs every handler for `kind` on its own task and returns at once.
    ///
    /// There is no ordering between handlers, no completion signal and no
    /// error propagation. Outside a Tokio runtime each handler gets a thread.
    pub fn emit_async(&self, kind: EventKind, payload: OwnedPayload) {
        let handlers = self.snapshot(kind);
        if handlers.is_empty() {
            return;
        }
        debug!(event = %kind, handlers = handlers.len(), "Emitting event asynchronously");

        let runtime = tokio::runtime::Handle::try_current().ok();
        if runtime.is_none() {
            warn!(event = %kind, "No Tokio runtime, falling back to threads");
        }

        for handler in handlers {
            let payload = payload.clone();
            let run = move || handler(&payload.as_payload());
            match &runtime {
                Some(handle) => {
                    handle.spawn(async move { run() });
                }
                None => {
                    std::thread::spawn(run);
                }
            }
        }
    }

    // --- Convenience registration ---

    /// Registers a before-request handler.
    pub fn before_request<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_context(EventKind::BeforeRequest, handler)
    }

    /// Registers an after-request handler.
    pub fn after_request<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_context(EventKind::AfterRequest, handler)
    }

    /// Registers an error handler. The error message is stored under `"error"`.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_context(EventKind::Error, handler)
    }

    /// Registers a server start handler.
    pub fn on_server_start<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::ServerStart, move |_| handler())
    }

    /// Registers a server stop handler.
    pub fn on_server_stop<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::ServerStop, move |_| handler())
    }

    /// Registers a WebSocket connect handler receiving the client id.
    pub fn on_ws_connect<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_client(EventKind::WsConnect, handler)
    }

    /// Registers a WebSocket disconnect handler receiving the client id.
    pub fn on_ws_disconnect<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_client(EventKind::WsDisconnect, handler)
    }

    /// Registers a WebSocket message handler receiving client id and data.
    pub fn on_ws_message<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.on(EventKind::WsMessage, move |payload| {
            if let Payload::Message { client_id, data } = payload {
                handler(client_id, data);
            }
        })
    }

    /// Registers an SSE connect handler receiving the client id.
    pub fn on_sse_connect<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_client(EventKind::SseConnect, handler)
    }

    /// Registers an SSE disconnect handler receiving the client id.
    pub fn on_sse_disconnect<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_client(EventKind::SseDisconnect, handler)
    }

    fn on_context<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on(kind, move |payload| {
            if let Some(ctx) = payload.context() {
                handler(ctx);
            }
        })
    }

    fn on_client<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(kind, move |payload| {
            if let Some(id) = payload.client_id() {
                handler(id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::pool::ContextPool;
    use crate::request::Request;

    #[test]
    fn test_emit_runs_in_registration_order() {
        let pipeline = EventPipeline::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            pipeline.on(EventKind::ServerStart, move |_| order.lock().push(i));
        }

        pipeline.emit(EventKind::ServerStart, Payload::Empty);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_handler_added_during_emit_is_not_run() {
        let pipeline = Arc::new(EventPipeline::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        {
            let inner = pipeline.clone();
            let late_calls = late_calls.clone();
            pipeline.on(EventKind::ServerStop, move |_| {
                let late_calls = late_calls.clone();
                inner.on(EventKind::ServerStop, move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        pipeline.emit(EventKind::ServerStop, Payload::Empty);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        pipeline.emit(EventKind::ServerStop, Payload::Empty);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_and_has_handlers() {
        let pipeline = EventPipeline::new();
        assert!(!pipeline.has_handlers(EventKind::Error));
        pipeline.on(EventKind::Error, |_| {});
        assert!(pipeline.has_handlers(EventKind::Error));
        pipeline.off(EventKind::Error);
        assert!(!pipeline.has_handlers(EventKind::Error));
    }

    #[test]
    fn test_context_handlers_can_annotate_request() {
        let pipeline = EventPipeline::new();
        pipeline.before_request(|ctx| ctx.set("seen", true));

        let ctx = Context::new(Request::get("/"));
        pipeline.emit(EventKind::BeforeRequest, Payload::Request(&ctx));
        assert!(ctx.get_bool("seen").unwrap());
    }

    #[test]
    fn test_server_start_handlers_fire_without_context() {
        let pipeline = EventPipeline::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        pipeline.on_server_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline.emit(EventKind::ServerStart, Payload::Empty);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_async_runs_every_handler() {
        let pipeline = EventPipeline::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for i in 0..4 {
            let tx = tx.clone();
            pipeline.on_ws_message(move |client, data| {
                let _ = tx.send((i, client.to_string(), data.to_vec()));
            });
        }
        drop(tx);
        assert!(pipeline.has_handlers(EventKind::WsMessage));

        pipeline.emit_async(
            EventKind::WsMessage,
            OwnedPayload::Message {
                client_id: "c1".to_string(),
                data: b"hi".to_vec(),
            },
        );

        let mut seen = Vec::new();
        for _ in 0..4 {
            let (i, client, data) = rx.recv().await.unwrap();
            assert_eq!(client, "c1");
            assert_eq!(data, b"hi");
            seen.push(i);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_handler_keeps_values_after_context_reuse() {
        let pool = ContextPool::new(4);
        let pipeline = EventPipeline::new();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        pipeline.on(EventKind::AfterRequest, move |payload| {
            // Hold off until the pooled context has served another request.
            let _ = gate_rx.lock().recv();
            let seen = payload
                .context()
                .map(|ctx| (ctx.path().to_string(), ctx.get_str("user")));
            let _ = tx.send(seen);
        });

        let first = pool.acquire(Request::get("/first"));
        first.set("user", "alice");
        pipeline.emit_async(EventKind::AfterRequest, OwnedPayload::detached(&first));
        pool.release(first);

        let second = pool.acquire(Request::get("/second"));
        second.set("user", "bob");
        assert_eq!(pool.stats().reused, 1);
        gate_tx.send(()).unwrap();

        let (path, user) = rx.recv().await.unwrap().unwrap();
        assert_eq!(path, "/first");
        assert_eq!(user.unwrap(), "alice");
        assert_eq!(second.get_str("user").unwrap(), "bob");
    }
}
