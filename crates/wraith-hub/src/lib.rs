//! # wraith-hub
//!
//! Room membership and fan-out for push channels.
//!
//! This crate provides:
//! - [`RoomHub`], a concurrent room → members table
//! - [`Hub`], a client registry with per-client channels, generic over the
//!   message type, in WebSocket ([`WsHub`]) and SSE ([`SseHub`]) flavours
//! - Message types for both flavours, including SSE frame encoding
//!
//! ## Quick Start
//!
//! ```
//! use wraith_hub::{SseEvent, SseHub};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let hub = SseHub::sse();
//! let mut rx = hub.register("client-1").unwrap();
//! hub.join_room("client-1", "news").unwrap();
//!
//! let delivered = hub.broadcast_to_room("news", &SseEvent::new("hello").event("greeting"));
//! assert_eq!(delivered, 1);
//! assert_eq!(rx.recv().await.unwrap().to_frame(), "event: greeting\ndata: hello\n\n");
//! # });
//! ```

mod error;
mod hub;
mod message;
mod room;

pub use error::{HubError, Result};
pub use hub::{Hub, HubKind, SseHub, WsHub};
pub use message::{SseEvent, WsMessage};
pub use room::RoomHub;
