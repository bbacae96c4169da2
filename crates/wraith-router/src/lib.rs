//! # wraith-router
//!
//! Request dispatch for HTTP-style services.
//!
//! This crate provides:
//! - Path pattern matching with `:name` parameters and a trailing `*name` wildcard
//! - A route table where the first registered match wins, with 404/405 distinction
//! - Middleware chains, global and per route
//! - Pooled per-request contexts with a typed key/value store
//! - A lifecycle event pipeline with synchronous and asynchronous emission
//!
//! ## Quick Start
//!
//! ```
//! use wraith_router::{handler, Request, Router};
//!
//! # tokio_test_block(async {
//! let router = Router::new();
//! router
//!     .get("/", handler(|ctx| Box::pin(async move { ctx.text(200, "Hello, World!") })))
//!     .unwrap();
//! router
//!     .get(
//!         "/users/:id",
//!         handler(|ctx| {
//!             Box::pin(async move {
//!                 let id = ctx.param("id").unwrap_or("unknown").to_string();
//!                 ctx.json(200, &serde_json::json!({ "id": id }))
//!             })
//!         }),
//!     )
//!     .unwrap();
//!
//! let response = router.handle(Request::get("/users/123")).await;
//! assert_eq!(response.status, 200);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Path Parameters
//!
//! ```ignore
//! router.get("/posts/:post_id/comments/:comment_id", handler)?;
//! router.get("/static/*filepath", serve_file)?;
//! ```
//!
//! Parameters are read from the context:
//!
//! ```ignore
//! let post_id: u64 = ctx.param_parse("post_id").unwrap_or_default();
//! let file = ctx.param("filepath").unwrap_or("index.html");
//! ```
//!
//! ## Middleware
//!
//! ```ignore
//! use std::time::Duration;
//! use wraith_router::middleware::{logger, recovery, request_id, timeout};
//!
//! router
//!     .use_middleware(recovery())
//!     .use_middleware(request_id())
//!     .use_middleware(logger())
//!     .use_middleware(timeout(Duration::from_secs(5)));
//! ```
//!
//! ## Route Groups
//!
//! ```ignore
//! let api = router.group("/api/v1", vec![auth]);
//! api.get("/users", list_users)?;
//! api.post("/users", create_user)?;
//! ```
//!
//! ## Events
//!
//! ```ignore
//! router.pipeline().after_request(|ctx| {
//!     tracing::info!(status = ctx.status(), "done");
//! });
//! ```

mod config;
mod context;
mod error;
mod events;
pub mod middleware;
mod path;
mod pool;
mod request;
mod response;
mod router;
mod server;

pub use config::ServerConfig;
pub use context::{Context, Value};
pub use error::{Result, RouterError, StoreError};
pub use events::{EventHandler, EventKind, EventPipeline, OwnedPayload, Payload};
pub use middleware::{chain, handler, middleware, when, BoxFuture, Handler, Middleware};
pub use path::{match_path, PathPattern, PathSegment};
pub use pool::{ContextPool, PoolStats, PooledContext, DEFAULT_MAX_IDLE};
pub use request::{Method, PathParams, Request};
pub use response::Response;
pub use router::{Resolution, Route, RouteGroup, RouteHandle, Router};
pub use server::Server;
