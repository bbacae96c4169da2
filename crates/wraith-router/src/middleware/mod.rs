//! Handlers, middleware and chain composition.
//!
//! A [`Handler`] is an async function over `&mut Context`. A [`Middleware`]
//! wraps a handler and returns a new one; it may act before and after
//! calling `next`, or not call it at all to short-circuit the chain.
//!
//! # Example
//!
//! ```
//! use wraith_router::{handler, middleware, Handler};
//!
//! let require_token = middleware(|next: Handler| {
//!     handler(move |ctx| {
//!         let next = next.clone();
//!         Box::pin(async move {
//!             if ctx.header("Authorization").is_none() {
//!                 return ctx.unauthorized("missing token");
//!             }
//!             next(ctx).await
//!         })
//!     })
//! });
//! # let _ = require_token;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

mod logger;
mod recovery;
mod request_id;
mod secure;
mod timeout;

pub use logger::logger;
pub use recovery::{recovery, recovery_with_config, RecoveryConfig};
pub use request_id::{request_id, REQUEST_ID_HEADER, REQUEST_ID_KEY};
pub use secure::secure_headers;
pub use timeout::timeout;

/// A boxed future for async handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request handler.
pub type Handler = Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// A function that wraps a handler.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Builds a [`Handler`] from a closure returning a boxed future.
///
/// ```
/// use wraith_router::handler;
///
/// let hello = handler(|ctx| Box::pin(async move { ctx.text(200, "hello") }));
/// # let _ = hello;
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Builds a [`Middleware`] from a closure.
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `handler` with route middleware, then global middleware.
///
/// Within each list the first entry ends up outermost, so every global
/// middleware sees the request before, and the response after, every route
/// middleware.
pub(crate) fn compose(handler: &Handler, route: &[Middleware], global: &[Middleware]) -> Handler {
    let wrapped = route.iter().rev().fold(handler.clone(), |next, mw| mw(next));
    global.iter().rev().fold(wrapped, |next, mw| mw(next))
}

/// Combines several middleware into one, first entry outermost.
pub fn chain(middlewares: Vec<Middleware>) -> Middleware {
    middleware(move |next| middlewares.iter().rev().fold(next, |next, mw| mw(next)))
}

/// Applies `mw` only to requests for which `condition` holds.
pub fn when<C>(condition: C, mw: Middleware) -> Middleware
where
    C: Fn(&Context) -> bool + Send + Sync + 'static,
{
    let condition = Arc::new(condition);
    middleware(move |next: Handler| {
        let wrapped = mw(next.clone());
        let condition = condition.clone();
        handler(move |ctx| {
            if condition(&*ctx) {
                wrapped(ctx)
            } else {
                next(ctx)
            }
        })
    })
}
