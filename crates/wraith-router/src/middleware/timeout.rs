//! Per-request deadline.

use std::time::Duration;

use tracing::warn;

use super::{handler, middleware, Handler, Middleware};
use crate::error::RouterError;

/// Aborts the rest of the chain once `duration` has elapsed.
///
/// On expiry the inner future is dropped, so the handler stops at its next
/// await point and never touches the context again. If nothing has been
/// written yet the client receives `504 {"error":"Request Timeout"}`;
/// otherwise the chain fails with [`RouterError::Timeout`].
pub fn timeout(duration: Duration) -> Middleware {
    middleware(move |next: Handler| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                match tokio::time::timeout(duration, next(&mut *ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            method = %ctx.method(),
                            path = %ctx.path(),
                            timeout_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                            "Request timed out"
                        );
                        if ctx.written() {
                            Err(RouterError::Timeout)
                        } else {
                            ctx.error(504, "Request Timeout")
                        }
                    }
                }
            })
        })
    })
}
