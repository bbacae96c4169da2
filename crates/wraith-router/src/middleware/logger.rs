//! Access logging.

use std::time::Instant;

use tracing::{info, warn};

use super::{handler, middleware, Handler, Middleware};

/// Logs method, path, status and latency of every request.
pub fn logger() -> Middleware {
    middleware(|next: Handler| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let start = Instant::now();
                let result = next(&mut *ctx).await;
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

                match &result {
                    Ok(()) => info!(
                        method = %ctx.method(),
                        path = %ctx.path(),
                        status = ctx.status(),
                        latency_ms,
                        "Request handled"
                    ),
                    Err(err) => warn!(
                        method = %ctx.method(),
                        path = %ctx.path(),
                        latency_ms,
                        error = %err,
                        "Request failed"
                    ),
                }
                result
            })
        })
    })
}
