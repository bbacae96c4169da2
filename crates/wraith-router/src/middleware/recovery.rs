//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::error;

use super::{handler, middleware, Handler, Middleware};

/// Settings for [`recovery_with_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryConfig {
    /// Put the panic message in the 500 response body instead of a generic text.
    pub expose_panic_message: bool,
}

/// Converts panics in the rest of the chain into a 500 response.
pub fn recovery() -> Middleware {
    recovery_with_config(RecoveryConfig::default())
}

/// Like [`recovery`], with explicit settings.
pub fn recovery_with_config(config: RecoveryConfig) -> Middleware {
    middleware(move |next: Handler| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let outcome = AssertUnwindSafe(next(&mut *ctx)).catch_unwind().await;
                match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(
                            method = %ctx.method(),
                            path = %ctx.path(),
                            panic = %message,
                            "Handler panicked"
                        );
                        if ctx.written() {
                            return Ok(());
                        }
                        if config.expose_panic_message {
                            ctx.internal_server_error(&message)
                        } else {
                            ctx.internal_server_error("Internal Server Error")
                        }
                    }
                }
            })
        })
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::middleware::compose;
    use crate::request::Request;

    fn explode() -> crate::error::Result<()> {
        panic!("boom")
    }

    fn panicking() -> Handler {
        handler(|_ctx| Box::pin(async move { explode() }))
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let h = compose(&panicking(), &[], &[recovery()]);
        let mut ctx = Context::new(Request::get("/"));
        h(&mut ctx).await.unwrap();

        assert_eq!(ctx.status(), 500);
        let body: serde_json::Value = ctx.response().body_json().unwrap();
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_expose_panic_message() {
        let mw = recovery_with_config(RecoveryConfig {
            expose_panic_message: true,
        });
        let h = compose(&panicking(), &[], &[mw]);
        let mut ctx = Context::new(Request::get("/"));
        h(&mut ctx).await.unwrap();

        let body: serde_json::Value = ctx.response().body_json().unwrap();
        assert_eq!(body["error"], "boom");
    }

    #[tokio::test]
    async fn test_passes_through_without_panic() {
        let ok = handler(|ctx| Box::pin(async move { ctx.text(201, "made") }));
        let h = compose(&ok, &[], &[recovery()]);
        let mut ctx = Context::new(Request::get("/"));
        h(&mut ctx).await.unwrap();
        assert_eq!(ctx.status(), 201);
    }
}
