//! Security response headers.

use super::{handler, middleware, Handler, Middleware};

const HEADERS: [(&str, &str); 5] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
    ("Content-Security-Policy", "default-src 'self'"),
];

/// Adds a conservative set of security headers to every response.
pub fn secure_headers() -> Middleware {
    middleware(|next: Handler| {
        handler(move |ctx| {
            for (key, value) in HEADERS {
                ctx.set_header(key, value);
            }
            next(ctx)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::middleware::compose;
    use crate::request::Request;

    #[tokio::test]
    async fn test_headers_present() {
        let ok = handler(|ctx| Box::pin(async move { ctx.text(200, "ok") }));
        let h = compose(&ok, &[], &[secure_headers()]);
        let mut ctx = Context::new(Request::get("/"));
        h(&mut ctx).await.unwrap();

        assert_eq!(ctx.response().get_header("X-Frame-Options"), Some("DENY"));
        assert_eq!(
            ctx.response().get_header("X-Content-Type-Options"),
            Some("nosniff")
        );
    }
}
