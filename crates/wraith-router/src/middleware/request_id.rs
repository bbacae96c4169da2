//! Request correlation ids.

use uuid::Uuid;

use super::{handler, middleware, Handler, Middleware};

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Store key holding the request id.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Tags each request with an id.
///
/// An incoming `X-Request-ID` header is reused; otherwise a random UUID is
/// generated. The id is echoed in the response header and stored under
/// [`REQUEST_ID_KEY`].
pub fn request_id() -> Middleware {
    middleware(|next: Handler| {
        handler(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let id = ctx
                    .header(REQUEST_ID_HEADER)
                    .filter(|id| !id.is_empty())
                    .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
                ctx.set_header(REQUEST_ID_HEADER, id.clone());
                ctx.set(REQUEST_ID_KEY, id);
                next(ctx).await
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::middleware::compose;
    use crate::request::Request;

    fn echo() -> Handler {
        handler(|ctx| {
            Box::pin(async move {
                let id = ctx.get_str(REQUEST_ID_KEY)?;
                ctx.text(200, id)
            })
        })
    }

    #[tokio::test]
    async fn test_reuses_incoming_id() {
        let h = compose(&echo(), &[], &[request_id()]);
        let mut ctx = Context::new(Request::get("/").header("X-Request-ID", "abc-123"));
        h(&mut ctx).await.unwrap();

        assert_eq!(ctx.response().get_header(REQUEST_ID_HEADER), Some("abc-123"));
        assert_eq!(ctx.response().body_string().as_deref(), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_generates_uuid() {
        let h = compose(&echo(), &[], &[request_id()]);
        let mut ctx = Context::new(Request::get("/"));
        h(&mut ctx).await.unwrap();

        let id = ctx.response().get_header(REQUEST_ID_HEADER).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
