//! Route table and request dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{Result, RouterError};
use crate::events::{EventKind, EventPipeline, Payload};
use crate::middleware::{compose, Handler, Middleware};
use crate::path::PathPattern;
use crate::pool::{ContextPool, PoolStats};
use crate::request::{Method, PathParams, Request};
use crate::response::Response;

/// A single route definition.
#[derive(Clone)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Path pattern.
    pub pattern: PathPattern,
    /// Request handler.
    pub handler: Handler,
    /// Route-scoped middleware, first entry outermost.
    pub middleware: Vec<Middleware>,
    /// Optional route name for reverse URL lookup.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Tags for grouping in listings.
    pub tags: Vec<String>,
}

impl Route {
    /// Creates a new route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if `path` is not a valid pattern.
    pub fn new(method: Method, path: &str, handler: Handler) -> Result<Self> {
        Ok(Self {
            method,
            pattern: PathPattern::parse(path)?,
            handler,
            middleware: Vec::new(),
            name: None,
            description: None,
            tags: Vec::new(),
        })
    }

    /// Sets the route name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Appends route-scoped middleware.
    #[must_use]
    pub fn with_middleware(mut self, mw: Middleware) -> Self {
        self.middleware.push(mw);
        self
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.pattern())
            .field("middleware", &self.middleware.len())
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Identifies a registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHandle {
    /// Position in registration order.
    pub id: usize,
    /// HTTP method.
    pub method: Method,
    /// Pattern as registered.
    pub pattern: String,
}

/// Outcome of resolving a request against the route table.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A route matched method and path.
    Matched {
        /// The winning route.
        route: Arc<Route>,
        /// Parameters captured from the path.
        params: PathParams,
    },
    /// Some route matched the path, none the method.
    MethodNotAllowed,
    /// No route matched the path.
    NotFound,
}

#[derive(Default)]
struct RouteTable {
    routes: Vec<Arc<Route>>,
    named: HashMap<String, usize>,
}

impl RouteTable {
    fn insert(&mut self, route: Route) -> RouteHandle {
        let id = self.routes.len();
        if let Some(name) = &route.name {
            self.named.insert(name.clone(), id);
        }
        let handle = RouteHandle {
            id,
            method: route.method,
            pattern: route.pattern.pattern().to_string(),
        };
        self.routes.push(Arc::new(route));
        handle
    }

    fn resolve(&self, method: Method, path: &str) -> Resolution {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.pattern.match_path(path) {
                return Resolution::Matched {
                    route: route.clone(),
                    params,
                };
            }
        }

        if self
            .routes
            .iter()
            .any(|route| route.pattern.match_path(path).is_some())
        {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}

/// A set of routes sharing a path prefix and middleware.
///
/// Created by [`Router::group`]. Routes are registered on the router
/// immediately; the group only carries the prefix and middleware.
pub struct RouteGroup<'r> {
    router: &'r Router,
    prefix: String,
    middleware: Vec<Middleware>,
}

impl fmt::Debug for RouteGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGroup")
            .field("prefix", &self.prefix)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

impl<'r> RouteGroup<'r> {
    /// Returns the path prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Creates a nested group.
    ///
    /// Prefixes are concatenated; the nested group's middleware runs inside
    /// this group's middleware.
    #[must_use]
    pub fn group(&self, prefix: &str, middleware: Vec<Middleware>) -> RouteGroup<'r> {
        let mut combined = self.middleware.clone();
        combined.extend(middleware);
        RouteGroup {
            router: self.router,
            prefix: join_paths(&self.prefix, prefix),
            middleware: combined,
        }
    }

    /// Registers a route under this group.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> Result<RouteHandle> {
        let mut combined = self.middleware.clone();
        combined.extend(middleware);
        self.router
            .register(method, &join_paths(&self.prefix, path), handler, combined)
    }

    /// Registers a route carrying metadata, prefixing its pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn route(&self, mut route: Route) -> Result<RouteHandle> {
        route.pattern = PathPattern::parse(&join_paths(&self.prefix, route.pattern.pattern()))?;
        let mut combined = self.middleware.clone();
        combined.append(&mut route.middleware);
        route.middleware = combined;
        Ok(self.router.route(route))
    }

    /// Adds a GET route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn get(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Get, path, handler, Vec::new())
    }

    /// Adds a POST route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn post(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Post, path, handler, Vec::new())
    }

    /// Adds a PUT route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn put(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Put, path, handler, Vec::new())
    }

    /// Adds a PATCH route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn patch(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Patch, path, handler, Vec::new())
    }

    /// Adds a DELETE route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn delete(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Delete, path, handler, Vec::new())
    }

    /// Adds the same handler for every method.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn any(&self, path: &str, handler: &Handler) -> Result<Vec<RouteHandle>> {
        Method::ALL
            .into_iter()
            .map(|method| self.register(method, path, handler.clone(), Vec::new()))
            .collect()
    }
}

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => prefix.to_string(),
        (true, false) => format!("/{path}"),
        (false, false) => format!("{prefix}/{path}"),
    }
}

/// The request dispatcher.
///
/// Registration takes `&self`, so a router can be shared behind an `Arc`
/// and extended while it serves requests. Locks are never held across a
/// handler invocation.
pub struct Router {
    table: RwLock<RouteTable>,
    middleware: RwLock<Vec<Middleware>>,
    not_found: RwLock<Option<Handler>>,
    method_not_allowed: RwLock<Option<Handler>>,
    pool: ContextPool,
    pipeline: Arc<EventPipeline>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.read().routes.len())
            .field("middleware", &self.middleware.read().len())
            .field("pool", &self.pool)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new empty router.
    pub fn new() -> Self {
        Self::with_pool(ContextPool::default())
    }

    /// Creates a router sized by `config`.
    pub fn with_config(config: &ServerConfig) -> Self {
        Self::with_pool(ContextPool::new(config.max_idle_contexts))
    }

    fn with_pool(pool: ContextPool) -> Self {
        Self {
            table: RwLock::new(RouteTable::default()),
            middleware: RwLock::new(Vec::new()),
            not_found: RwLock::new(None),
            method_not_allowed: RwLock::new(None),
            pool,
            pipeline: Arc::new(EventPipeline::new()),
        }
    }

    // --- Registration ---

    /// Registers a route with route-scoped middleware.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> Result<RouteHandle> {
        let mut route = Route::new(method, path, handler)?;
        route.middleware = middleware;
        Ok(self.route(route))
    }

    /// Registers a fully built route.
    pub fn route(&self, route: Route) -> RouteHandle {
        let handle = self.table.write().insert(route);
        debug!(
            id = handle.id,
            method = %handle.method,
            pattern = %handle.pattern,
            "Registered route"
        );
        handle
    }

    /// Adds a GET route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn get(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Get, path, handler, Vec::new())
    }

    /// Adds a POST route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn post(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Post, path, handler, Vec::new())
    }

    /// Adds a PUT route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn put(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Put, path, handler, Vec::new())
    }

    /// Adds a PATCH route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn patch(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Patch, path, handler, Vec::new())
    }

    /// Adds a DELETE route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn delete(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Delete, path, handler, Vec::new())
    }

    /// Adds a HEAD route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn head(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Head, path, handler, Vec::new())
    }

    /// Adds an OPTIONS route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn options(&self, path: &str, handler: Handler) -> Result<RouteHandle> {
        self.register(Method::Options, path, handler, Vec::new())
    }

    /// Adds the same handler for every method in [`Method::ALL`].
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an invalid pattern.
    pub fn any(&self, path: &str, handler: &Handler) -> Result<Vec<RouteHandle>> {
        // Validate once so an invalid pattern registers nothing.
        PathPattern::parse(path)?;
        Method::ALL
            .into_iter()
            .map(|method| self.register(method, path, handler.clone(), Vec::new()))
            .collect()
    }

    /// Appends global middleware.
    ///
    /// Applies to requests dispatched after the call.
    pub fn use_middleware(&self, mw: Middleware) -> &Self {
        self.middleware.write().push(mw);
        self
    }

    /// Creates a route group with a common prefix and middleware.
    #[must_use]
    pub fn group(&self, prefix: &str, middleware: Vec<Middleware>) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: join_paths("", prefix),
            middleware,
        }
    }

    /// Replaces the default 404 response.
    pub fn not_found(&self, handler: Handler) -> &Self {
        *self.not_found.write() = Some(handler);
        self
    }

    /// Replaces the default 405 response.
    pub fn method_not_allowed(&self, handler: Handler) -> &Self {
        *self.method_not_allowed.write() = Some(handler);
        self
    }

    // --- Introspection ---

    /// Returns a snapshot of the registered routes in registration order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.read().routes.clone()
    }

    /// Generates a URL for a named route.
    pub fn url_for(&self, name: &str, params: &HashMap<String, String>) -> Option<String> {
        let table = self.table.read();
        let id = *table.named.get(name)?;
        table.routes.get(id)?.pattern.reverse(params)
    }

    /// Resolves a method and path against the route table.
    pub fn resolve(&self, method: Method, path: &str) -> Resolution {
        self.table.read().resolve(method, path)
    }

    /// Returns the event pipeline.
    pub const fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }

    /// Returns context pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // --- Dispatch ---

    /// Handles an incoming request.
    ///
    /// Never fails: routing misses and handler errors become error
    /// responses. The pooled context goes back to the pool before the
    /// response is returned.
    pub async fn handle(&self, request: Request) -> Response {
        let mut ctx = self.pool.acquire(request);
        self.pipeline.emit(EventKind::BeforeRequest, Payload::Request(&ctx));

        if let Err(err) = self.dispatch(&mut ctx).await {
            self.fail(&mut ctx, &err);
        }

        self.pipeline.emit(EventKind::AfterRequest, Payload::Request(&ctx));
        let response = ctx.take_response();
        self.pool.release(ctx);
        response
    }

    async fn dispatch(&self, ctx: &mut Context) -> Result<()> {
        let resolution = self.resolve(ctx.method(), ctx.path());

        match resolution {
            Resolution::Matched { route, params } => {
                debug!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    pattern = %route.pattern.pattern(),
                    "Route matched"
                );
                ctx.set_params(params);
                let global = self.middleware.read().clone();
                let chain = compose(&route.handler, &route.middleware, &global);
                chain(ctx).await
            }
            Resolution::MethodNotAllowed => {
                warn!(method = %ctx.method(), path = %ctx.path(), "Method not allowed");
                let fallback = self.method_not_allowed.read().clone();
                match fallback {
                    Some(handler) => handler(ctx).await,
                    None => ctx.error(405, "Method Not Allowed"),
                }
            }
            Resolution::NotFound => {
                warn!(method = %ctx.method(), path = %ctx.path(), "No route matched");
                let fallback = self.not_found.read().clone();
                match fallback {
                    Some(handler) => handler(ctx).await,
                    None => ctx.error(404, "Not Found"),
                }
            }
        }
    }

    fn fail(&self, ctx: &mut Context, err: &RouterError) {
        let message = err.to_string();
        error!(
            method = %ctx.method(),
            path = %ctx.path(),
            error = %message,
            "Request handler failed"
        );
        ctx.set("error", message.clone());
        self.pipeline.emit(EventKind::Error, Payload::Request(ctx));

        if !ctx.written() {
            if let Err(write_err) = ctx.error(500, &message) {
                warn!(error = %write_err, "Failed to write error response");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler;

    fn text(body: &'static str) -> Handler {
        handler(move |ctx| Box::pin(async move { ctx.text(200, body) }))
    }

    fn user_handler() -> Handler {
        handler(|ctx| {
            Box::pin(async move {
                let id = ctx.param("id").unwrap_or("unknown").to_string();
                ctx.text(200, format!("User: {id}"))
            })
        })
    }

    #[tokio::test]
    async fn test_basic_routing() {
        let router = Router::new();
        router.get("/", text("Hello, World!")).unwrap();
        router.get("/users/:id", user_handler()).unwrap();

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("Hello, World!".to_string()));
    }

    #[tokio::test]
    async fn test_path_params() {
        let router = Router::new();
        router.get("/users/:id", user_handler()).unwrap();

        let res = router.handle(Request::get("/users/123")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("User: 123".to_string()));
    }

    #[test]
    fn test_resolution_first_registered_wins() {
        let router = Router::new();
        let first = router.get("/a", text("first")).unwrap();
        router.get("/a", text("second")).unwrap();

        match router.resolve(Method::Get, "/a") {
            Resolution::Matched { route, .. } => {
                assert_eq!(route.pattern.pattern(), first.pattern);
                assert!(Arc::ptr_eq(&route, &router.routes()[first.id]));
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_method_not_allowed_vs_not_found() {
        let router = Router::new();
        router.get("/items", text("list")).unwrap();
        router.delete("/items", text("clear")).unwrap();

        assert!(matches!(
            router.resolve(Method::Post, "/items"),
            Resolution::MethodNotAllowed
        ));
        assert!(matches!(
            router.resolve(Method::Get, "/missing"),
            Resolution::NotFound
        ));
    }

    #[tokio::test]
    async fn test_not_found() {
        let router = Router::new();
        router.get("/", text("home")).unwrap();

        let res = router.handle(Request::get("/nonexistent")).await;
        assert_eq!(res.status, 404);
        let body: serde_json::Value = res.body_json().unwrap();
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let router = Router::new();
        router.get("/", text("home")).unwrap();

        let res = router.handle(Request::post("/")).await;
        assert_eq!(res.status, 405);
        let body: serde_json::Value = res.body_json().unwrap();
        assert_eq!(body["error"], "Method Not Allowed");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let router = Router::new();
        let err = router.get("/files/*path/edit", text("x")).unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern(_)));
        assert!(router.routes().is_empty());
    }

    #[test]
    fn test_any_registers_every_method() {
        let router = Router::new();
        let handles = router.any("/ping", &text("pong")).unwrap();
        assert_eq!(handles.len(), Method::ALL.len());
        for method in Method::ALL {
            assert!(matches!(
                router.resolve(method, "/ping"),
                Resolution::Matched { .. }
            ));
        }
    }

    #[test]
    fn test_named_route() {
        let router = Router::new();
        let route = Route::new(Method::Get, "/users/:id", user_handler())
            .unwrap()
            .name("user_detail")
            .describe("Fetch one user")
            .tag("users");
        router.route(route);

        let params: HashMap<String, String> =
            [("id".to_string(), "42".to_string())].into_iter().collect();
        assert_eq!(
            router.url_for("user_detail", &params),
            Some("/users/42".to_string())
        );
        assert_eq!(router.url_for("missing", &params), None);

        let routes = router.routes();
        assert_eq!(routes[0].description.as_deref(), Some("Fetch one user"));
        assert_eq!(routes[0].tags, vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_route_group() {
        let router = Router::new();
        let api = router.group("/api/v1", Vec::new());
        api.get("/users", text("users")).unwrap();
        api.get("/users/:id", user_handler()).unwrap();

        let res = router.handle(Request::get("/api/v1/users/123")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("User: 123".to_string()));
    }

    #[test]
    fn test_nested_groups_concatenate_prefixes() {
        let router = Router::new();
        let api = router.group("/api/", Vec::new());
        let admin = api.group("admin", Vec::new());
        let handle = admin.get("/stats", text("stats")).unwrap();
        assert_eq!(handle.pattern, "/api/admin/stats");
        assert_eq!(admin.prefix(), "/api/admin");

        let root = admin.get("/", text("admin")).unwrap();
        assert_eq!(root.pattern, "/api/admin");
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/api", ""), "/api");
        assert_eq!(join_paths("", "users"), "/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
    }
}
