//! Per-request context passed through the middleware chain.
//!
//! A [`Context`] carries the request, the captured path parameters, the
//! response being built and a typed key/value store. Contexts handed out by
//! the router come from a [`ContextPool`](crate::ContextPool) and are reset
//! before every use.

use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, RouterError, StoreError};
use crate::request::{Method, PathParams, Request};
use crate::response::{
    ErrorBody, Response, CONTENT_TYPE_HTML, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT,
};

/// A value in the per-request store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string.
    Str(String),
    /// A signed integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// Arbitrary structured data.
    Json(serde_json::Value),
}

impl Value {
    /// Returns the name of the variant, used in type mismatch errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Json(_) => "json",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Str(s) => serde_json::Value::from(s.as_str()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Bool(b) => serde_json::Value::from(*b),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Mutable per-request state.
#[derive(Debug, Default)]
pub struct Context {
    request: Request,
    params: PathParams,
    response: Response,
    written: bool,
    store: RwLock<HashMap<String, Value>>,
}

impl Context {
    /// Creates a standalone context that does not belong to any pool.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Prepares a recycled context for a new request.
    ///
    /// Clears everything the previous occupant left behind.
    pub(crate) fn reset(&mut self, request: Request) {
        self.request = request;
        self.params.clear();
        self.response.reset();
        self.written = false;
        self.store.get_mut().clear();
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    /// Returns an independent copy that is not tied to the pool.
    ///
    /// Use this to hand request state to work that may outlive the request,
    /// such as asynchronous event handlers.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            request: self.request.clone(),
            params: self.params.clone(),
            response: self.response.clone(),
            written: self.written,
            store: RwLock::new(self.store.read().clone()),
        }
    }

    // --- Request ---

    /// Returns the request.
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the request method.
    pub const fn method(&self) -> Method {
        self.request.method
    }

    /// Returns the request path.
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Returns the captured path parameters.
    pub const fn params(&self) -> &PathParams {
        &self.params
    }

    /// Returns a path parameter by name.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// Parses a path parameter.
    pub fn param_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.params.parse(key)
    }

    /// Returns a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.request.get_query(key)
    }

    /// Returns a query parameter, or `default` when it is absent or empty.
    pub fn query_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.query(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    /// Parses a query parameter.
    pub fn query_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.query(key).and_then(|v| v.parse().ok())
    }

    /// Returns true for `true`, `1` or `yes` (any case).
    pub fn query_bool(&self, key: &str) -> bool {
        self.query(key).is_some_and(|v| {
            v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes")
        })
    }

    /// Returns a request header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.request.get_header(key)
    }

    /// Returns the client address.
    ///
    /// Prefers the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
    /// peer address with its port removed.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header("X-Forwarded-For").filter(|v| !v.is_empty()) {
            let first = forwarded.split(',').next().unwrap_or(forwarded);
            return Some(first.trim().to_string());
        }
        if let Some(real) = self.header("X-Real-IP").filter(|v| !v.is_empty()) {
            return Some(real.to_string());
        }
        self.request.remote_addr.as_deref().map(|addr| {
            addr.rsplit_once(':')
                .map_or(addr, |(host, _port)| host)
                .to_string()
        })
    }

    /// Decodes the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Serialization`] if the body does not decode.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(self.request.json()?)
    }

    // --- Response ---

    /// Sets a response header, replacing any existing value regardless of
    /// the name's case.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.response.set_header(key, value);
    }

    /// Sets the status used if the response is written without an explicit one.
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.response.status = status;
        self
    }

    /// Returns the current response status.
    pub const fn status(&self) -> u16 {
        self.response.status
    }

    /// Returns true once a response has been written.
    pub const fn written(&self) -> bool {
        self.written
    }

    /// Returns the response built so far.
    pub const fn response(&self) -> &Response {
        &self.response
    }

    fn write(&mut self, status: u16, content_type: Option<&str>, body: Vec<u8>) -> Result<()> {
        if self.written {
            warn!(
                method = %self.request.method,
                path = %self.request.path,
                status,
                "Response already written, refusing second write"
            );
            return Err(RouterError::ResponseAlreadyWritten);
        }
        if let Some(content_type) = content_type {
            self.set_header("Content-Type", content_type);
        }
        self.response.status = status;
        self.response.body = body;
        self.written = true;
        Ok(())
    }

    /// Writes a JSON response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written or `value` does not serialize.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.write(status, Some(CONTENT_TYPE_JSON), body)
    }

    /// Writes a plain text response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn text(&mut self, status: u16, body: impl Into<String>) -> Result<()> {
        self.write(status, Some(CONTENT_TYPE_TEXT), body.into().into_bytes())
    }

    /// Writes an HTML response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn html(&mut self, status: u16, body: impl Into<String>) -> Result<()> {
        self.write(status, Some(CONTENT_TYPE_HTML), body.into().into_bytes())
    }

    /// Writes raw bytes with a custom content type.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn bytes(&mut self, status: u16, content_type: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.write(status, Some(content_type), data.into())
    }

    /// Writes a 204 No Content response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn no_content(&mut self) -> Result<()> {
        self.write(204, None, Vec::new())
    }

    /// Writes a redirect response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn redirect(&mut self, status: u16, location: impl Into<String>) -> Result<()> {
        self.write(status, None, Vec::new())?;
        self.set_header("Location", location);
        Ok(())
    }

    /// Writes a `{"error": message}` JSON response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn error(&mut self, status: u16, message: &str) -> Result<()> {
        self.json(status, &ErrorBody { error: message })
    }

    /// Writes a 400 error response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn bad_request(&mut self, message: &str) -> Result<()> {
        self.error(400, message)
    }

    /// Writes a 401 error response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn unauthorized(&mut self, message: &str) -> Result<()> {
        self.error(401, message)
    }

    /// Writes a 403 error response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn forbidden(&mut self, message: &str) -> Result<()> {
        self.error(403, message)
    }

    /// Writes a 404 error response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn not_found(&mut self, message: &str) -> Result<()> {
        self.error(404, message)
    }

    /// Writes a 500 error response.
    ///
    /// # Errors
    ///
    /// Fails if a response was already written.
    pub fn internal_server_error(&mut self, message: &str) -> Result<()> {
        self.error(500, message)
    }

    // --- Store ---

    /// Stores a value under `key`, replacing any previous value.
    ///
    /// Takes `&self` so lifecycle event handlers can annotate the request.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.write().insert(key.into(), value.into());
    }

    /// Returns a copy of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.read().get(key).cloned()
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.store.write().remove(key)
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.store.read().contains_key(key)
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> std::result::Result<T, StoreError> {
        let store = self.store.read();
        let value = store.get(key).ok_or_else(|| StoreError::Missing {
            key: key.to_string(),
        })?;
        extract(value).ok_or_else(|| StoreError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: value.type_name(),
        })
    }

    /// Returns the string under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if nothing is stored, [`StoreError::TypeMismatch`]
    /// if the value is not a string.
    pub fn get_str(&self, key: &str) -> std::result::Result<String, StoreError> {
        self.typed(key, "string", |v| match v {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        })
    }

    /// Returns the integer under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] or [`StoreError::TypeMismatch`].
    pub fn get_int(&self, key: &str) -> std::result::Result<i64, StoreError> {
        self.typed(key, "int", |v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
    }

    /// Returns the float under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] or [`StoreError::TypeMismatch`].
    pub fn get_float(&self, key: &str) -> std::result::Result<f64, StoreError> {
        self.typed(key, "float", |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        })
    }

    /// Returns the boolean under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] or [`StoreError::TypeMismatch`].
    pub fn get_bool(&self, key: &str) -> std::result::Result<bool, StoreError> {
        self.typed(key, "bool", |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
    }

    /// Decodes the value under `key` into `T`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`], or [`StoreError::TypeMismatch`] if the value
    /// does not decode as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> std::result::Result<T, StoreError> {
        self.typed(key, std::any::type_name::<T>(), |v| {
            serde_json::from_value(v.to_json()).ok()
        })
    }
}
