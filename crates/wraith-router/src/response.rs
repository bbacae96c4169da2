//! HTTP response type.

use std::collections::HashMap;

use serde::Serialize;

/// Content type used for JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type used for plain text bodies.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
/// Content type used for HTML bodies.
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

/// Body of every error response produced by the router.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Human readable message.
    pub error: &'a str,
}

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Creates a response with JSON content.
    ///
    /// Falls back to a 500 response if `data` cannot be serialized.
    pub fn json<T: Serialize>(status: u16, data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(body) => Self::new(status)
                .header("Content-Type", CONTENT_TYPE_JSON)
                .body(body),
            Err(_) => Self::error(500, "Internal Server Error"),
        }
    }

    /// Creates a response with plain text content.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .header("Content-Type", CONTENT_TYPE_TEXT)
            .body(body.into())
    }

    /// Creates a `{"error": message}` JSON response.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::to_vec(&ErrorBody { error: message })
            .unwrap_or_else(|_| br#"{"error":"Internal Server Error"}"#.to_vec());
        Self::new(status)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .body(body)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Sets a header in place, replacing any entry whose name differs only
    /// in case.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
    }

    /// Sets the status code.
    #[must_use]
    pub const fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Gets a header value (case-insensitive).
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoding error if the body is not valid JSON for `T`.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Restores the 200/no headers/empty body state, keeping allocations.
    pub(crate) fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
    }

    /// Returns the status text for the current status code.
    pub const fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}
