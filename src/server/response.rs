use super::request::HeaderVec;
use crate::errors::RouteError;
use crate::handlers::WebsocketConn;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Reason phrase for a status code
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Buffered response built up by middleware and handlers
///
/// The status line is written once: the first `write_header` (or the implicit
/// 200 of the first `write`) wins and later attempts are ignored with a
/// warning. Body writes append.
pub struct Response {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    written: bool,
    early_break: bool,
    websocket: Option<Arc<dyn WebsocketConn>>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("written", &self.written)
            .field("early_break", &self.early_break)
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}

impl Response {
    /// Fresh, unwritten response (status 200 until something is written)
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
            written: false,
            early_break: false,
            websocket: None,
        }
    }

    /// Current status code
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True once a status has been committed
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Commit the status code; only the first call has effect
    pub fn write_header(&mut self, status: u16) {
        if self.written {
            warn!(
                current = self.status,
                ignored = status,
                "Status already written, ignoring"
            );
            return;
        }
        self.status = status;
        self.written = true;
    }

    /// Append body bytes, committing 200 if no status was written yet
    pub fn write(&mut self, bytes: &[u8]) {
        if !self.written {
            self.write_header(200);
        }
        self.body.extend_from_slice(bytes);
    }

    /// Set a header, replacing any value under the same name
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
            return;
        }
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value));
    }

    /// Add a header, keeping existing values under the same name
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
    }

    /// First value of a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers
    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Body written so far
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text (lossy)
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Write a JSON body with `200` unless a status was already committed
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.set_header("content-type", "application/json");
                self.write(&bytes);
            }
            Err(e) => {
                self.write_error(&RouteError::internal(e.to_string()), false);
            }
        }
    }

    /// Write a JSON body with an explicit status
    pub fn json_status<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) {
        self.write_header(status);
        self.json(value);
    }

    /// Write an HTML body
    pub fn html(&mut self, html: &str) {
        self.set_header("content-type", "text/html; charset=utf-8");
        self.write(html.as_bytes());
    }

    /// Write a plain-text body
    pub fn text(&mut self, text: &str) {
        self.set_header("content-type", "text/plain; charset=utf-8");
        self.write(text.as_bytes());
    }

    /// Render an error as `{"error": ..., "status": ...}`
    ///
    /// Does nothing when a response was already written, so the first
    /// writer always wins.
    pub fn write_error(&mut self, err: &RouteError, debug: bool) {
        if self.written {
            return;
        }
        self.write_header(err.status());
        if let RouteError::MethodNotAllowed { allowed, .. } = err {
            self.set_header("allow", allowed.as_str());
        }
        let body = err.to_json(debug);
        self.set_header("content-type", "application/json");
        self.body = body.to_string().into_bytes();
    }

    /// Flag that an inner handler produced the response
    ///
    /// Static and webapp servers check this after running their pre-handler
    /// and skip their own file serving when it is set.
    pub fn early_break(&mut self) {
        self.early_break = true;
    }

    /// Whether [`Response::early_break`] was called
    #[must_use]
    pub fn is_early_break(&self) -> bool {
        self.early_break
    }

    /// Websocket connection attached by the upgrade wrapper
    #[must_use]
    pub fn websocket(&self) -> Option<Arc<dyn WebsocketConn>> {
        self.websocket.clone()
    }

    /// Attach an upgraded websocket connection
    pub fn attach_websocket(&mut self, conn: Arc<dyn WebsocketConn>) {
        self.websocket = Some(conn);
    }

    /// Drop the status and body so a recovered failure can write a clean error
    ///
    /// Headers set by outer middleware (CORS, request id) are kept; body
    /// framing headers are not.
    pub(crate) fn discard(&mut self) {
        self.status = 200;
        self.written = false;
        self.body.clear();
        self.headers
            .retain(|(k, _)| !matches!(k.as_ref(), "content-type" | "content-disposition"));
    }

    /// Split into status, headers and body for the transport
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderVec, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}
