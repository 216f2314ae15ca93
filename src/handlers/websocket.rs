//! Websocket upgrade wrapper.
//!
//! The wrapper intercepts upgrade requests, runs a [`WebsocketUpgrader`] to
//! answer the handshake, attaches the resulting [`WebsocketConn`] to the
//! response, and then calls the route handler. Non-upgrade requests reach
//! the handler untouched.
//!
//! The default [`HandshakeUpgrader`] answers with `101 Switching Protocols`
//! and a [`QueuedConn`]: frames sent by the handler are queued on the
//! connection for the transport to flush, and frames received by the
//! transport are pushed in for the handler to read. Requests whose
//! transport cannot hand the connection over (see
//! [`Request::supports_upgrade`]) are refused with `501` instead.

use super::{Handler, HandlerResult};
use crate::errors::RouteError;
use crate::server::{Request, Response};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use tungstenite::handshake::derive_accept_key;
use tungstenite::Message;

/// Chunk size used by [`WebsocketConn::send_file`]
const FILE_CHUNK: usize = 1024;

/// Frames a [`QueuedConn`] holds before sends fail
pub const MAX_QUEUED_FRAMES: usize = 1024;

/// An upgraded websocket connection as seen by handlers
pub trait WebsocketConn: Send + Sync {
    /// Send one frame
    fn send(&self, message: Message) -> Result<(), RouteError>;

    /// Close the connection; later sends fail
    fn close(&self);

    /// Whether the connection is still open
    fn is_open(&self) -> bool;

    /// Send a text frame
    fn send_text(&self, text: &str) -> Result<(), RouteError> {
        self.send(Message::text(text))
    }

    /// Send a binary frame
    fn send_binary(&self, data: &[u8]) -> Result<(), RouteError> {
        self.send(Message::binary(data.to_vec()))
    }

    /// Send a JSON value as a text frame
    fn send_json(&self, value: &Value) -> Result<(), RouteError> {
        self.send_text(&value.to_string())
    }

    /// Stream a file as binary frames
    fn send_file(&self, path: &Path) -> Result<(), RouteError> {
        let bytes = fs::read(path)?;
        for chunk in bytes.chunks(FILE_CHUNK) {
            self.send_binary(chunk)?;
        }
        Ok(())
    }
}

/// Performs the protocol upgrade for a websocket route
pub trait WebsocketUpgrader: Send + Sync {
    /// Answer the handshake and return the connection to attach
    fn upgrade(
        &self,
        req: &Request,
        res: &mut Response,
    ) -> Result<Arc<dyn WebsocketConn>, RouteError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory connection with bounded outgoing and incoming frame queues
#[derive(Default)]
pub struct QueuedConn {
    outgoing: Mutex<VecDeque<Message>>,
    incoming: Mutex<VecDeque<Message>>,
    closed: AtomicBool,
}

impl fmt::Debug for QueuedConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedConn")
            .field("outgoing", &lock(&self.outgoing).len())
            .field("incoming", &lock(&self.incoming).len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl QueuedConn {
    /// Open connection with empty queues
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every frame queued for sending
    pub fn drain_outgoing(&self) -> Vec<Message> {
        lock(&self.outgoing).drain(..).collect()
    }

    /// Deliver a frame received from the peer
    ///
    /// The oldest frame is dropped when the queue is full.
    pub fn push_incoming(&self, message: Message) {
        let mut incoming = lock(&self.incoming);
        if incoming.len() >= MAX_QUEUED_FRAMES {
            incoming.pop_front();
        }
        incoming.push_back(message);
    }

    /// Next frame received from the peer
    pub fn recv(&self) -> Option<Message> {
        lock(&self.incoming).pop_front()
    }
}

impl WebsocketConn for QueuedConn {
    fn send(&self, message: Message) -> Result<(), RouteError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RouteError::internal("websocket connection is closed"));
        }
        let mut outgoing = lock(&self.outgoing);
        if outgoing.len() >= MAX_QUEUED_FRAMES {
            return Err(RouteError::internal("websocket send queue is full"));
        }
        outgoing.push_back(message);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            lock(&self.outgoing).push_back(Message::Close(None));
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

/// Origin check run during the handshake
pub type OriginCheck = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Default upgrader: validates the handshake and answers `101`
///
/// Every origin is accepted unless an origin check is configured.
#[derive(Clone, Default)]
pub struct HandshakeUpgrader {
    check_origin: Option<OriginCheck>,
}

impl fmt::Debug for HandshakeUpgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeUpgrader")
            .field("check_origin", &self.check_origin.is_some())
            .finish()
    }
}

impl HandshakeUpgrader {
    /// Accept every origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept handshakes whose `Origin` passes `check`
    #[must_use]
    pub fn check_origin<F>(mut self, check: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.check_origin = Some(Arc::new(check));
        self
    }
}

impl WebsocketUpgrader for HandshakeUpgrader {
    fn upgrade(
        &self,
        req: &Request,
        res: &mut Response,
    ) -> Result<Arc<dyn WebsocketConn>, RouteError> {
        if !req.supports_upgrade() {
            return Err(RouteError::NotImplemented {
                feature: "websocket upgrade on this transport".to_string(),
            });
        }
        if req.header("sec-websocket-version").map(str::trim) != Some("13") {
            res.set_header("sec-websocket-version", "13");
            return Err(RouteError::bad_request("unsupported websocket version"));
        }
        if let Some(check) = &self.check_origin {
            if !check(req.header("origin")) {
                return Err(RouteError::forbidden("websocket origin rejected"));
            }
        }
        let key = req
            .header("sec-websocket-key")
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RouteError::bad_request("missing Sec-WebSocket-Key"))?;

        res.write_header(101);
        res.set_header("upgrade", "websocket");
        res.set_header("connection", "Upgrade");
        res.set_header("sec-websocket-accept", derive_accept_key(key.as_bytes()));
        Ok(Arc::new(QueuedConn::new()))
    }
}

/// Wrap `inner` so upgrade requests are upgraded before it runs
pub fn websocket_handler(inner: Handler, upgrader: Arc<dyn WebsocketUpgrader>) -> Handler {
    Arc::new(move |res: &mut Response, req: &mut Request| -> HandlerResult {
        if req.is_websocket() && res.websocket().is_none() {
            match upgrader.upgrade(req, res) {
                Ok(conn) => {
                    debug!(path = %req.path(), request_id = %req.request_id(), "Websocket upgraded");
                    res.attach_websocket(conn);
                }
                Err(err) => {
                    warn!(path = %req.path(), error = %err, "Websocket upgrade failed");
                    return Err(err);
                }
            }
        }
        inner(res, req)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_conn_rejects_sends() {
        let conn = QueuedConn::new();
        conn.send_text("hi").unwrap();
        conn.close();
        assert!(!conn.is_open());
        assert!(conn.send_text("late").is_err());

        let frames = conn.drain_outgoing();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[1], Message::Close(None)));
    }

    #[test]
    fn test_outgoing_queue_is_bounded() {
        let conn = QueuedConn::new();
        for _ in 0..MAX_QUEUED_FRAMES {
            conn.send_text("x").unwrap();
        }
        assert!(conn.send_text("overflow").is_err());
        assert_eq!(conn.drain_outgoing().len(), MAX_QUEUED_FRAMES);
        assert!(conn.send_text("again").is_ok());
    }

    #[test]
    fn test_transport_without_upgrade_is_refused() {
        let req = Request::new(http::Method::GET, "/ws")
            .with_header("connection", "Upgrade")
            .with_header("upgrade", "websocket")
            .with_header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .with_header("sec-websocket-version", "13")
            .without_upgrade();
        let mut res = Response::new();
        let err = HandshakeUpgrader::new().upgrade(&req, &mut res).err();
        assert_eq!(err.map(|e| e.status()), Some(501));
        assert!(!res.is_written());
    }

    #[test]
    fn test_incoming_queue_is_fifo() {
        let conn = QueuedConn::new();
        conn.push_incoming(Message::text("a"));
        conn.push_incoming(Message::text("b"));
        assert_eq!(conn.recv(), Some(Message::text("a")));
        assert_eq!(conn.recv(), Some(Message::text("b")));
        assert_eq!(conn.recv(), None);
    }
}
