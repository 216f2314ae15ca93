//! Handler type and the built-in terminal handlers.
//!
//! A [`Handler`] is any shared `Fn(&mut Response, &mut Request) -> HandlerResult`.
//! The built-in terminals wrap an optional user handler:
//!
//! - [`static_server`] serves, downloads, lists and receives files under a root
//! - [`webapp_server`] serves a single-page app with index fallback
//! - [`websocket_handler`] performs the upgrade handshake before the user handler

mod static_files;
mod upload;
mod webapp;
mod websocket;

pub use static_files::{parse_size, static_server, DownloadConfig, StaticConfig, StaticFiles};
pub use upload::{UploadCallback, UploadConfig};
pub use webapp::{webapp_server, WebappConfig};
pub use websocket::{
    websocket_handler, HandshakeUpgrader, QueuedConn, WebsocketConn, WebsocketUpgrader,
};

use crate::errors::RouteError;
use crate::server::{Request, Response};
use std::sync::Arc;

/// Outcome of a handler or middleware invocation
pub type HandlerResult = Result<(), RouteError>;

/// Shared request handler
///
/// Handlers write into the buffered [`Response`]; failures travel back up
/// the middleware chain as [`RouteError`]s.
pub type Handler = Arc<dyn Fn(&mut Response, &mut Request) -> HandlerResult + Send + Sync>;

/// Wrap a closure as a [`Handler`]
///
/// # Example
///
/// ```
/// use starroute::{handler, Handler};
///
/// let hello: Handler = handler(|res, _req| {
///     res.text("hello");
///     Ok(())
/// });
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Response, &mut Request) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run the optional pre-handler of a static/webapp route.
///
/// Returns `true` when the handler set the early-break flag, meaning the
/// caller must not fall back to its own file serving.
pub(crate) fn run_pre_handler(
    pre: Option<&Handler>,
    res: &mut Response,
    req: &mut Request,
) -> Result<bool, RouteError> {
    if let Some(pre) = pre {
        pre(res, req)?;
    }
    Ok(res.is_early_break())
}
