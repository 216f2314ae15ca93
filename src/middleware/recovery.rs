use super::Middleware;
use crate::errors::RouteError;
use crate::handlers::Handler;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Top-level supervisor for a request
///
/// Always installed outermost by the dispatcher. It guarantees exactly one
/// response per request:
///
/// - a panic anywhere inside is caught, logged, and turned into a 500
///   (sent as a JSON message instead when a websocket is attached)
/// - an error returned from inside is rendered as its JSON error body,
///   unless something was already written
///
/// In debug mode the panic backtrace is included in the response body.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware {
    debug: bool,
}

impl RecoveryMiddleware {
    /// Create a supervisor; `debug` adds panic backtraces to responses
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

/// Extract the text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Middleware for RecoveryMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let debug = self.debug;
        Arc::new(move |res, req| {
            let outcome = catch_unwind(AssertUnwindSafe(|| next(res, req)));
            match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    if err.status() >= 500 {
                        error!(
                            request_id = %req.request_id(),
                            status = err.status(),
                            error = %err,
                            "Request failed"
                        );
                    } else {
                        debug!(
                            request_id = %req.request_id(),
                            status = err.status(),
                            error = %err,
                            "Request failed"
                        );
                    }
                    res.write_error(&err, debug);
                    Ok(())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let backtrace = Backtrace::force_capture();
                    error!(
                        request_id = %req.request_id(),
                        method = %req.method(),
                        path = %req.path(),
                        panic_message = %message,
                        backtrace = %backtrace,
                        "Handler panicked"
                    );
                    let err = RouteError::Panic {
                        message,
                        backtrace: debug.then(|| backtrace.to_string()),
                    };

                    if let Some(conn) = res.websocket() {
                        if let Err(send_err) = conn.send_json(&err.to_json(debug)) {
                            error!(error = %send_err, "Failed to report panic over websocket");
                        }
                        return Ok(());
                    }

                    res.discard();
                    res.write_error(&err, debug);
                    Ok(())
                }
            }
        })
    }
}
