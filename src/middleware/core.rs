use crate::handlers::Handler;
use std::sync::Arc;

/// A request/response interceptor composed around a [`Handler`]
///
/// Middleware receives the next handler in the chain and returns a new
/// handler that runs around it. It may act before calling `next`, after it,
/// or short-circuit by not calling it at all.
///
/// Any `Fn(Handler) -> Handler` closure is a middleware:
///
/// ```
/// use starroute::{Handler, Middleware};
/// use std::sync::Arc;
///
/// let tag = |next: Handler| -> Handler {
///     Arc::new(move |res, req| {
///         res.set_header("x-tag", "outer");
///         next(res, req)
///     })
/// };
/// let _mw: Arc<dyn Middleware> = Arc::new(tag);
/// ```
pub trait Middleware: Send + Sync {
    /// Build the handler that runs this middleware around `next`
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Compose middleware around a terminal handler using the onion model
///
/// `chain(&[m1, m2, m3], h)` yields `m1(m2(m3(h)))`: `m1` sees the request
/// first and the response last.
pub fn chain(middlewares: &[Arc<dyn Middleware>], terminal: Handler) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.wrap(next))
}
