//! Onion-model middleware and the built-in middleware set.
//!
//! Middleware declared first wraps outermost: it sees the request first and
//! the response last. Global middleware always wraps route middleware, and
//! [`RecoveryMiddleware`] is installed outside everything by the dispatcher.

mod access_log;
mod core;
mod cors;
mod rate_limit;
mod recovery;

pub use access_log::{describe_client, AccessLogMiddleware};
pub use core::{chain, Middleware};
pub use cors::CorsMiddleware;
pub use rate_limit::{RateLimitMiddleware, RateLimiter};
pub use recovery::{panic_message, RecoveryMiddleware};
