//! # Dispatcher Module
//!
//! The dispatcher is the single entry point for every request. It resolves
//! the route, validates the method and secret keys, extracts typed path
//! parameters, binds the request model, and runs the middleware chain around
//! the route's terminal handler.
//!
//! ## Request Flow
//!
//! 1. Recovery supervisor catches panics and renders errors
//! 2. Global middleware (access log, CORS, rate limit, user middleware)
//! 3. Route lookup by exact key, then by pattern in priority order
//! 4. Method check (405) and secret-key check (401)
//! 5. Parameter conversion (400 for a failed required parameter)
//! 6. Optional binding and validation (400)
//! 7. Route middleware and terminal handler
//!
//! ## Error Handling
//!
//! Failures travel back up as [`crate::RouteError`]; the recovery supervisor
//! turns them into `{"error": ..., "status": ...}` bodies unless a response
//! was already written. Handlers run inline on the connection's coroutine,
//! so a panic is contained to its own request.

mod core;

pub use core::Dispatcher;
