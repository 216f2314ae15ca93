//! # CLI Module
//!
//! Command-line interface of the `starroute` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start a server with a `/health` endpoint and, optionally, a static file
//! tree under `/static` and a single-page app at `/`:
//!
//! ```bash
//! starroute serve --config starroute.yaml --static-dir ./public --webapp-dir ./web
//! ```
//!
//! SIGINT and SIGTERM stop the listener gracefully.
//!
//! ### `routes`
//!
//! Print the compiled route table in resolution order, for the same flags
//! `serve` accepts.
//!
//! ### `init-config`
//!
//! Write a commented default configuration file:
//!
//! ```bash
//! starroute init-config starroute.yaml
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{default_routes, run_cli, Cli, Commands, RouteArgs};
