//! # starroute
//!
//! **starroute** is a declarative request router and dispatcher for
//! coroutine-powered HTTP services built on `may_minihttp`.
//!
//! ## Overview
//!
//! Routes are declared as trees of [`RouteSpec`]s. Each node contributes a
//! path segment and may set a method, secret-key headers, middleware, a
//! request binding, and one terminal: a handler, a static file tree, a
//! single-page app, or a websocket endpoint. Children inherit what their
//! parents declare.
//!
//! At startup the trees are flattened and compiled into a [`Router`]:
//! templates such as `/users/{id:int}/posts/{slug?}` become anchored
//! regular expressions with typed capture groups, and routes are ordered so
//! exact paths win over patterns and longer patterns win over shorter ones.
//! Every configuration mistake is reported as a [`RouteConfigError`] before
//! the server accepts a connection.
//!
//! ## Architecture
//!
//! - **[`router`]** - path template compiler, typed parameters, route table
//! - **[`route`]** - route tree declaration, inheritance, request binding
//! - **[`dispatcher`]** - per-request flow: lookup, checks, parameters, binding
//! - **[`middleware`]** - onion-model middleware and the built-in set
//! - **[`handlers`]** - static files, uploads, single-page apps, websockets
//! - **[`server`]** - request/response contexts and the transport adapter
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]** - ambient setup
//!
//! ### Request Flow
//!
//! ```text
//! may_minihttp ──► AppService ──► Dispatcher
//!                                   │
//!                                   ├─ RecoveryMiddleware (panics, error bodies)
//!                                   ├─ global middleware (access log, CORS, rate limit, ...)
//!                                   ├─ lookup ─► 404 / 405 / 401
//!                                   ├─ typed parameters ─► 400
//!                                   ├─ binding + validation ─► 400
//!                                   └─ route middleware ─► terminal handler
//! ```
//!
//! ## Example
//!
//! ```
//! use starroute::{App, Request, RouteSpec};
//! use http::Method;
//!
//! let api = RouteSpec::new("/api")
//!     .secret_key("x-api-key", "s3cret")
//!     .child(RouteSpec::new("/users/{id:int}").get().handler(|res, req| {
//!         let id = req.param_i64("id").unwrap_or_default();
//!         res.json(&serde_json::json!({ "id": id }));
//!         Ok(())
//!     }));
//!
//! let dispatcher = App::new().route(api).build().unwrap();
//!
//! let mut req = Request::new(Method::GET, "/api/users/7").with_header("x-api-key", "s3cret");
//! let res = dispatcher.dispatch(&mut req);
//! assert_eq!(res.status(), 200);
//! assert_eq!(res.body_text(), r#"{"id":7}"#);
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod route;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use app::App;
pub use config::AppConfig;
pub use dispatcher::Dispatcher;
pub use errors::{RouteConfigError, RouteError};
pub use handlers::{
    handler, parse_size, DownloadConfig, Handler, HandlerResult, StaticConfig, UploadConfig,
    WebappConfig, WebsocketConn, WebsocketUpgrader,
};
pub use ids::RequestId;
pub use middleware::Middleware;
pub use route::{Binding, RouteSpec, Validate};
pub use router::{ParamType, ParamValue, Router};
pub use server::{Request, Response};
