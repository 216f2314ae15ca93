//! Request/response contexts and the may_minihttp transport adapter.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{is_private_ip, parse_cookies, parse_request, Body, HeaderVec, Request};
pub use response::{status_reason, Response};
pub use service::{write_response, AppService};
