//! Error taxonomy for route configuration and request dispatch.
//!
//! Two families exist:
//!
//! - [`RouteConfigError`] is raised while compiling the route table. Every
//!   variant is fatal: the server never starts with a broken table.
//! - [`RouteError`] is raised while handling a single request. Each variant
//!   maps to exactly one HTTP status and renders as a JSON error body.

use crate::router::ParamType;
use http::Method;
use serde_json::{json, Value};
use std::fmt;

/// Route table construction error
///
/// Returned by [`crate::route::build_route_table`] and surfaced at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteConfigError {
    /// A path template could not be tokenized (unbalanced braces, empty name)
    MalformedTemplate {
        /// The offending template
        template: String,
        /// What was wrong with it
        reason: String,
    },
    /// A three-part token named a type that does not exist
    UnknownParamType {
        /// The offending template
        template: String,
        /// Parameter name
        param: String,
        /// The unrecognized type name
        kind: String,
    },
    /// A default value did not fully match the type's sub-pattern or failed conversion
    InvalidDefault {
        /// The offending template
        template: String,
        /// Parameter name
        param: String,
        /// Declared parameter type
        kind: ParamType,
        /// The default as written
        value: String,
    },
    /// A route declared both static and webapp serving
    StaticAndWebapp {
        /// Full path of the route
        path: String,
    },
    /// A route has no handler, no children, and serves nothing
    EmptyRoute {
        /// Full path of the route
        path: String,
    },
    /// Two routes compiled to the same table key
    DuplicateRoute {
        /// The colliding key
        key: String,
        /// Full path of the second route
        path: String,
    },
    /// The compiled pattern was rejected by the regex engine
    InvalidPattern {
        /// The generated pattern
        pattern: String,
        /// Regex engine message
        message: String,
    },
    /// A method name could not be parsed as an HTTP method
    InvalidMethod {
        /// The method as written
        method: String,
    },
    /// The CORS allow-list contains an entry that is neither `*` nor an origin
    InvalidCorsOrigin {
        /// The offending entry
        origin: String,
    },
    /// A rate limit was configured with an empty window
    InvalidRateLimit {
        /// What was wrong with it
        reason: String,
    },
}

impl fmt::Display for RouteConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteConfigError::MalformedTemplate { template, reason } => {
                write!(f, "malformed path template '{template}': {reason}")
            }
            RouteConfigError::UnknownParamType {
                template,
                param,
                kind,
            } => write!(
                f,
                "unknown parameter type '{kind}' for '{param}' in '{template}' \
                (expected one of: str, int, float, bool, date)"
            ),
            RouteConfigError::InvalidDefault {
                template,
                param,
                kind,
                value,
            } => write!(
                f,
                "default '{value}' for '{param}' in '{template}' is not a valid {kind}"
            ),
            RouteConfigError::StaticAndWebapp { path } => {
                write!(f, "route '{path}' cannot be both static and webapp")
            }
            RouteConfigError::EmptyRoute { path } => write!(
                f,
                "route '{path}' has no handler, no children and serves no files"
            ),
            RouteConfigError::DuplicateRoute { key, path } => {
                write!(f, "route '{path}' collides with an existing route on key '{key}'")
            }
            RouteConfigError::InvalidPattern { pattern, message } => {
                write!(f, "compiled pattern '{pattern}' is invalid: {message}")
            }
            RouteConfigError::InvalidMethod { method } => {
                write!(f, "'{method}' is not a valid HTTP method")
            }
            RouteConfigError::InvalidCorsOrigin { origin } => write!(
                f,
                "CORS origin '{origin}' must be '*' or scheme://host[:port]"
            ),
            RouteConfigError::InvalidRateLimit { reason } => {
                write!(f, "invalid rate limit: {reason}")
            }
        }
    }
}

impl std::error::Error for RouteConfigError {}

/// Per-request failure
///
/// Handlers and middleware return these through [`crate::HandlerResult`].
/// The recovery supervisor renders any error that reaches it with
/// [`RouteError::to_json`], unless a response was already written.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    /// No route matched the request path
    NotFound {
        /// Request path
        path: String,
    },
    /// A route matched but is bound to another method
    MethodNotAllowed {
        /// Request method
        method: Method,
        /// Method the route accepts
        allowed: Method,
    },
    /// A required secret header was missing or wrong
    Unauthorized {
        /// Header that failed the check
        header: String,
    },
    /// Access refused (disallowed file type, size limit, traversal attempt)
    Forbidden {
        /// Why access was refused
        reason: String,
    },
    /// Request could not be understood
    BadRequest {
        /// Detail for the client
        message: String,
    },
    /// Bound model failed to decode or validate
    ValidationFailed {
        /// Decoder or validator message
        message: String,
    },
    /// A captured path parameter failed type conversion
    ParamConversion {
        /// Parameter name
        key: String,
        /// Declared parameter type
        kind: ParamType,
        /// Raw captured text
        value: String,
        /// Whether the parameter was optional (optional failures fall back to defaults)
        optional: bool,
    },
    /// Sliding-window limit exceeded
    RateLimited {
        /// Limiter key (client ips joined with the path)
        key: String,
        /// Requests allowed per window
        limit: usize,
    },
    /// A handler panicked and was recovered
    Panic {
        /// Panic payload text
        message: String,
        /// Captured stack, only in debug mode
        backtrace: Option<String>,
    },
    /// The transport cannot provide what the route needs
    NotImplemented {
        /// Missing capability
        feature: String,
    },
    /// Unexpected server-side failure
    Internal {
        /// Detail for logs and client
        message: String,
    },
}

impl RouteError {
    /// Shorthand for [`RouteError::Internal`]
    pub fn internal(message: impl Into<String>) -> Self {
        RouteError::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for [`RouteError::BadRequest`]
    pub fn bad_request(message: impl Into<String>) -> Self {
        RouteError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for [`RouteError::Forbidden`]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        RouteError::Forbidden {
            reason: reason.into(),
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            RouteError::NotFound { .. } => 404,
            RouteError::MethodNotAllowed { .. } => 405,
            RouteError::Unauthorized { .. } => 401,
            RouteError::Forbidden { .. } => 403,
            RouteError::BadRequest { .. }
            | RouteError::ValidationFailed { .. }
            | RouteError::ParamConversion { .. } => 400,
            RouteError::RateLimited { .. } => 429,
            RouteError::Panic { .. } | RouteError::Internal { .. } => 500,
            RouteError::NotImplemented { .. } => 501,
        }
    }

    /// Client-facing message
    ///
    /// Panics and internal failures do not leak their payload here; the
    /// payload is logged, and in debug mode a panic's travels in the `stack` field.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            RouteError::NotFound { .. } => "Not Found".to_string(),
            RouteError::MethodNotAllowed { .. } => "Method Not Allowed".to_string(),
            RouteError::Unauthorized { .. } => "Unauthorized".to_string(),
            RouteError::RateLimited { .. } => "Rate limit exceeded".to_string(),
            RouteError::Panic { .. } | RouteError::Internal { .. } => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Render the JSON error body
    ///
    /// Produces `{"error": "...", "status": N}`. In debug mode panics also
    /// carry the captured stack under `"stack"`.
    #[must_use]
    pub fn to_json(&self, debug: bool) -> Value {
        let mut body = json!({
            "error": self.public_message(),
            "status": self.status(),
        });
        if debug {
            if let RouteError::Panic {
                message,
                backtrace: Some(stack),
            } = self
            {
                body["panic"] = Value::String(message.clone());
                body["stack"] = Value::String(stack.clone());
            }
        }
        body
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::NotFound { path } => write!(f, "no route matches '{path}'"),
            RouteError::MethodNotAllowed { method, allowed } => {
                write!(f, "method {method} not allowed, route accepts {allowed}")
            }
            RouteError::Unauthorized { header } => {
                write!(f, "missing or invalid secret header '{header}'")
            }
            RouteError::Forbidden { reason } => write!(f, "{reason}"),
            RouteError::BadRequest { message } => write!(f, "{message}"),
            RouteError::ValidationFailed { message } => write!(f, "validation failed: {message}"),
            RouteError::ParamConversion {
                key, kind, value, ..
            } => write!(f, "parameter '{key}' value '{value}' is not a valid {kind}"),
            RouteError::RateLimited { key, limit } => {
                write!(f, "rate limit of {limit} exceeded for '{key}'")
            }
            RouteError::Panic { message, .. } => write!(f, "handler panicked: {message}"),
            RouteError::NotImplemented { feature } => write!(f, "{feature} is not supported"),
            RouteError::Internal { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RouteError {}

impl From<std::io::Error> for RouteError {
    fn from(err: std::io::Error) -> Self {
        RouteError::internal(err.to_string())
    }
}
