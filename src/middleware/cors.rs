use super::Middleware;
use crate::errors::RouteConfigError;
use crate::handlers::Handler;
use http::Method;
use std::sync::Arc;
use tracing::debug;

/// How the `Origin` header is checked
#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginPolicy {
    /// Empty list, or `*` anywhere in it: every origin is allowed
    Any,
    /// Only listed origins
    Exact(Vec<String>),
}

/// CORS (Cross-Origin Resource Sharing) middleware
///
/// Allowed origins are echoed back in `Access-Control-Allow-Origin` together
/// with the configured methods, headers, credentials flag and max-age.
/// Every `OPTIONS` request is answered with `200` without reaching the
/// route, so preflights work even for paths that do not exist.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: OriginPolicy,
    allowed_methods: String,
    allowed_headers: String,
    allow_credentials: bool,
    max_age: u32,
}

impl CorsMiddleware {
    /// Create CORS middleware for an allow-list
    ///
    /// An empty list or a list containing `*` allows every origin.
    /// Otherwise each entry must look like `scheme://host[:port]`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteConfigError::InvalidCorsOrigin`] for a malformed entry.
    ///
    /// # Example
    ///
    /// ```
    /// use starroute::middleware::CorsMiddleware;
    ///
    /// let cors = CorsMiddleware::new(&["https://app.example.com"]).unwrap();
    /// assert!(cors.is_allowed("https://app.example.com"));
    /// assert!(!cors.is_allowed("https://evil.example.com"));
    /// ```
    pub fn new<S: AsRef<str>>(allowed_origins: &[S]) -> Result<Self, RouteConfigError> {
        let wildcard = allowed_origins.iter().any(|o| o.as_ref().trim() == "*");
        let origins = match allowed_origins {
            [] => OriginPolicy::Any,
            _ if wildcard => OriginPolicy::Any,
            _ => {
                let mut exact = Vec::with_capacity(allowed_origins.len());
                for origin in allowed_origins {
                    let origin = origin.as_ref().trim().trim_end_matches('/');
                    if !looks_like_origin(origin) {
                        return Err(RouteConfigError::InvalidCorsOrigin {
                            origin: origin.to_string(),
                        });
                    }
                    exact.push(origin.to_string());
                }
                OriginPolicy::Exact(exact)
            }
        };
        Ok(Self {
            origins,
            allowed_methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            allowed_headers: "Content-Type, Authorization".to_string(),
            allow_credentials: true,
            max_age: 86400,
        })
    }

    /// Replace the advertised methods
    #[must_use]
    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        self
    }

    /// Replace the advertised request headers
    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.join(", ");
        self
    }

    /// Toggle `Access-Control-Allow-Credentials`
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Preflight cache lifetime in seconds
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    /// Whether `origin` passes the allow-list
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match &self.origins {
            OriginPolicy::Any => true,
            OriginPolicy::Exact(list) => list.iter().any(|o| o == origin),
        }
    }
}

fn looks_like_origin(origin: &str) -> bool {
    match origin.split_once("://") {
        Some((scheme, host)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
                && !host.is_empty()
                && !host.contains('/')
        }
        None => false,
    }
}

impl Middleware for CorsMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let cors = self.clone();
        Arc::new(move |res, req| {
            if let Some(origin) = req.header("origin").filter(|o| !o.is_empty()) {
                if cors.is_allowed(origin) {
                    res.set_header("access-control-allow-origin", origin);
                    res.set_header("access-control-allow-methods", cors.allowed_methods.as_str());
                    res.set_header("access-control-allow-headers", cors.allowed_headers.as_str());
                    if cors.allow_credentials {
                        res.set_header("access-control-allow-credentials", "true");
                    }
                    res.set_header("access-control-max-age", cors.max_age.to_string());
                    res.add_header("vary", "Origin");
                } else {
                    debug!(origin, "CORS origin rejected");
                }
            }

            if *req.method() == Method::OPTIONS {
                res.write_header(200);
                return Ok(());
            }
            next(res, req)
        })
    }
}
