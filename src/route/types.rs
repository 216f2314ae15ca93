use super::binding::Binding;
use crate::errors::RouteConfigError;
use crate::handlers::{
    Handler, HandlerResult, StaticConfig, WebappConfig, WebsocketUpgrader,
};
use crate::middleware::Middleware;
use crate::server::{Request, Response};
use http::Method;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Declarative route definition
///
/// A tree of `RouteSpec`s is compiled once at startup into the route table.
/// Children inherit the parent's path prefix, method, secret keys and
/// middleware.
///
/// # Example
///
/// ```
/// use starroute::RouteSpec;
///
/// let api = RouteSpec::new("/api")
///     .secret_key("x-api-key", "s3cret")
///     .child(RouteSpec::new("/user/{id:int}").get().handler(|res, req| {
///         let id = req.param_i64("id").unwrap_or_default();
///         res.json(&serde_json::json!({ "id": id }));
///         Ok(())
///     }));
/// ```
#[derive(Clone, Default)]
pub struct RouteSpec {
    /// Required method; inherited from the nearest ancestor when unset
    pub method: Option<Method>,
    /// Path template, relative to the parent
    pub path: String,
    /// Header name → exact value required on every request
    pub secret_keys: BTreeMap<String, String>,
    /// Terminal handler (or pre-handler for static/webapp routes)
    pub handler: Option<Handler>,
    /// Nested routes
    pub children: Vec<RouteSpec>,
    /// Route-specific middleware, wrapped inside the global stack
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Perform a websocket upgrade before the handler
    pub websocket: bool,
    /// Custom upgrader; the handshake upgrader is used when unset
    pub websocket_upgrader: Option<Arc<dyn WebsocketUpgrader>>,
    /// Serve files under a directory
    pub static_files: Option<StaticConfig>,
    /// Serve a single-page app
    pub webapp: Option<WebappConfig>,
    /// Decode and validate the body or query before the handler
    pub binding: Option<Binding>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("secret_keys", &self.secret_keys.keys().collect::<Vec<_>>())
            .field("handler", &self.handler.is_some())
            .field("children", &self.children)
            .field("middleware", &self.middleware.len())
            .field("websocket", &self.websocket)
            .field("static_files", &self.static_files)
            .field("webapp", &self.webapp)
            .field("binding", &self.binding)
            .finish()
    }
}

impl RouteSpec {
    /// Start a route at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Restrict the route to `method`
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Restrict the route to a method given by name
    ///
    /// # Errors
    ///
    /// Returns [`RouteConfigError::InvalidMethod`] for a malformed token.
    pub fn method_name(self, method: &str) -> Result<Self, RouteConfigError> {
        let parsed = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteConfigError::InvalidMethod {
                method: method.to_string(),
            })?;
        Ok(self.method(parsed))
    }

    /// Shorthand for `.method(Method::GET)`
    #[must_use]
    pub fn get(self) -> Self {
        self.method(Method::GET)
    }

    /// Shorthand for `.method(Method::POST)`
    #[must_use]
    pub fn post(self) -> Self {
        self.method(Method::POST)
    }

    /// Shorthand for `.method(Method::PUT)`
    #[must_use]
    pub fn put(self) -> Self {
        self.method(Method::PUT)
    }

    /// Shorthand for `.method(Method::PATCH)`
    #[must_use]
    pub fn patch(self) -> Self {
        self.method(Method::PATCH)
    }

    /// Shorthand for `.method(Method::DELETE)`
    #[must_use]
    pub fn delete(self) -> Self {
        self.method(Method::DELETE)
    }

    /// Set the handler
    #[must_use]
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Response, &mut Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(f));
        self
    }

    /// Set an already shared handler
    #[must_use]
    pub fn shared_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Serve files from a directory below this path
    #[must_use]
    pub fn static_files(mut self, config: StaticConfig) -> Self {
        self.static_files = Some(config);
        self
    }

    /// Serve a single-page app below this path
    #[must_use]
    pub fn webapp(mut self, config: WebappConfig) -> Self {
        self.webapp = Some(config);
        self
    }

    /// Upgrade websocket requests with the handshake upgrader
    #[must_use]
    pub fn websocket(mut self) -> Self {
        self.websocket = true;
        self
    }

    /// Upgrade websocket requests with a custom upgrader
    #[must_use]
    pub fn websocket_with(mut self, upgrader: Arc<dyn WebsocketUpgrader>) -> Self {
        self.websocket = true;
        self.websocket_upgrader = Some(upgrader);
        self
    }

    /// Add a child route
    #[must_use]
    pub fn child(mut self, child: RouteSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Add several child routes
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = RouteSpec>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append a route-level middleware
    #[must_use]
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append an already shared middleware
    #[must_use]
    pub fn shared_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Require header `name` to equal `value`
    #[must_use]
    pub fn secret_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_keys.insert(name.into(), value.into());
        self
    }

    /// Decode and validate a model before the handler runs
    #[must_use]
    pub fn bind(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// True when the node serves nothing itself and has no children
    pub(crate) fn is_empty_leaf(&self) -> bool {
        self.handler.is_none()
            && self.children.is_empty()
            && self.static_files.is_none()
            && self.webapp.is_none()
            && !self.websocket
    }
}
