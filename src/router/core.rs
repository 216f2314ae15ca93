//! Route table and priority resolution.

use super::param::{ParamDescriptor, ParamVec, PathParam, FILEPATH_PARAM};
use super::path::CompiledPath;
use crate::errors::{RouteConfigError, RouteError};
use crate::handlers::Handler;
use crate::middleware::Middleware;
use crate::route::{build_route_table, Binding, RouteSpec};
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a compiled route serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Plain handler
    Handler,
    /// Static file server
    Static,
    /// Single-page app server
    Webapp,
    /// Websocket upgrade around a handler
    Websocket,
    /// Grouping node with children only; dispatching to it yields 404
    Branch,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteKind::Handler => "handler",
            RouteKind::Static => "static",
            RouteKind::Webapp => "webapp",
            RouteKind::Websocket => "websocket",
            RouteKind::Branch => "branch",
        })
    }
}

/// One entry of the route table
///
/// Everything a request needs after matching is resolved here at startup:
/// the effective method, merged secret keys, and the route middleware already
/// composed around the terminal handler.
pub struct CompiledRoute {
    pub(crate) path: CompiledPath,
    pub(crate) regex: Regex,
    pub(crate) kind: RouteKind,
    pub(crate) method: Option<Method>,
    pub(crate) secret_keys: BTreeMap<String, String>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) binding: Option<Binding>,
    pub(crate) pipeline: Option<Handler>,
    pub(crate) origin: Arc<RouteSpec>,
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("template", &self.path.template)
            .field("key", &self.path.key)
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("params", &self.path.params)
            .field("secret_keys", &self.secret_keys.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

impl CompiledRoute {
    /// Full path template (parent prefixes included)
    #[must_use]
    pub fn template(&self) -> &str {
        &self.path.template
    }

    /// Table key: the literal path for exact routes, the pattern otherwise
    #[must_use]
    pub fn key(&self) -> &str {
        &self.path.key
    }

    /// Anchored regex source
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.path.pattern
    }

    /// True for literal routes without parameters or wildcard
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.path.is_exact
    }

    /// What the route serves
    #[must_use]
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Effective method (own or inherited); `None` accepts any method
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Parameter descriptors in capture order
    #[must_use]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.path.params
    }

    /// Secret keys merged from ancestors (own keys win)
    #[must_use]
    pub fn secret_keys(&self) -> &BTreeMap<String, String> {
        &self.secret_keys
    }

    /// Number of route middleware, ancestors first
    #[must_use]
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Binding descriptor, if any
    #[must_use]
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// The definition this route was compiled from (children detached)
    #[must_use]
    pub fn origin(&self) -> &Arc<RouteSpec> {
        &self.origin
    }

    /// Handler with route middleware applied; `None` for branch nodes
    #[must_use]
    pub fn pipeline(&self) -> Option<&Handler> {
        self.pipeline.as_ref()
    }
}

/// Result of resolving a request path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route
    pub route: Arc<CompiledRoute>,
    /// Raw capture groups in order, `None` for groups that did not participate
    pub captures: SmallVec<[Option<String>; 8]>,
}

impl RouteMatch {
    /// Convert captures into typed parameters
    ///
    /// Missing captures take the descriptor default. A failed conversion of an
    /// optional parameter also falls back to the default; a failed required
    /// conversion is an error. Static and webapp routes get the remaining
    /// path as `__filepath__`.
    pub fn extract_params(&self) -> Result<ParamVec, RouteError> {
        let descriptors = self.route.params();
        let mut params = ParamVec::new();

        for (idx, desc) in descriptors.iter().enumerate() {
            let raw = self.captures.get(idx).and_then(|c| c.as_deref());
            let value = match raw {
                None => desc.default.clone(),
                Some(raw) => match desc.kind.convert(raw) {
                    Ok(value) => Some(value),
                    Err(reason) if desc.optional => {
                        debug!(
                            param = %desc.key,
                            value = raw,
                            reason = %reason,
                            "Optional parameter conversion failed, using default"
                        );
                        desc.default.clone()
                    }
                    Err(reason) => {
                        debug!(param = %desc.key, value = raw, reason = %reason, "Parameter conversion failed");
                        return Err(RouteError::ParamConversion {
                            key: desc.key.to_string(),
                            kind: desc.kind,
                            value: raw.to_string(),
                            optional: false,
                        });
                    }
                },
            };
            params.push(PathParam {
                key: Arc::clone(&desc.key),
                value,
            });
        }

        if self.route.path.has_wildcard {
            if let Some(Some(rest)) = self.captures.get(descriptors.len()) {
                params.push(PathParam {
                    key: Arc::from(FILEPATH_PARAM),
                    value: Some(super::ParamValue::Str(rest.clone())),
                });
            }
        }
        Ok(params)
    }
}

/// Immutable route table
///
/// Built once from the route tree and shared across all requests. Lookup
/// tries the path as an exact key first, then scans pattern routes in
/// priority order.
pub struct Router {
    routes: HashMap<String, Arc<CompiledRoute>>,
    priority: Vec<Arc<CompiledRoute>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.priority.len())
            .finish()
    }
}

/// Priority order: exact routes first, then longer keys, then lexicographic
fn priority_cmp(a: &CompiledRoute, b: &CompiledRoute) -> Ordering {
    b.path
        .is_exact
        .cmp(&a.path.is_exact)
        .then_with(|| b.path.key.len().cmp(&a.path.key.len()))
        .then_with(|| a.path.key.cmp(&b.path.key))
}

impl Router {
    /// Compile a route tree into a router
    ///
    /// # Errors
    ///
    /// Any [`RouteConfigError`] from compiling templates or building the table.
    pub fn new(specs: Vec<RouteSpec>) -> Result<Self, RouteConfigError> {
        Self::from_routes(build_route_table(specs)?)
    }

    /// Build a router from compiled routes
    ///
    /// A branch node whose key is reused by a serving route is replaced by
    /// it; any other key collision is an error.
    pub fn from_routes(routes: Vec<CompiledRoute>) -> Result<Self, RouteConfigError> {
        let mut table: HashMap<String, Arc<CompiledRoute>> = HashMap::with_capacity(routes.len());

        for route in routes {
            let key = route.path.key.clone();
            match table.get(&key) {
                Some(existing) if existing.kind == RouteKind::Branch => {
                    debug!(key = %key, "Serving route replaces branch node");
                }
                Some(_) if route.kind == RouteKind::Branch => {
                    debug!(key = %key, "Branch node shadowed by serving route");
                    continue;
                }
                Some(_) => {
                    return Err(RouteConfigError::DuplicateRoute {
                        key,
                        path: route.path.template.clone(),
                    });
                }
                None => {}
            }
            table.insert(key, Arc::new(route));
        }

        let mut priority: Vec<Arc<CompiledRoute>> = table.values().cloned().collect();
        priority.sort_by(|a, b| priority_cmp(a, b));

        info!(routes_count = priority.len(), "Route table built");
        Ok(Self {
            routes: table,
            priority,
        })
    }

    /// Number of routes in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.priority.len()
    }

    /// True when the table holds no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priority.is_empty()
    }

    /// Routes in resolution priority order
    pub fn routes(&self) -> impl Iterator<Item = &Arc<CompiledRoute>> {
        self.priority.iter()
    }

    /// Route stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<CompiledRoute>> {
        self.routes.get(key)
    }

    /// Resolve a request path to a route
    ///
    /// A trailing `/` is ignored (except for the root). Exact routes are
    /// found by direct lookup; pattern routes are tried in priority order
    /// and the first full match wins. File-serving routes also try the root
    /// path with its slash stripped, so a static tree mounted at `/` still
    /// owns `/`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = normalize_request_path(path);

        if let Some(route) = self.routes.get(path) {
            if route.path.is_exact {
                debug!(path, template = %route.path.template, "Exact route matched");
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    captures: SmallVec::new(),
                });
            }
        }

        for route in &self.priority {
            let caps = route.regex.captures(path).or_else(|| {
                if path == "/" && route.path.has_wildcard {
                    route.regex.captures("")
                } else {
                    None
                }
            });
            if let Some(caps) = caps {
                let captures = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect();
                debug!(path, template = %route.path.template, "Pattern route matched");
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    captures,
                });
            }
        }

        warn!(path, "No route matched");
        None
    }

    /// Log the table in priority order
    pub fn dump_routes(&self) {
        info!(routes_count = self.priority.len(), "Route table");
        for (idx, route) in self.priority.iter().enumerate() {
            info!(
                priority = idx,
                method = route.method.as_ref().map_or("ANY", |m| m.as_str()),
                kind = %route.kind,
                template = %route.path.template,
                pattern = %route.path.pattern,
                "Route"
            );
        }
    }
}

/// Strip one trailing `/` (the root path stays `/`)
#[must_use]
pub fn normalize_request_path(path: &str) -> &str {
    if path.is_empty() {
        return "/";
    }
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}
