use crate::errors::RouteError;
use crate::handlers::{Handler, HandlerResult};
use crate::middleware::{chain, Middleware, RecoveryMiddleware};
use crate::router::{CompiledRoute, Router};
use crate::server::{Request, Response};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// State the per-request core needs: the table and the global secret keys
struct DispatchCore {
    router: Arc<Router>,
    secret_keys: BTreeMap<String, String>,
}

impl DispatchCore {
    /// Lookup → method check → auth → params → bind → route pipeline
    fn handle(&self, res: &mut Response, req: &mut Request) -> HandlerResult {
        let started = Instant::now();
        let Some(matched) = self.router.resolve(req.path()) else {
            return Err(RouteError::NotFound {
                path: req.path().to_string(),
            });
        };
        let route = Arc::clone(&matched.route);

        if let Some(allowed) = route.method() {
            if allowed != req.method() {
                debug!(
                    method = %req.method(),
                    allowed = %allowed,
                    template = %route.template(),
                    "Method not allowed"
                );
                return Err(RouteError::MethodNotAllowed {
                    method: req.method().clone(),
                    allowed: allowed.clone(),
                });
            }
        }

        self.check_secret_keys(&route, req)?;

        let params = matched.extract_params()?;
        req.set_params(params);

        if let Some(binding) = route.binding() {
            if binding.applies_to(req.method()) {
                let model = binding.bind(req)?;
                debug!(model = binding.model(), "Request model bound");
                req.set_bound(model);
            }
        }

        debug!(
            template = %route.template(),
            kind = %route.kind(),
            resolve_us = started.elapsed().as_micros() as u64,
            "Dispatching"
        );

        match route.pipeline() {
            Some(pipeline) => pipeline(res, req),
            None => Err(RouteError::NotFound {
                path: req.path().to_string(),
            }),
        }
    }

    /// Global keys are checked first, skipping names the route redefines;
    /// then the route's own (inherited) keys.
    fn check_secret_keys(&self, route: &CompiledRoute, req: &Request) -> Result<(), RouteError> {
        let global = self
            .secret_keys
            .iter()
            .filter(|(name, _)| !route.secret_keys().contains_key(*name));
        for (name, expected) in global.chain(route.secret_keys().iter()) {
            if req.header(name) != Some(expected.as_str()) {
                warn!(
                    header = %name,
                    template = %route.template(),
                    "Secret key check failed"
                );
                return Err(RouteError::Unauthorized {
                    header: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Single entry point for every request
///
/// Composition, from the outside in:
///
/// 1. [`RecoveryMiddleware`] (always outermost)
/// 2. global middleware in registration order
/// 3. the dispatch core: lookup, method and secret-key checks, parameter
///    extraction, binding
/// 4. the route's own middleware and terminal handler (composed at build time)
///
/// Global middleware wraps the lookup too, so CORS preflights and rate limits
/// apply to unknown paths as well.
pub struct Dispatcher {
    router: Arc<Router>,
    middlewares: Vec<Arc<dyn Middleware>>,
    secret_keys: BTreeMap<String, String>,
    debug: bool,
    entry: Handler,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("middlewares", &self.middlewares.len())
            .field("secret_keys", &self.secret_keys.keys().collect::<Vec<_>>())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over `router` with no global middleware
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        let mut dispatcher = Self {
            router,
            middlewares: Vec::new(),
            secret_keys: BTreeMap::new(),
            debug: false,
            entry: Arc::new(|_, _| Ok(())),
        };
        dispatcher.rebuild();
        dispatcher
    }

    fn rebuild(&mut self) {
        let core = Arc::new(DispatchCore {
            router: Arc::clone(&self.router),
            secret_keys: self.secret_keys.clone(),
        });
        let terminal: Handler = Arc::new(move |res, req| core.handle(res, req));
        let global = chain(&self.middlewares, terminal);
        self.entry = RecoveryMiddleware::new(self.debug).wrap(global);
    }

    /// Append a global middleware (wraps everything registered after it)
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
        self.rebuild();
    }

    /// Require header `name` to equal `value` on every route
    ///
    /// A route defining the same header name overrides the global value.
    pub fn add_secret_key(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secret_keys.insert(name.into(), value.into());
        self.rebuild();
    }

    /// Include panic backtraces in error responses
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        self.rebuild();
    }

    /// Whether debug responses are enabled
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// The route table
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Handle one request and return the buffered response
    ///
    /// Never fails: every error is rendered into the response.
    pub fn dispatch(&self, req: &mut Request) -> Response {
        let mut res = Response::new();
        if let Err(err) = (self.entry)(&mut res, req) {
            res.write_error(&err, self.debug);
        }
        res
    }
}
