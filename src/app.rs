//! Application builder tying routes, global middleware and the server together.

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::RouteConfigError;
use crate::middleware::{AccessLogMiddleware, CorsMiddleware, Middleware, RateLimitMiddleware};
use crate::route::RouteSpec;
use crate::router::Router;
use crate::runtime_config::RuntimeConfig;
use crate::server::{AppService, HttpServer, ServerHandle};
use anyhow::Context;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Route trees plus global settings, turned into a [`Dispatcher`] by [`App::build`]
///
/// # Example
///
/// ```
/// use starroute::{App, RouteSpec};
///
/// let dispatcher = App::new()
///     .route(RouteSpec::new("/health").get().handler(|res, _req| {
///         res.text("ok");
///         Ok(())
///     }))
///     .build()
///     .unwrap();
/// assert_eq!(dispatcher.router().len(), 1);
/// ```
#[derive(Default)]
pub struct App {
    bind: String,
    debug: bool,
    routes: Vec<RouteSpec>,
    middlewares: Vec<Arc<dyn Middleware>>,
    secret_keys: BTreeMap<String, String>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("bind", &self.bind)
            .field("debug", &self.debug)
            .field("routes", &self.routes.len())
            .field("middlewares", &self.middlewares.len())
            .field("secret_keys", &self.secret_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl App {
    /// Empty application without global middleware
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind: AppConfig::default().bind,
            ..Self::default()
        }
    }

    /// Application with the default global stack for `config`
    ///
    /// Installs access logging, then CORS for the configured origins, then
    /// the rate limiter when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`RouteConfigError::InvalidCorsOrigin`] for a malformed origin
    /// and [`RouteConfigError::InvalidRateLimit`] for a zero `per_ms`.
    pub fn from_config(config: &AppConfig) -> Result<Self, RouteConfigError> {
        let mut app = Self::new()
            .bind(config.bind.clone())
            .debug(config.debug)
            .middleware(AccessLogMiddleware)
            .middleware(CorsMiddleware::new(&config.allowed_origins[..])?);
        if let Some(limit) = config.rate_limit {
            app = app.middleware(RateLimitMiddleware::new(limit.requests, limit.window())?);
        }
        for (name, value) in &config.secret_keys {
            app = app.secret_key(name.clone(), value.clone());
        }
        Ok(app)
    }

    /// Listen address used by [`App::serve`]
    #[must_use]
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind = addr.into();
        self
    }

    /// Include panic details in 500 responses
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Add a route tree
    #[must_use]
    pub fn route(mut self, route: RouteSpec) -> Self {
        self.routes.push(route);
        self
    }

    /// Add several route trees
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteSpec>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Append a global middleware; earlier ones wrap later ones
    #[must_use]
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Require header `name` to equal `value` on every route
    #[must_use]
    pub fn secret_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_keys.insert(name.into(), value.into());
        self
    }

    /// Compile the route trees and compose the dispatcher
    ///
    /// # Errors
    ///
    /// Any route configuration error, see [`RouteConfigError`].
    pub fn build(self) -> Result<Dispatcher, RouteConfigError> {
        let router = Router::new(self.routes)?;
        info!(routes = router.len(), "Route table compiled");
        let mut dispatcher = Dispatcher::new(Arc::new(router));
        dispatcher.set_debug(self.debug);
        for (name, value) in self.secret_keys {
            dispatcher.add_secret_key(name, value);
        }
        for middleware in self.middlewares {
            dispatcher.add_middleware(middleware);
        }
        Ok(dispatcher)
    }

    /// Build and start listening on the configured address
    ///
    /// # Errors
    ///
    /// Route configuration errors, or failure to bind the address.
    pub fn serve(self) -> anyhow::Result<ServerHandle> {
        let bind = self.bind.clone();
        let dispatcher = self.build().context("invalid route configuration")?;
        RuntimeConfig::from_env().apply();
        let service = AppService::new(Arc::new(dispatcher));
        HttpServer(service)
            .start(bind.as_str())
            .with_context(|| format!("binding {bind}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    #[test]
    fn test_from_config_installs_global_stack() {
        let mut config = AppConfig::default();
        config.rate_limit = Some(RateLimitConfig {
            requests: 10,
            per_ms: 1000,
        });
        config.secret_keys.insert("x-key".into(), "v".into());
        let app = App::from_config(&config).unwrap();
        assert_eq!(app.middlewares.len(), 3);
        assert_eq!(app.secret_keys.len(), 1);
        assert_eq!(app.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_from_config_rejects_bad_origin() {
        let config = AppConfig {
            allowed_origins: vec!["not an origin".into()],
            ..AppConfig::default()
        };
        assert!(matches!(
            App::from_config(&config),
            Err(RouteConfigError::InvalidCorsOrigin { .. })
        ));
    }

    #[test]
    fn test_from_config_rejects_zero_window() {
        let config = AppConfig {
            rate_limit: Some(RateLimitConfig {
                requests: 10,
                per_ms: 0,
            }),
            ..AppConfig::default()
        };
        assert!(matches!(
            App::from_config(&config),
            Err(RouteConfigError::InvalidRateLimit { .. })
        ));
    }

    #[test]
    fn test_build_reports_route_errors() {
        let result = App::new()
            .route(RouteSpec::new("/a/{id:nope:1}").handler(|_, _| Ok(())))
            .build();
        assert!(matches!(result, Err(RouteConfigError::UnknownParamType { .. })));
    }
}
