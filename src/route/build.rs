use super::types::RouteSpec;
use crate::errors::RouteConfigError;
use crate::handlers::{static_server, webapp_server, websocket_handler, HandshakeUpgrader};
use crate::middleware::{chain, Middleware};
use crate::router::{compile_path, join_paths, CompiledRoute, RouteKind};
use http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings a node hands down to its children
#[derive(Clone, Default)]
struct Inherited {
    path: String,
    method: Option<Method>,
    secret_keys: BTreeMap<String, String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Compile a route tree into table entries, depth-first
///
/// Each node's full path is its parent's normalized path joined with its
/// own. Method, secret keys and middleware are inherited: the node's own
/// method wins over the parent's, its own keys override same-named parent
/// keys, and parent middleware wraps the node's own.
///
/// # Errors
///
/// - [`RouteConfigError::StaticAndWebapp`] when a node sets both
/// - [`RouteConfigError::EmptyRoute`] for a node that serves nothing
/// - any template compilation error
pub fn build_route_table(specs: Vec<RouteSpec>) -> Result<Vec<CompiledRoute>, RouteConfigError> {
    let mut out = Vec::new();
    let root = Inherited::default();
    for spec in specs {
        visit(spec, &root, &mut out)?;
    }
    Ok(out)
}

fn visit(
    mut spec: RouteSpec,
    parent: &Inherited,
    out: &mut Vec<CompiledRoute>,
) -> Result<(), RouteConfigError> {
    let full_path = join_paths(&parent.path, &spec.path);

    if spec.static_files.is_some() && spec.webapp.is_some() {
        return Err(RouteConfigError::StaticAndWebapp { path: full_path });
    }
    if spec.is_empty_leaf() {
        return Err(RouteConfigError::EmptyRoute { path: full_path });
    }

    let children = std::mem::take(&mut spec.children);

    let mut inherited = Inherited {
        path: full_path.clone(),
        method: spec.method.clone().or_else(|| parent.method.clone()),
        secret_keys: parent.secret_keys.clone(),
        middleware: parent.middleware.clone(),
    };
    inherited
        .secret_keys
        .extend(spec.secret_keys.iter().map(|(k, v)| (k.clone(), v.clone())));
    inherited.middleware.extend(spec.middleware.iter().cloned());

    let mut compiled = compile_path(&full_path)?;
    let (kind, terminal) = if let Some(webapp) = &spec.webapp {
        compiled = compiled.with_wildcard(true);
        (
            RouteKind::Webapp,
            Some(webapp_server(spec.handler.clone(), Arc::new(webapp.clone()))),
        )
    } else if let Some(files) = &spec.static_files {
        compiled = compiled.with_wildcard(files.allow_dir);
        (
            RouteKind::Static,
            Some(static_server(spec.handler.clone(), Arc::new(files.clone()))),
        )
    } else if let Some(handler) = &spec.handler {
        (RouteKind::Handler, Some(Arc::clone(handler)))
    } else {
        (RouteKind::Branch, None)
    };

    let (kind, terminal) = match (spec.websocket, terminal) {
        (true, Some(inner)) => {
            let upgrader = spec
                .websocket_upgrader
                .clone()
                .unwrap_or_else(|| Arc::new(HandshakeUpgrader::default()));
            let kind = if kind == RouteKind::Handler {
                RouteKind::Websocket
            } else {
                kind
            };
            (kind, Some(websocket_handler(inner, upgrader)))
        }
        (true, None) => {
            return Err(RouteConfigError::EmptyRoute { path: full_path });
        }
        (false, terminal) => (kind, terminal),
    };

    let regex = compiled.regex()?;
    let pipeline = terminal.map(|h| chain(&inherited.middleware, h));

    debug!(
        template = %compiled.template,
        key = %compiled.key,
        kind = %kind,
        params = compiled.params.len(),
        "Route compiled"
    );

    let serves_files = matches!(kind, RouteKind::Static | RouteKind::Webapp);
    out.push(CompiledRoute {
        path: compiled,
        regex,
        kind,
        method: inherited.method.clone(),
        secret_keys: inherited.secret_keys.clone(),
        middleware: inherited.middleware.clone(),
        binding: spec.binding.clone(),
        pipeline,
        origin: Arc::new(spec),
    });

    if serves_files {
        if !children.is_empty() {
            warn!(
                path = %full_path,
                ignored = children.len(),
                "Children of a static or webapp route are ignored"
            );
        }
        return Ok(());
    }

    for child in children {
        visit(child, &inherited, out)?;
    }
    Ok(())
}
