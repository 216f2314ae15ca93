//! Integration tests for single-page app routes

mod common;

use common::requests::send;
use http::Method;
use starroute::{App, Dispatcher, RouteSpec, WebappConfig};
use std::fs;
use tempfile::TempDir;

fn app_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<div id=app></div>").unwrap();
    fs::create_dir(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("assets/main.js"), "boot()").unwrap();
    dir
}

fn mount(config: WebappConfig) -> Dispatcher {
    App::new()
        .route(RouteSpec::new("/api/ping").get().handler(|res, _| {
            res.text("pong");
            Ok(())
        }))
        .route(RouteSpec::new("/").get().webapp(config))
        .build()
        .unwrap()
}

#[test]
fn test_index_and_assets() {
    let dir = app_dir();
    let dispatcher = mount(WebappConfig::new(dir.path()));

    let res = send(&dispatcher, Method::GET, "/");
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "<div id=app></div>");
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));

    let res = send(&dispatcher, Method::GET, "/assets/main.js");
    assert_eq!(res.body_text(), "boot()");
    assert_eq!(
        res.header("content-type"),
        Some("application/javascript; charset=utf-8")
    );
}

#[test]
fn test_client_routes_fall_back_to_index() {
    let dir = app_dir();
    let dispatcher = mount(WebappConfig::new(dir.path()));

    let res = send(&dispatcher, Method::GET, "/settings/profile");
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "<div id=app></div>");

    // Other routes still win over the catch-all
    assert_eq!(send(&dispatcher, Method::GET, "/api/ping").body_text(), "pong");
}

#[test]
fn test_disable_spa_returns_404() {
    let dir = app_dir();
    let dispatcher = mount(WebappConfig::new(dir.path()).disable_spa());

    assert_eq!(send(&dispatcher, Method::GET, "/settings").status(), 404);
    assert_eq!(send(&dispatcher, Method::GET, "/").status(), 200);
}

#[test]
fn test_separate_assets_root() {
    let dir = app_dir();
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("logo.svg"), "<svg/>").unwrap();
    let dispatcher = mount(WebappConfig::new(dir.path()).assets_root(assets.path()));

    let res = send(&dispatcher, Method::GET, "/logo.svg");
    assert_eq!(res.body_text(), "<svg/>");
    assert_eq!(res.header("content-type"), Some("image/svg+xml"));
}

#[test]
fn test_missing_index_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = mount(WebappConfig::new(dir.path()).index("app.html"));
    assert_eq!(send(&dispatcher, Method::GET, "/").status(), 404);
}
