//! Integration tests for the built-in middleware set
//!
//! - CORS origin echo, rejection and preflight short-circuit
//! - Rate limiting per client address and path
//! - Access logging leaves responses untouched
//! - The default global stack installed from configuration

mod common;

use common::requests::{body_json, send};
use http::Method;
use starroute::config::RateLimitConfig;
use starroute::middleware::{AccessLogMiddleware, CorsMiddleware, RateLimitMiddleware};
use starroute::{App, AppConfig, Request, RouteSpec};
use std::time::Duration;

fn hello() -> RouteSpec {
    RouteSpec::new("/hello").handler(|res, _| {
        res.text("hi");
        Ok(())
    })
}

#[test]
fn test_cors_echoes_allowed_origin() {
    let dispatcher = App::new()
        .middleware(CorsMiddleware::new(&["https://app.example.com"]).unwrap())
        .route(hello())
        .build()
        .unwrap();

    let mut req = Request::new(Method::GET, "/hello").with_header("Origin", "https://app.example.com");
    let res = dispatcher.dispatch(&mut req);
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.header("access-control-allow-origin"),
        Some("https://app.example.com")
    );
    assert_eq!(
        res.header("access-control-allow-methods"),
        Some("GET, POST, PUT, DELETE, OPTIONS")
    );
    assert_eq!(
        res.header("access-control-allow-headers"),
        Some("Content-Type, Authorization")
    );
    assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    assert_eq!(res.header("access-control-max-age"), Some("86400"));
    assert_eq!(res.header("vary"), Some("Origin"));
}

#[test]
fn test_cors_rejected_origin_gets_no_headers() {
    let dispatcher = App::new()
        .middleware(CorsMiddleware::new(&["https://app.example.com"]).unwrap())
        .route(hello())
        .build()
        .unwrap();

    let mut req = Request::new(Method::GET, "/hello").with_header("Origin", "https://evil.example.com");
    let res = dispatcher.dispatch(&mut req);
    assert_eq!(res.status(), 200);
    assert!(res.header("access-control-allow-origin").is_none());
}

#[test]
fn test_cors_wildcard_and_preflight() {
    let dispatcher = App::new()
        .middleware(CorsMiddleware::new(&["*"]).unwrap())
        .route(hello())
        .build()
        .unwrap();

    let mut req =
        Request::new(Method::OPTIONS, "/not-a-route").with_header("Origin", "http://localhost:3000");
    let res = dispatcher.dispatch(&mut req);
    assert_eq!(res.status(), 200);
    assert!(res.body().is_empty());
    assert_eq!(
        res.header("access-control-allow-origin"),
        Some("http://localhost:3000")
    );
}

#[test]
fn test_cors_wildcard_anywhere_in_list() {
    let cors = CorsMiddleware::new(&["https://a.example.com", "*"]).unwrap();
    assert!(cors.is_allowed("https://b.example.com"));

    let dispatcher = App::new().middleware(cors).route(hello()).build().unwrap();
    let mut req = Request::new(Method::GET, "/hello").with_header("Origin", "https://b.example.com");
    let res = dispatcher.dispatch(&mut req);
    assert_eq!(
        res.header("access-control-allow-origin"),
        Some("https://b.example.com")
    );
}

#[test]
fn test_cors_rejects_malformed_origin() {
    assert!(CorsMiddleware::new(&["https://ok.example.com", "ftp:/broken"]).is_err());
    assert!(CorsMiddleware::new::<&str>(&[]).unwrap().is_allowed("https://any.example"));
}

#[test]
fn test_rate_limit_per_client_and_path() {
    let dispatcher = App::new()
        .middleware(RateLimitMiddleware::new(2, Duration::from_secs(60)).unwrap())
        .route(hello())
        .route(RouteSpec::new("/other").handler(|_, _| Ok(())))
        .build()
        .unwrap();

    let from = |ip: &str, path: &str| {
        let mut req = Request::new(Method::GET, path).with_header("X-Forwarded-For", ip);
        dispatcher.dispatch(&mut req)
    };

    assert_eq!(from("8.8.8.8", "/hello").status(), 200);
    assert_eq!(from("8.8.8.8", "/hello").status(), 200);
    let limited = from("8.8.8.8", "/hello");
    assert_eq!(limited.status(), 429);
    assert_eq!(
        body_json(&limited),
        serde_json::json!({ "error": "Rate limit exceeded", "status": 429 })
    );

    assert_eq!(from("1.1.1.1", "/hello").status(), 200);
    assert_eq!(from("8.8.8.8", "/other").status(), 200);
}

#[test]
fn test_rate_limit_shutdown_stops_sweeper() {
    let limit = RateLimitMiddleware::new(5, Duration::from_millis(20)).unwrap();
    assert!(limit.sweeper_running());
    limit.shutdown();
    assert!(!limit.sweeper_running());
    limit.shutdown();
}

#[test]
fn test_access_log_is_transparent() {
    let dispatcher = App::new()
        .middleware(AccessLogMiddleware)
        .route(hello())
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/hello");
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "hi");

    let res = send(&dispatcher, Method::GET, "/missing");
    assert_eq!(res.status(), 404);
}

#[test]
fn test_default_stack_from_config() {
    let config = AppConfig {
        allowed_origins: vec!["https://app.example.com".into()],
        rate_limit: Some(RateLimitConfig {
            requests: 1,
            per_ms: 60_000,
        }),
        ..AppConfig::default()
    };
    let dispatcher = App::from_config(&config)
        .unwrap()
        .secret_key("x-key", "k")
        .route(hello())
        .build()
        .unwrap();

    let make = || {
        Request::new(Method::GET, "/hello")
            .with_header("Origin", "https://app.example.com")
            .with_header("x-key", "k")
    };

    let res = dispatcher.dispatch(&mut make());
    assert_eq!(res.status(), 200);
    assert!(res.header("access-control-allow-origin").is_some());

    // CORS headers survive a rate-limit rejection since CORS wraps the limiter
    let res = dispatcher.dispatch(&mut make());
    assert_eq!(res.status(), 429);
    assert!(res.header("access-control-allow-origin").is_some());
}
