//! Integration tests for the request dispatcher
//!
//! # Test Coverage
//!
//! - Error statuses: 404, 405 (with `Allow`), 401, 400 for parameters
//! - Request binding with both validation styles
//! - Onion ordering of global and route middleware
//! - Panic recovery and first-write-wins error rendering

mod common;

use common::requests::{body_json, send, send_json};
use http::Method;
use serde::Deserialize;
use starroute::{App, Binding, Handler, Request, RouteError, RouteSpec, Validate};
use std::sync::{Arc, Mutex};

fn echo_params() -> RouteSpec {
    RouteSpec::new("/user/{id:int}/{tab?:str:profile}")
        .get()
        .handler(|res, req| {
            let id = req.param_i64("id").unwrap_or_default();
            let tab = req.param_str("tab").unwrap_or_default().to_string();
            res.json(&serde_json::json!({ "id": id, "tab": tab }));
            Ok(())
        })
}

#[test]
fn test_params_reach_handler() {
    let dispatcher = App::new().route(echo_params()).build().unwrap();

    let res = send(&dispatcher, Method::GET, "/user/42");
    assert_eq!(res.status(), 200);
    assert_eq!(body_json(&res), serde_json::json!({ "id": 42, "tab": "profile" }));

    let res = send(&dispatcher, Method::GET, "/user/42/posts");
    assert_eq!(body_json(&res)["tab"], "posts");
}

#[test]
fn test_percent_encoded_paths_are_decoded() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/people/{name}").handler(|res, req| {
            res.text(req.param_str("name").unwrap_or_default());
            Ok(())
        }))
        .route(RouteSpec::new("/files/my doc").handler(|res, _| {
            res.text("exact");
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(send(&dispatcher, Method::GET, "/people/J%C3%B6rg").body_text(), "Jörg");
    assert_eq!(send(&dispatcher, Method::GET, "/files/my%20doc").body_text(), "exact");
}

#[test]
fn test_not_found() {
    let dispatcher = App::new().route(echo_params()).build().unwrap();
    let res = send(&dispatcher, Method::GET, "/nope");
    assert_eq!(res.status(), 404);
    assert_eq!(
        body_json(&res),
        serde_json::json!({ "error": "Not Found", "status": 404 })
    );
}

#[test]
fn test_method_not_allowed_sets_allow() {
    let dispatcher = App::new().route(echo_params()).build().unwrap();
    let res = send(&dispatcher, Method::DELETE, "/user/1");
    assert_eq!(res.status(), 405);
    assert_eq!(res.header("allow"), Some("GET"));
    assert_eq!(body_json(&res)["error"], "Method Not Allowed");
}

#[test]
fn test_route_without_method_accepts_any() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/any").handler(|res, req| {
            res.text(req.method().as_str());
            Ok(())
        }))
        .build()
        .unwrap();
    for method in [Method::GET, Method::POST, Method::PATCH] {
        let res = send(&dispatcher, method.clone(), "/any");
        assert_eq!(res.status(), 200);
        assert_eq!(res.body_text(), method.as_str());
    }
}

#[test]
fn test_secret_keys() {
    let dispatcher = App::new()
        .secret_key("x-app", "global")
        .route(
            RouteSpec::new("/vault")
                .secret_key("x-vault", "open-sesame")
                .handler(|res, _| {
                    res.text("gold");
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/vault");
    assert_eq!(res.status(), 401);
    assert_eq!(body_json(&res)["error"], "Unauthorized");

    let mut req = Request::new(Method::GET, "/vault").with_header("X-App", "global");
    assert_eq!(dispatcher.dispatch(&mut req).status(), 401);

    let mut req = Request::new(Method::GET, "/vault")
        .with_header("X-App", "global")
        .with_header("X-Vault", "open-sesame");
    let res = dispatcher.dispatch(&mut req);
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "gold");
}

#[test]
fn test_route_key_overrides_global_key() {
    let dispatcher = App::new()
        .secret_key("x-token", "global")
        .route(RouteSpec::new("/local").secret_key("x-token", "local").handler(|_, _| Ok(())))
        .build()
        .unwrap();

    let mut req = Request::new(Method::GET, "/local").with_header("x-token", "global");
    assert_eq!(dispatcher.dispatch(&mut req).status(), 401);
    let mut req = Request::new(Method::GET, "/local").with_header("x-token", "local");
    assert_eq!(dispatcher.dispatch(&mut req).status(), 200);
}

#[test]
fn test_conversion_failures() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/page/{n?:int:1}").handler(|res, req| {
            res.text(&req.param_i64("n").unwrap_or(-1).to_string());
            Ok(())
        }))
        .route(RouteSpec::new("/count/{n:int}").handler(|_, _| Ok(())))
        .build()
        .unwrap();

    assert_eq!(send(&dispatcher, Method::GET, "/page").body_text(), "1");
    assert_eq!(send(&dispatcher, Method::GET, "/page/9").body_text(), "9");
    // Out of i64 range: optional falls back to its default
    assert_eq!(
        send(&dispatcher, Method::GET, "/page/99999999999999999999").body_text(),
        "1"
    );

    let res = send(&dispatcher, Method::GET, "/count/99999999999999999999");
    assert_eq!(res.status(), 400);
    assert_eq!(body_json(&res)["status"], 400);
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    age: u32,
}

impl Validate for NewUser {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.age < 18 {
            return Err("age must be at least 18".to_string());
        }
        Ok(())
    }
}

fn bound_user_route() -> RouteSpec {
    RouteSpec::new("/users")
        .post()
        .bind(Binding::validate_with::<NewUser>())
        .handler(|res, req| {
            let Some(user) = req.bound::<NewUser>() else {
                return Err(RouteError::internal("model missing"));
            };
            let body = serde_json::json!({ "name": user.name, "age": user.age });
            res.json_status(201, &body);
            Ok(())
        })
}

#[test]
fn test_body_binding_with_validate_trait() {
    let dispatcher = App::new().route(bound_user_route()).build().unwrap();

    let res = send_json(&dispatcher, Method::POST, "/users", r#"{"name":"ada","age":36}"#);
    assert_eq!(res.status(), 201);
    assert_eq!(body_json(&res)["name"], "ada");

    let res = send_json(&dispatcher, Method::POST, "/users", r#"{"name":"kid","age":9}"#);
    assert_eq!(res.status(), 400);
    assert!(body_json(&res)["error"]
        .as_str()
        .unwrap()
        .contains("age must be at least 18"));

    let res = send_json(&dispatcher, Method::POST, "/users", "not json");
    assert_eq!(res.status(), 400);

    let res = send_json(&dispatcher, Method::POST, "/users", "");
    assert_eq!(res.status(), 400);
}

#[derive(Debug, Deserialize, validator::Validate)]
struct Search {
    #[validate(length(min = 2))]
    q: String,
    tags: Option<Vec<String>>,
}

#[test]
fn test_query_binding_with_validator_tags() {
    let dispatcher = App::new()
        .route(
            RouteSpec::new("/search")
                .bind(Binding::tagged::<Search>().on(Method::GET))
                .handler(|res, req| {
                    let tags = req
                        .bound::<Search>()
                        .and_then(|s| s.tags.clone())
                        .unwrap_or_default();
                    let q = req.bound::<Search>().map(|s| s.q.clone()).unwrap_or_default();
                    res.json(&serde_json::json!({ "q": q, "tags": tags }));
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/search?q=rust&tags=a&tags=b");
    assert_eq!(res.status(), 200);
    assert_eq!(
        body_json(&res),
        serde_json::json!({ "q": "rust", "tags": ["a", "b"] })
    );

    let res = send(&dispatcher, Method::GET, "/search?q=r");
    assert_eq!(res.status(), 400);

    // Binding is restricted to GET
    let res = send(&dispatcher, Method::POST, "/search");
    assert_eq!(res.status(), 200);
    assert_eq!(body_json(&res)["q"], "");
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl Fn(Handler) -> Handler {
    let log = Arc::clone(log);
    move |next: Handler| -> Handler {
        let log = Arc::clone(&log);
        Arc::new(move |res, req| {
            log.lock().unwrap().push(format!("{name}:before"));
            let result = next(res, req);
            log.lock().unwrap().push(format!("{name}:after"));
            result
        })
    }
}

#[test]
fn test_middleware_onion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);

    let dispatcher = App::new()
        .middleware(recorder(&log, "global1"))
        .middleware(recorder(&log, "global2"))
        .route(
            RouteSpec::new("/p")
                .middleware(recorder(&log, "parent"))
                .child(
                    RouteSpec::new("/c")
                        .middleware(recorder(&log, "child"))
                        .handler(move |res, _| {
                            handler_log.lock().unwrap().push("handler".to_string());
                            res.text("done");
                            Ok(())
                        }),
                ),
        )
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/p/c");
    assert_eq!(res.status(), 200);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "global1:before",
            "global2:before",
            "parent:before",
            "child:before",
            "handler",
            "child:after",
            "parent:after",
            "global2:after",
            "global1:after",
        ]
    );
}

#[test]
fn test_global_middleware_runs_for_unknown_paths() {
    let dispatcher = App::new()
        .middleware(|next: Handler| -> Handler {
            Arc::new(move |res, req| {
                res.set_header("x-seen", "yes");
                next(res, req)
            })
        })
        .route(RouteSpec::new("/known").handler(|_, _| Ok(())))
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/unknown");
    assert_eq!(res.status(), 404);
    assert_eq!(res.header("x-seen"), Some("yes"));
}

#[test]
fn test_middleware_can_short_circuit() {
    let reached = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&reached);
    let dispatcher = App::new()
        .route(
            RouteSpec::new("/guarded")
                .middleware(|_next: Handler| -> Handler {
                    Arc::new(|res, _req| {
                        res.json_status(418, &serde_json::json!({ "teapot": true }));
                        Ok(())
                    })
                })
                .handler(move |_, _| {
                    *flag.lock().unwrap() = true;
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/guarded");
    assert_eq!(res.status(), 418);
    assert!(!*reached.lock().unwrap());
}

#[test]
fn test_panic_is_recovered() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/boom").handler(|res, _| {
            res.text("partial");
            panic!("kaboom");
        }))
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/boom");
    assert_eq!(res.status(), 500);
    let body = body_json(&res);
    assert_eq!(body["error"], "Internal Server Error");
    assert!(body.get("stack").is_none());
    assert!(!res.body_text().contains("partial"));
}

#[test]
fn test_panic_details_in_debug_mode() {
    let dispatcher = App::new()
        .debug(true)
        .route(RouteSpec::new("/boom").handler(|_, _| panic!("kaboom")))
        .build()
        .unwrap();

    let body = body_json(&send(&dispatcher, Method::GET, "/boom"));
    assert_eq!(body["status"], 500);
    assert_eq!(body["panic"], "kaboom");
    assert!(body["stack"].is_string());
}

#[test]
fn test_error_after_write_keeps_first_response() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/half").handler(|res, _| {
            res.write_header(202);
            res.write(b"accepted");
            Err(RouteError::internal("late failure"))
        }))
        .build()
        .unwrap();

    let res = send(&dispatcher, Method::GET, "/half");
    assert_eq!(res.status(), 202);
    assert_eq!(res.body_text(), "accepted");
}

#[test]
fn test_branch_node_is_not_found() {
    let dispatcher = App::new()
        .route(RouteSpec::new("/group").child(RouteSpec::new("/leaf").handler(|_, _| Ok(()))))
        .build()
        .unwrap();
    assert_eq!(send(&dispatcher, Method::GET, "/group").status(), 404);
    assert_eq!(send(&dispatcher, Method::GET, "/group/leaf").status(), 200);
}
