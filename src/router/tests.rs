use super::{compile_path, join_paths, normalize_request_path, ParamType, ParamValue};
use crate::errors::RouteConfigError;

fn matches(template: &str, path: &str) -> bool {
    compile_path(template).unwrap().regex().unwrap().is_match(path)
}

#[test]
fn test_root_path() {
    let compiled = compile_path("/").unwrap();
    assert!(compiled.is_exact);
    assert_eq!(compiled.key, "/");
    assert!(compiled.regex().unwrap().is_match("/"));
    assert!(compiled.params.is_empty());
}

#[test]
fn test_plain_param_is_str() {
    let compiled = compile_path("/items/{id}").unwrap();
    assert!(!compiled.is_exact);
    assert_eq!(compiled.pattern, "^/items/([^/]+)$");
    assert_eq!(compiled.params[0].kind, ParamType::Str);
    assert_eq!(compiled.params[0].key.as_ref(), "id");
}

#[test]
fn test_typed_params() {
    assert!(matches("/u/{id:int}", "/u/42"));
    assert!(!matches("/u/{id:int}", "/u/abc"));
    assert!(matches("/p/{price:float}", "/p/9.99"));
    assert!(!matches("/p/{price:float}", "/p/9"));
    assert!(matches("/f/{on:bool}", "/f/TRUE"));
    assert!(!matches("/f/{on:bool}", "/f/yes"));
    assert!(matches("/d/{day:date}", "/d/2024-1-5"));
    assert!(matches("/d/{day:date}", "/d/2024-01-05T23:59:59"));
    assert!(!matches("/d/{day:date}", "/d/2024-13-05"));
}

#[test]
fn test_two_part_default_when_not_a_type() {
    let compiled = compile_path("/lang/{code:en}").unwrap();
    let desc = &compiled.params[0];
    assert_eq!(desc.kind, ParamType::Str);
    assert_eq!(desc.default, Some(ParamValue::Str("en".into())));
}

#[test]
fn test_three_part_default_is_typed() {
    let compiled = compile_path("/list/{page?:int:1}").unwrap();
    let desc = &compiled.params[0];
    assert!(desc.optional);
    assert_eq!(desc.kind, ParamType::Int);
    assert_eq!(desc.default, Some(ParamValue::Int(1)));
}

#[test]
fn test_optional_absorbs_preceding_slash() {
    let compiled = compile_path("/user/{id?:int}").unwrap();
    assert_eq!(compiled.pattern, r"^/user(?:/(\d+))?$");
    let re = compiled.regex().unwrap();
    assert!(re.is_match("/user"));
    assert!(re.is_match("/user/7"));
    assert!(!re.is_match("/user/"));
}

#[test]
fn test_literals_are_escaped() {
    assert!(matches("/files/report.json", "/files/report.json"));
    assert!(!matches("/files/report.json", "/files/reportxjson"));
    assert!(matches("/v1.{minor:int}/x", "/v1.2/x"));
}

#[test]
fn test_unknown_type_in_three_part_token() {
    let err = compile_path("/x/{id:uuid:abc}").unwrap_err();
    assert!(matches!(err, RouteConfigError::UnknownParamType { .. }));
}

#[test]
fn test_invalid_defaults_rejected() {
    for template in ["/x/{n:int:abc}", "/x/{f:float:1}", "/x/{b:bool:yes}", "/x/{d:date:2023-02-31}"] {
        let err = compile_path(template).unwrap_err();
        assert!(
            matches!(err, RouteConfigError::InvalidDefault { .. }),
            "{template} gave {err:?}"
        );
    }
}

#[test]
fn test_malformed_templates_rejected() {
    for template in ["/x/{id", "/x/id}", "/x/{}", "/x/{?}"] {
        assert!(
            matches!(
                compile_path(template),
                Err(RouteConfigError::MalformedTemplate { .. })
            ),
            "{template} should be malformed"
        );
    }
}

#[test]
fn test_wildcard_tails() {
    let permissive = compile_path("/static/").unwrap().with_wildcard(true);
    assert_eq!(permissive.pattern, "^/static(/.*)?$");
    let re = permissive.regex().unwrap();
    assert!(re.is_match("/static"));
    assert!(re.is_match("/static/"));
    assert!(re.is_match("/static/a/b.css"));

    let strict = compile_path("/assets").unwrap().with_wildcard(false);
    let re = strict.regex().unwrap();
    assert!(re.is_match("/assets/app.js"));
    assert!(!re.is_match("/assets/"));
    assert!(strict.has_wildcard);
}

#[test]
fn test_join_paths() {
    assert_eq!(join_paths("", "/"), "/");
    assert_eq!(join_paths("/", "users"), "/users");
    assert_eq!(join_paths("/api/", "/v1/"), "/api/v1");
    assert_eq!(join_paths("/api", ""), "/api");
    assert_eq!(join_paths("api", "x"), "/api/x");
}

#[test]
fn test_normalize_request_path() {
    assert_eq!(normalize_request_path("/"), "/");
    assert_eq!(normalize_request_path(""), "/");
    assert_eq!(normalize_request_path("/a/"), "/a");
    assert_eq!(normalize_request_path("/a"), "/a");
}
