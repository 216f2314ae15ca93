//! Unit tests for CLI commands

use crate::cli::{default_routes, Cli, Commands, RouteArgs};
use crate::router::{Router, RouteKind};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn test_serve_command_with_flags() {
    let cli = Cli::try_parse_from([
        "starroute",
        "serve",
        "--config",
        "conf.yaml",
        "--static-dir",
        "public",
    ])
    .unwrap();

    match cli.command {
        Commands::Serve { config, routes } => {
            assert_eq!(config, PathBuf::from("conf.yaml"));
            assert_eq!(routes.static_dir, Some(PathBuf::from("public")));
            assert!(routes.webapp_dir.is_none());
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_serve_config_defaults() {
    let cli = Cli::try_parse_from(["starroute", "serve"]).unwrap();
    match cli.command {
        Commands::Serve { config, .. } => assert_eq!(config, PathBuf::from("starroute.yaml")),
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_all_commands_parse() {
    let commands = vec![
        vec!["starroute", "serve"],
        vec!["starroute", "routes", "--webapp-dir", "web"],
        vec!["starroute", "init-config", "out.yaml", "--force"],
    ];
    for args in commands {
        assert!(Cli::try_parse_from(args.clone()).is_ok(), "failed to parse {args:?}");
    }
    assert!(Cli::try_parse_from(["starroute", "init-config"]).is_err());
}

#[test]
fn test_default_routes_compile() {
    let args = RouteArgs {
        static_dir: Some(PathBuf::from("public")),
        webapp_dir: Some(PathBuf::from("web")),
    };
    let router = Router::new(default_routes(&args)).unwrap();
    assert_eq!(router.len(), 3);

    let health = router.resolve("/health").unwrap();
    assert_eq!(health.route.kind(), RouteKind::Handler);
    let asset = router.resolve("/static/css/site.css").unwrap();
    assert_eq!(asset.route.kind(), RouteKind::Static);
    let page = router.resolve("/dashboard/settings").unwrap();
    assert_eq!(page.route.kind(), RouteKind::Webapp);
}

#[test]
fn test_default_routes_without_dirs() {
    let router = Router::new(default_routes(&RouteArgs::default())).unwrap();
    assert_eq!(router.len(), 1);
    assert!(router.resolve("/missing").is_none());
}
