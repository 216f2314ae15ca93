use crate::app::App;
use crate::config::AppConfig;
use crate::handlers::{StaticConfig, WebappConfig};
use crate::logging::init_logging;
use crate::route::RouteSpec;
use crate::router::Router;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line interface for starroute
#[derive(Parser)]
#[command(name = "starroute")]
#[command(about = "Declarative HTTP router and file server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Route selection shared by `serve` and `routes`
#[derive(Args, Debug, Clone, Default)]
pub struct RouteArgs {
    /// Serve this directory under /static
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Serve this single-page app at /
    #[arg(long)]
    pub webapp_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to the YAML configuration file
        #[arg(short, long, default_value = "starroute.yaml")]
        config: PathBuf,

        #[command(flatten)]
        routes: RouteArgs,
    },
    /// Print the compiled route table
    Routes {
        #[command(flatten)]
        routes: RouteArgs,
    },
    /// Write a default configuration file
    InitConfig {
        /// Destination file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
}

/// Routes mounted by the binary
pub fn default_routes(args: &RouteArgs) -> Vec<RouteSpec> {
    let mut routes = vec![RouteSpec::new("/health").get().handler(|res, _req| {
        res.json(&json!({ "status": "ok" }));
        Ok(())
    })];
    if let Some(dir) = &args.static_dir {
        routes.push(RouteSpec::new("/static").static_files(StaticConfig::new(dir).allow_dir(true)));
    }
    if let Some(dir) = &args.webapp_dir {
        routes.push(RouteSpec::new("/").get().webapp(WebappConfig::new(dir)));
    }
    routes
}

fn print_routes(router: &Router) {
    println!("{:<8} {:<9} {:<32} KEY", "METHOD", "KIND", "TEMPLATE");
    for route in router.routes() {
        let method = route.method().map_or_else(|| "*".to_string(), ToString::to_string);
        println!(
            "{:<8} {:<9} {:<32} {}",
            method,
            route.kind().to_string(),
            route.template(),
            route.key()
        );
    }
}

#[cfg(unix)]
fn wait_for_shutdown() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    Ok(())
}

fn serve(config_path: &Path, args: &RouteArgs) -> anyhow::Result<()> {
    let config = AppConfig::load(config_path)?;
    let _log_guard = init_logging(&config.log.clone().with_env_overrides())?;

    let handle = App::from_config(&config)
        .context("invalid configuration")?
        .routes(default_routes(args))
        .serve()?;
    handle.wait_ready().context("server did not become ready")?;
    info!(addr = %handle.local_addr(), "Ready");

    #[cfg(unix)]
    {
        wait_for_shutdown()?;
        handle.stop();
        Ok(())
    }
    #[cfg(not(unix))]
    {
        handle
            .join()
            .map_err(|e| anyhow::anyhow!("server coroutine panicked: {e:?}"))
    }
}

/// Run the CLI with process arguments
///
/// # Errors
///
/// Returns an error if:
/// - the configuration cannot be read or is invalid
/// - the route table fails to compile
/// - the server cannot bind its address
/// - the config template cannot be written
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Serve { config, routes } => serve(config, routes),
        Commands::Routes { routes } => {
            let router = Router::new(default_routes(routes))?;
            print_routes(&router);
            Ok(())
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::write_default(path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
