//! edge-router CLI.
//!
//! # Commands
//!
//! ```text
//! edge-router compile --routes routes.toml [--out edge.json] [--watch]
//!     → load + validate route table
//!     → build Router
//!     → compile EdgeConfig → JSON (stdout or file)
//!     → with --watch: recompile on every change until ctrl-c
//!
//! edge-router inspect --routes routes.toml GET /p/1.json
//!     → MATCH only, prints the route and lookahead answers
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;

use edge_router::config::{load_config, ConfigWatcher};
use edge_router::edge::{EdgeCompiler, EdgeConfig};
use edge_router::observability::logging::init_logging;
use edge_router::routing::{Request, Selection};

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "Compile and inspect route tables for the edge", long_about = None)]
struct Cli {
    /// Log level or filter directive (overrides the config file).
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a route table into the edge configuration
    Compile {
        #[arg(short, long)]
        routes: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Recompile whenever the route table changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Show which route a request selects and the lookahead answers
    Inspect {
        #[arg(short, long)]
        routes: PathBuf,

        method: String,

        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let routes_path = match &cli.command {
        Commands::Compile { routes, .. } | Commands::Inspect { routes, .. } => routes.clone(),
    };
    let config = load_config(&routes_path)?;

    let level = cli.log_level.as_deref().or(config.observability.log_level.as_deref());
    init_logging(level)?;

    tracing::info!(
        routes_file = %routes_path.display(),
        routes = config.routes.len(),
        "Route table loaded"
    );

    let router = config.build_router()?;

    match cli.command {
        Commands::Compile { out, watch, .. } => {
            let compiled = EdgeCompiler::new(&router)
                .with_options(config.edge_options())
                .compile();
            write_output(&compiled, out.as_deref())?;

            if watch {
                let (watcher, mut updates) = ConfigWatcher::new(&routes_path);
                let _guard = watcher.run()?;

                loop {
                    tokio::select! {
                        Some(compiled) = updates.recv() => {
                            if let Err(e) = write_output(&compiled, out.as_deref()) {
                                tracing::error!(error = %e, "Failed to write edge configuration");
                            }
                        }
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Shutdown signal received");
                            break;
                        }
                    }
                }
            }
        }
        Commands::Inspect { method, path, .. } => {
            let method = http::Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let request = Request::new(method, &path);
            let selection = router.select(&request);
            let (route, params, format) = match &selection {
                Selection::Route(route, m) => (
                    json!(route.pattern().source()),
                    json!(m.params.to_json()),
                    json!(m.format),
                ),
                Selection::Fallback(_) => (json!("__fallback__"), json!({}), json!(null)),
                Selection::NotFound => (json!(null), json!({}), json!(null)),
            };
            let report = json!({
                "route": route,
                "params": params,
                "format": format,
                "handlers": selection.handlers().iter().map(|h| h.kind().name()).collect::<Vec<_>>(),
                "will_cache_on_client": router.will_cache_on_client(&request),
                "will_fetch_from_upstream": router.will_fetch_from_upstream(&request),
                "will_navigate_to_upstream": router.will_navigate_to_upstream(&path),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn write_output(config: &EdgeConfig, out: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = serde_json::to_string_pretty(config)?;
    match out {
        Some(path) => {
            fs::write(path, rendered)?;
            tracing::info!(path = %path.display(), rules = config.router.len(), "Edge configuration written");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
