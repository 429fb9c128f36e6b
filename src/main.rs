//! ward service binary.
//!
//! Run with:
//!   RUST_LOG=info cargo run -- --config ward.toml
//!
//! Try:
//!   curl http://localhost:3000/test
//!   curl -H "Authorization: Bearer $TOKEN" http://localhost:3000/test/auth
//!   curl http://localhost:4000/debug/metrics

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use http::{Method, StatusCode};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ward::auth::{Auth, KeyStore, Rule};
use ward::config::Settings;
use ward::metrics::Counters;
use ward::middleware::{Authenticate, Authorize, Errors, Layer, Logger};
use ward::shutdown::Signal;
use ward::{Context, Error, Request, Response, Router, ServeError, Server, health, middleware, shutdown};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "WARD_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "WARD_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args) -> Result<(), ServeError> {
    let settings = Settings::load(args.config.as_deref())?;
    info!(?settings, "startup");

    info!(folder = %settings.auth.keys_folder, "initializing authentication support");
    let keys = KeyStore::from_dir(&settings.auth.keys_folder)?;
    let auth = Auth::new(keys)
        .issuer(settings.auth.issuer.clone())
        .leeway(settings.auth.leeway_secs);

    let (tx, rx) = shutdown::channel();
    let counters = Arc::new(Counters::new());

    let admin: Vec<Layer> = vec![
        Arc::new(Authenticate::new(auth.clone())),
        Arc::new(Authorize::new(auth, Rule::AdminOnly)),
    ];

    let app = Router::new(tx.clone(), middleware::standard(counters.clone()))
        .on(Method::GET, "/test", test)?
        .on_with(Method::GET, "/test/auth", test, &admin)?;

    // Probes and counters stay off the public listener.
    let (debug_tx, debug_rx) = shutdown::channel();
    let debug_layers: Vec<Layer> = vec![Arc::new(Logger), Arc::new(Errors)];
    let debug = Router::new(debug_tx.clone(), debug_layers)
        .on(Method::GET, "/healthz", health::liveness)?
        .on(Method::GET, "/readyz", health::readiness)?
        .on(Method::GET, "/debug/metrics", move |_cx: Context, _req: Request| {
            let counters = Arc::clone(&counters);
            async move { Response::json(StatusCode::OK, &counters.snapshot()) }
        })?;

    info!(host = %settings.web.debug_host, "debug router started");
    let debug_server = tokio::spawn(Server::bind(&settings.web.debug_host)?.serve(debug, debug_rx));

    tokio::spawn(shutdown::forward_os_signals(tx));

    let served = Server::bind(&settings.web.api_host)?
        .read_timeout(settings.web.read_timeout())
        .write_timeout(settings.web.write_timeout())
        .idle_timeout(settings.web.idle_timeout())
        .max_body_bytes(settings.web.max_body_bytes)
        .drain_timeout(settings.web.shutdown_timeout())
        .serve(app, rx)
        .await;

    debug_tx.signal(Signal::Terminate);
    match debug_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "debug router closed"),
        Err(e) => error!(error = %e, "debug router task failed"),
    }
    served?;

    info!("shutdown complete");
    Ok(())
}

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

// GET /test, GET /test/auth
async fn test(_cx: Context, _req: Request) -> Result<Response, Error> {
    Response::json(StatusCode::OK, &Status { status: "ok" })
}
