//! Random number gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ telemetry middleware ─▶ /random handler
//!                                                              │
//!                                                              ▼
//!                                          UnaryInterceptor ─▶ RandomServer
//!                                                              (handler → usecase → repository)
//!
//!     Cross-cutting:
//!         Telemetry { tracer, metrics, logger }  built once here, injected everywhere
//!         exposition server (/metrics, /healthz) on its own listener
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use random_service::config::{load_config, AppConfig};
use random_service::lifecycle::Shutdown;
use random_service::observability::metrics::exposition::run_exposition_server;
use random_service::observability::{
    global, logger_factory, metrics_factory, tracer_factory, Telemetry,
};
use random_service::HttpServer;

#[derive(Parser)]
#[command(name = "random-service")]
#[command(about = "HTTP gateway for the random number service", long_about = None)]
struct Args {
    /// Path to a TOML config file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let logger = logger_factory(&config.logs)?;
    logger.install_global_default()?;
    tracing::info!("random-service v{} starting", env!("CARGO_PKG_VERSION"));

    let tracer = tracer_factory(&config.tracing.to_tracer_config(&config.server.name))
        .inspect_err(|e| logger.error(format_args!("TracerFactory Error: {e}")))?;
    let metrics = match metrics_factory(&config.metrics.to_metrics_config()) {
        Ok(metrics) => metrics,
        Err(e) => {
            logger.error(format_args!("CreateMetrics Error: {e}"));
            global::metrics()
        }
    };
    let telemetry = Telemetry::new(tracer.clone(), metrics.clone(), logger.clone());

    tracing::info!(
        bind_address = %config.server.bind_address,
        metrics_enabled = config.metrics.enabled,
        tracing_enabled = config.tracing.enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();

    let exposition = config.metrics.enabled.then(|| {
        tokio::spawn(run_exposition_server(
            metrics,
            (*logger).clone(),
            config.metrics.bind_address.clone(),
            shutdown.subscribe(),
        ))
    });

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = HttpServer::new(&config.server, telemetry);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    if let Err(e) = server.run(listener, server_shutdown).await {
        logger.error(format_args!("HTTP server error: {e}"));
    }
    logger.info("Shutting down HTTP server...");

    shutdown.trigger();
    if let Some(task) = exposition {
        let _ = task.await;
    }
    tracer.shutdown();

    logger.info("Bye!");
    Ok(())
}
