//! Prism - S3 gateway with bucket notifications
//!
//! Sits in front of an S3-compatible backend, keeps bucket notification
//! configurations and invokes Lambda functions when objects are written or
//! deleted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use prism_core::config::PrismConfig;
use prism_events::{HttpInvoker, NotificationService, NotificationStore};
use prism_s3_api::{MetricsRecorder, S3Server};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "prism")]
#[command(author = "Prism Team")]
#[command(version = prism_core::VERSION)]
#[command(about = "S3 gateway with bucket notifications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PRISM_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "PRISM_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "PRISM_PORT")]
    port: Option<u16>,

    /// Data directory
    #[arg(long, env = "PRISM_DATA_DIR")]
    data_dir: Option<String>,

    /// S3 backend URL
    #[arg(long, env = "PRISM_BACKEND_ENDPOINT")]
    backend_endpoint: Option<String>,

    /// Lambda-compatible endpoint used to invoke functions
    #[arg(long, env = "PRISM_LAMBDA_ENDPOINT")]
    lambda_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PRISM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "PRISM_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default)
    Server,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        print_banner();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => PrismConfig::from_file(path)?,
        None => PrismConfig::from_env(),
    };

    // Override with CLI args
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.into();
    }
    if let Some(endpoint) = cli.backend_endpoint {
        config.backend.endpoint = endpoint;
    }
    if let Some(endpoint) = cli.lambda_endpoint {
        config.notifications.lambda_endpoint = endpoint;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_logging(&config);
    config.validate()?;

    print_banner();
    run_server(config).await
}

fn init_logging(config: &PrismConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn print_banner() {
    println!(
        r#"
    ____       _
   |  _ \ _ __(_)___ _ __ ___
   | |_) | '__| / __| '_ ` _ \
   |  __/| |  | \__ \ | | | | |
   |_|   |_|  |_|___/_| |_| |_|

   S3 gateway with bucket notifications
   Version: {}
"#,
        prism_core::VERSION
    );
}

async fn run_server(config: PrismConfig) -> anyhow::Result<()> {
    info!("Starting Prism gateway...");
    info!("Data directory: {:?}", config.storage.data_dir);

    let metrics = Arc::new(MetricsRecorder::install().context("installing metrics recorder")?);

    let invoker = HttpInvoker::new(&config.notifications, &config.aws)?;
    let store = NotificationStore::new(config.storage.notifications_dir());
    let notifications = Arc::new(NotificationService::new(
        store,
        Arc::new(invoker),
        config.notifications.clone(),
    ));

    let loaded = notifications
        .load_all()
        .await
        .context("loading bucket notification configurations")?;
    info!("Registered {} bucket notification configuration(s)", loaded);

    let server = S3Server::new(config, notifications.clone())?.with_metrics(metrics);
    server.run(shutdown_signal()).await?;

    notifications.shutdown().await;
    info!("Prism stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining requests");
}
