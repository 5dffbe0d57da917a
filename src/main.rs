//! textgen-proxy
//!
//! Text-generation proxy with multi-key rotation, per-key cooldowns and
//! model fallback.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use textgen_proxy::{
    config::{Environment, LogFormat, Settings},
    logging::init_tracing,
    server::App,
};

/// Text-generation proxy for the Hugging Face router and inference API
#[derive(Parser, Debug)]
#[command(name = "textgen-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long)]
    log_level: Option<String>,

    /// Console log format (overrides LOG_FORMAT env var)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long)]
    env: Option<Environment>,

    /// Also write JSON logs to this file, rotated daily
    /// Example: --log-file /var/log/textgen/app.log
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration first so logging can use the configured level
    let mut settings = Settings::load()?;

    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(format) = args.log_format {
        settings.log_format = format;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }
    settings.validate()?;

    let _log_guard = init_tracing(&settings.log_level, settings.log_format, args.log_file.as_deref())?;

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        host = %settings.host,
        port = settings.port,
        api_keys = settings.api_keys.len(),
        primary_model = %settings.upstream.primary_model,
        admin_protected = settings.admin_api_key.is_some(),
        "Starting application"
    );

    let app = App::new(settings)?;
    app.run_with_graceful_shutdown().await?;

    tracing::info!("Application shutdown complete");

    Ok(())
}
