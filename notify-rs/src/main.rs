use clap::Parser;
use notify_rs::api::{ApiServer, AppState};
use notify_rs::config::{Config, LoggingConfig};
use notify_rs::service::{Backends, NotificationService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "notify-rs")]
#[command(about = "Outbound SMS relay with email and push fallback", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "NOTIFY_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("notify_rs={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    init_tracing(&config.logging);

    info!("Starting notify-rs v{}", env!("CARGO_PKG_VERSION"));
    match &cli.config {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file specified, using defaults"),
    }
    info!("  API listening on: {}", config.server.listen_addr);
    info!(
        "  Limits: {}/key/day, {} SMS/day, {} emails/day",
        config.limits.per_key_daily, config.limits.primary_daily, config.limits.email_daily
    );
    if config.admin.token.is_none() {
        info!("  Admin API disabled (no admin.token)");
    }

    let backends = Backends::from_config(&config).await?;
    let service = NotificationService::new(&config, backends);

    let state = Arc::new(AppState {
        service,
        admin_token: config.admin.token.clone(),
    });

    let server = ApiServer::new(state, config.server.listen_addr.clone());
    server.run(shutdown_signal()).await?;

    Ok(())
}
