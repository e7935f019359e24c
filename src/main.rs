use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payment_router::cli::{handle_config_validate, Cli, Commands};
use payment_router::config::{Config, LoggingConfig};
use payment_router::gateway::GatewayRegistry;
use payment_router::startup::validate_config;
use payment_router::{build_state, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Config => handle_config_validate(&config),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let report = validate_config(&config, &GatewayRegistry::with_builtin_protocols());
    if !report.is_valid() {
        report.print();
        anyhow::bail!("configuration validation failed");
    }

    let config = Arc::new(config);
    let state = build_state(config.clone())?;
    tracing::info!(
        service = %config.server.service_name,
        gateways = state.gateways.len(),
        workers = config.worker_pool.num_workers,
        mock_gateways = config.server.mock_gateways,
        "Payment router initialized"
    );

    let app = create_app(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, draining connections");
}
