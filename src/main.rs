use clap::Parser;
use forexai::adapters::mcp_client::McpClientManager;
use forexai::agents::handler::AgentHandler;
use forexai::cli::Cli;
use forexai::config::Settings;
use forexai::ApiState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting ForexAI Trading Agent on {}:{}", host, port);

    // Spawn and connect the external tool servers before agents need them
    let mcp = Arc::new(McpClientManager::new(&settings.mcp_servers));
    mcp.connect_all().await;

    let agents = AgentHandler::from_settings(&settings, mcp.clone()).await?;
    let app = forexai::create_app(ApiState {
        agents: Arc::new(agents),
    });

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tool server teardown logs failures but never blocks shutdown
    mcp.close_all().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
