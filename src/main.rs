//! GenePredict binary entry point.
//!
//! Runs the classifier web service. Core functionality is provided by the
//! `genepredict` library crate.

use clap::Parser;
use genepredict::{
    config::AppConfig,
    model::Model,
    server::{AppState, create_router},
    storage::{Database, PredictionStore},
};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// GenePredict - gene-expression classifier service
#[derive(Parser, Debug)]
#[command(name = "genepredict", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "GENEPREDICT_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "HOST")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "PORT")]
    server_port: Option<u16>,

    /// Full database connection URL (overrides config file)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Database host (overrides config file)
    #[arg(long, env = "DB_HOST")]
    db_host: Option<String>,

    /// Database name (overrides config file)
    #[arg(long, env = "DB_NAME")]
    db_name: Option<String>,

    /// Database user (overrides config file)
    #[arg(long, env = "DB_USER")]
    db_user: Option<String>,

    /// Database password (overrides config file)
    #[arg(long, env = "DB_PASSWORD")]
    db_password: Option<String>,

    /// Database port (overrides config file)
    #[arg(long, env = "DB_PORT")]
    db_port: Option<u16>,

    /// Embedded fallback database file (overrides config file)
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<String>,

    /// Model weights file (overrides config file)
    #[arg(long, env = "MODEL_PATH")]
    model_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,genepredict=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("GenePredict - gene-expression classifier service");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load_or_default(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    if let Some(host) = cli.db_host {
        config.database.host = host;
    }
    if let Some(name) = cli.db_name {
        config.database.name = name;
    }
    if let Some(user) = cli.db_user {
        config.database.user = user;
    }
    if let Some(password) = cli.db_password {
        config.database.password = password;
    }
    if let Some(port) = cli.db_port {
        config.database.port = port;
    }
    if let Some(path) = cli.sqlite_path {
        config.database.sqlite_path = path;
    }
    if let Some(path) = cli.model_path {
        config.model.path = path;
    }

    tracing::info!(
        "Server: {}:{}, database: {} (sqlite fallback: {})",
        config.server.bind,
        config.server.port,
        config.database.host,
        config.database.sqlite_path,
    );

    // Build the store
    let store = PredictionStore::new(Database::new(config.database.clone()));

    // Startup connectivity probe - failures are logged, not fatal
    match store.database().acquire().await {
        Ok(conn) => {
            tracing::info!(backend = %conn.kind(), "database reachable");
            conn.close().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "database connection failed; continuing with limited functionality");
        }
    }

    // Load the model - a missing model is not fatal, /predict reports it
    let model = Model::load_first(&Model::candidate_paths(Path::new(&config.model.path)));
    if model.is_none() {
        tracing::warn!("model not loaded - predictions will not work");
    }

    // Create web server state
    let app_state = AppState { store, model };

    // Build Axum router
    let app = create_router(app_state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
