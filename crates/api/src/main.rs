//! `apex-api` -- HTTP server for the AI admin agent.
//!
//! Reads `ServerConfig` and `AgentConfig` from the environment (a `.env`
//! file is honoured), connects to Postgres, runs migrations and serves the
//! owner-only `/api/v1/admin/agent` routes until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apex_agent::config::AgentConfig;
use apex_agent::store::PgPatchStore;
use apex_agent::PatchService;
use apex_api::config::ServerConfig;
use apex_api::router::build_app_router;
use apex_api::state::AppState;
use apex_db::DbPool;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    let agent_config = AgentConfig::from_env().expect("Invalid agent configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        owner_user_id = config.owner_user_id,
        environment = ?agent_config.environment,
        remote_sink = agent_config.uses_remote_sink(),
        "Loaded configuration",
    );

    let pool = connect_database().await;

    let store = Arc::new(PgPatchStore::new(pool.clone()));
    let patches = PatchService::from_config(&agent_config, store)
        .expect("Failed to build patch service");

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        patches: Arc::new(patches),
    };
    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apex_api=debug,apex_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect, verify and migrate. Any failure aborts startup.
async fn connect_database() -> DbPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = apex_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    apex_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    apex_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database ready");
    pool
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
