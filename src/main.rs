use std::net::SocketAddr;
use std::sync::Arc;

use hearth_auth::config::AppConfig;
use hearth_auth::observability;
use hearth_auth::services::database::MongoDb;
use hearth_auth::services::invite::InviteService;
use hearth_auth::services::jwt::TokenCodec;
use hearth_auth::services::registry::{RedisRefreshStore, RefreshStore};
use hearth_auth::services::session::SessionService;
use hearth_auth::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    observability::init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting service"
    );

    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    db.initialize_indexes().await?;

    let registry: Arc<dyn RefreshStore> =
        Arc::new(RedisRefreshStore::connect(&config.redis.url).await?);
    let codec = TokenCodec::new(&config.jwt)?;
    let sessions = SessionService::new(codec.clone(), registry.clone(), &config.jwt);
    let invites = InviteService::new(db.clone(), &config.invites);

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        db: db.clone(),
        codec,
        sessions,
        registry,
        members: Arc::new(db),
        invites,
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
