use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::auth::{CredentialVerifier, JwtVerifier};
use chat_api::config::Config;
use chat_api::gateway::dispatcher::EventDispatcher;
use chat_api::gateway::rooms::RoomRegistry;
use chat_api::store::{MemoryMessageStore, MessageStore};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Every component is constructed here and injected; none of them are
    // process-global, so tests can run independent instances.
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtVerifier::new(&config.jwt_secret));
    // In-memory store for single-process deployments. A relational store
    // implements the same trait and slots in here unchanged.
    let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
    let rooms = Arc::new(RoomRegistry::new());
    let dispatcher = Arc::new(EventDispatcher::new(rooms.clone(), store.clone()));

    let state = AppState {
        config: Arc::new(config),
        verifier,
        store,
        rooms,
        dispatcher,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
