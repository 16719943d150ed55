use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_db::Database;
use parley_gateway::connection;
use parley_gateway::error::GatewayError;
use parley_gateway::notify::Notifier;
use parley_gateway::registry::GroupRegistry;
use parley_types::api::CreateNotificationRequest;

#[derive(Clone)]
struct ServerState {
    db: Arc<Database>,
    registry: GroupRegistry,
    notifier: Notifier,
    jwt_secret: String,
    internal_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let internal_key =
        std::env::var("PARLEY_INTERNAL_KEY").unwrap_or_else(|_| "dev-internal-key".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let registry = GroupRegistry::new();
    let notifier = Notifier::new(db.clone(), registry.clone());

    let state = ServerState {
        db,
        registry,
        notifier,
        jwt_secret,
        internal_key,
    };

    // Routes
    let app = Router::new()
        .route("/ws/chat/{token}", get(ws_upgrade))
        .route("/internal/notifications", post(create_notification))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The upgrade path carries the bearer token as its final segment. The token
/// is verified and the subject resolved before the upgrade is accepted — a
/// bad credential gets an HTTP 401, never an accept-then-close.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let user = connection::authenticate_token(&token, &state.jwt_secret, &state.db)
        .await
        .map_err(|e| match e {
            GatewayError::Auth => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.registry, state.db, user.id)
    }))
}

/// Ingress for collaborator services (likes, comments) to raise a
/// notification. Guarded by a shared key; the fanout itself is best-effort.
async fn create_notification(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let key = headers
        .get("x-internal-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if key != state.internal_key {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let notification = state
        .notifier
        .notify(req.user_id, &req.content, req.kind)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(notification.to_payload())))
}
