use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::IntegrationStatus;
use crate::engine::SensorState;
use crate::engine::ToIntegrationMessage;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// One entry of the /v1/integrations listing
#[derive(Serialize)]
struct IntegrationResponse {
    name: String,
    /// `None` until the first refresh cycle has finished
    status: Option<IntegrationStatus>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(error: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
}

/// Shared application state
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/sensors
///
/// Last published state of every sensor, keyed by entity ID.
#[tracing::instrument(skip(state))]
async fn sensors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    let sensors: BTreeMap<String, SensorState> = snapshot
        .sensors
        .iter()
        .map(|(entity_id, sensor)| (entity_id.clone(), sensor.clone()))
        .collect();
    Json(sensors)
}

/// Handler for GET /v1/sensors/{entity_id}
#[tracing::instrument(skip(state))]
async fn sensor(State(state): State<Arc<AppState>>, Path(entity_id): Path<String>) -> Response {
    match state.engine.state_snapshot().sensors.get(&entity_id) {
        Some(sensor) => Json(sensor.clone()).into_response(),
        None => not_found(format!("unknown entity: {}", entity_id)),
    }
}

/// Handler for GET /v1/integrations
#[tracing::instrument(skip(state))]
async fn integrations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    let mut names = state.engine.integration_names();
    names.sort();

    let integrations: Vec<_> = names
        .into_iter()
        .map(|name| IntegrationResponse {
            status: snapshot.integrations.get(&name).cloned(),
            name,
        })
        .collect();
    Json(integrations)
}

/// Handler for POST /v1/integrations/{name}/refresh
#[tracing::instrument(skip(state))]
async fn refresh(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state
        .engine
        .send_command(&name, ToIntegrationMessage::Refresh)
    {
        Ok(()) => {
            tracing::info!("Refresh of {} requested over API", name);
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            tracing::debug!("Refresh of {} rejected: {}", name, e);
            not_found(format!("unknown integration: {}", name))
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/sensors", get(sensors))
        .route("/v1/sensors/:entity_id", get(sensor))
        .route("/v1/integrations", get(integrations))
        .route("/v1/integrations/:name/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves the API until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
