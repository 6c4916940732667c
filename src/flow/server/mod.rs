// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::{EventKind, ExposedState, StateRegistry, StateStore};
use crate::flow::setter::{SetMessage, Setter};

type ApiError = (StatusCode, Json<Value>);

#[derive(Clone)]
struct AppState {
    registry: StateRegistry,
}

pub fn router(registry: StateRegistry) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/units", get(list_units))
        .route("/api/states", get(list_states))
        .route("/api/states/{name}", get(get_state).post(set_state))
        .route("/api/states/{name}/stream", get(stream_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { registry })
}

pub async fn serve(
    registry: StateRegistry,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(registry);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("State '{}' not found", name) })),
    )
}

async fn lookup(app: &AppState, name: &str) -> Result<std::sync::Arc<StateStore>, ApiError> {
    app.registry.get(name).await.ok_or_else(|| not_found(name))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_units(State(app): State<AppState>) -> Json<Value> {
    Json(json!(app.registry.units().list()))
}

async fn list_states(State(app): State<AppState>) -> Json<Value> {
    let mut states = Vec::new();
    for name in app.registry.names().await {
        if let Some(store) = app.registry.get(&name).await {
            states.push(json!({
                "name": name,
                "dataType": store.data_type().tag(),
                "initialized": store.is_initialized(),
                "value": store.value().await,
            }));
        }
    }
    Json(json!(states))
}

async fn get_state(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ExposedState>, ApiError> {
    if let Some(store) = app.registry.get(&name).await {
        return Ok(Json(store.exposed_state().await));
    }
    // Released stores stay readable through the cache
    app.registry
        .cached(&name)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&name))
}

async fn set_state(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(message): Json<SetMessage>,
) -> Result<Json<ExposedState>, ApiError> {
    let store = lookup(&app, &name).await?;
    Setter::new(store.clone()).apply(&message).await;
    Ok(Json(store.exposed_state().await))
}

fn to_event(kind: EventKind, state: &ExposedState) -> Option<Event> {
    let name = match kind {
        EventKind::Init => "init",
        EventKind::Change => "change",
    };
    match Event::default().event(name).json_data(state) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("Dropping unserializable {} event: {}", name, e);
            None
        }
    }
}

async fn stream_state(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let store = lookup(&app, &name).await?;
    let (current, rx) = store.watch().await;

    let initial = tokio_stream::iter(current.and_then(|state| to_event(EventKind::Init, &state)));
    let updates = BroadcastStream::new(rx).filter_map(|event| match event {
        Ok(event) => to_event(event.kind, &event.state),
        Err(e) => {
            log::warn!("State stream lagged: {}", e);
            None
        }
    });
    let stream = initial.chain(updates).map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
