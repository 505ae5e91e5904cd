//! HTTP/JSON routes.
//!
//! ```text
//! Client                               Peer
//! POST /v1/register                    POST /v1/peer/advertise
//! GET  /v1/resolve/:pseudonym          POST /v1/peer/pull
//! POST /v1/unregister                  POST /v1/peer/registry
//! POST /v1/send
//! GET  /v1/mailbox/:fingerprint/count  Operations
//! GET  /v1/mailbox/:fingerprint        GET  /health
//! POST /v1/mailbox/delete_one          GET  /v1/stats
//! POST /v1/mailbox/delete_all
//! ```
//!
//! Every failure, including malformed JSON and bad path segments, is
//! answered with an [`ApiError`] body.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use mr_01_registry::RegistryChanges;
use mr_03_replication::{
    AdvertiseAck, Advertisement, PullRequest, PullResponse, RegistryPullRequest,
};
use shared_types::{Fingerprint, Pseudonym};

use crate::domain::{
    Ack, ApiError, CountResponse, DeadlineQuery, DeleteAllRequest, DeleteOneRequest,
    DeleteResponse, FetchQuery, FetchResponse, NodeStats, RegisterRequest, RegisterResponse,
    ResolveResponse, SendRequest, SendResponse, UnregisterRequest,
};
use crate::ports::inbound::NodeApi;
use crate::service::NodeService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NodeService>,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the full router for one node.
pub fn build_router(service: Arc<NodeService>) -> Router {
    let body_limit = service.limits().max_body_bytes;
    let state = AppState { service };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit));

    Router::new()
        // Client surface
        .route("/v1/register", post(register))
        .route("/v1/resolve/:pseudonym", get(resolve))
        .route("/v1/unregister", post(unregister))
        .route("/v1/send", post(send))
        .route("/v1/mailbox/delete_one", post(delete_one))
        .route("/v1/mailbox/delete_all", post(delete_all))
        .route("/v1/mailbox/:fingerprint/count", get(count))
        .route("/v1/mailbox/:fingerprint", get(fetch))
        // Peer surface
        .route("/v1/peer/advertise", post(peer_advertise))
        .route("/v1/peer/pull", post(peer_pull))
        .route("/v1/peer/registry", post(peer_registry))
        // Operations
        .route("/health", get(health_check))
        .route("/v1/stats", get(stats))
        .fallback(not_found)
        .layer(middleware)
        .with_state(state)
}

fn parse_fingerprint(raw: Result<Path<String>, PathRejection>) -> Result<Fingerprint, ApiError> {
    let Path(raw) = raw?;
    Ok(Fingerprint::from_hex(&raw)?)
}

fn parse_pseudonym(raw: Result<Path<String>, PathRejection>) -> Result<Pseudonym, ApiError> {
    let Path(raw) = raw?;
    Ok(raw.parse::<Pseudonym>()?)
}

// =============================================================================
// CLIENT HANDLERS
// =============================================================================

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterResponse> {
    let Json(request) = body?;
    Ok(Json(state.service.register(request).await?))
}

async fn resolve(
    State(state): State<AppState>,
    pseudonym: Result<Path<String>, PathRejection>,
    query: Result<Query<DeadlineQuery>, QueryRejection>,
) -> ApiResult<ResolveResponse> {
    let pseudonym = parse_pseudonym(pseudonym)?;
    let Query(query) = query?;
    Ok(Json(
        state.service.resolve(pseudonym, query.deadline_ms).await?,
    ))
}

async fn unregister(
    State(state): State<AppState>,
    body: Result<Json<UnregisterRequest>, JsonRejection>,
) -> ApiResult<Ack> {
    let Json(request) = body?;
    Ok(Json(state.service.unregister(request).await?))
}

async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<SendResponse> {
    let Json(request) = body?;
    Ok(Json(state.service.send(request).await?))
}

async fn count(
    State(state): State<AppState>,
    fingerprint: Result<Path<String>, PathRejection>,
    query: Result<Query<DeadlineQuery>, QueryRejection>,
) -> ApiResult<CountResponse> {
    let fingerprint = parse_fingerprint(fingerprint)?;
    let Query(query) = query?;
    Ok(Json(
        state.service.count(fingerprint, query.deadline_ms).await?,
    ))
}

async fn fetch(
    State(state): State<AppState>,
    fingerprint: Result<Path<String>, PathRejection>,
    query: Result<Query<FetchQuery>, QueryRejection>,
) -> ApiResult<FetchResponse> {
    let fingerprint = parse_fingerprint(fingerprint)?;
    let Query(query) = query?;
    Ok(Json(state.service.fetch(fingerprint, query).await?))
}

async fn delete_one(
    State(state): State<AppState>,
    body: Result<Json<DeleteOneRequest>, JsonRejection>,
) -> ApiResult<DeleteResponse> {
    let Json(request) = body?;
    Ok(Json(state.service.delete_one(request).await?))
}

async fn delete_all(
    State(state): State<AppState>,
    body: Result<Json<DeleteAllRequest>, JsonRejection>,
) -> ApiResult<DeleteResponse> {
    let Json(request) = body?;
    Ok(Json(state.service.delete_all(request).await?))
}

// =============================================================================
// PEER HANDLERS
// =============================================================================

async fn peer_advertise(
    State(state): State<AppState>,
    body: Result<Json<Advertisement>, JsonRejection>,
) -> ApiResult<AdvertiseAck> {
    let Json(advertisement) = body?;
    Ok(Json(state.service.advertise(advertisement).await?))
}

async fn peer_pull(
    State(state): State<AppState>,
    body: Result<Json<PullRequest>, JsonRejection>,
) -> ApiResult<PullResponse> {
    let Json(request) = body?;
    Ok(Json(state.service.pull_since(request).await?))
}

async fn peer_registry(
    State(state): State<AppState>,
    body: Result<Json<RegistryPullRequest>, JsonRejection>,
) -> ApiResult<RegistryChanges> {
    let Json(request) = body?;
    Ok(Json(state.service.pull_registry(request).await?))
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mailbox-relay",
        "node_id": state.service.node_id().to_string(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stats(State(state): State<AppState>) -> Json<NodeStats> {
    Json(state.service.stats())
}

async fn not_found() -> ApiError {
    ApiError::new(shared_types::ErrorKind::NotFound, "no such route")
}
