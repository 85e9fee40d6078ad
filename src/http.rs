//! HTTP surface for the tracker.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /`: API description.
//! - `GET|POST /track-view`: count a hit. The page comes from `?page=`, a JSON
//!   body `{"page": ...}`, or the `Referer`, in that order.
//! - `GET /stats`: aggregates; `?full=true` adds the snapshot and its version.
//! - `GET /health`: liveness, no store access.
//!
//! The tracker is blocking, so hits run on tokio's blocking pool. A client
//! that disconnects mid-request does not abort a save in flight.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use view_counter::{http, AppState, ReferrerGate, Tracker};
//!
//! let state = Arc::new(AppState::new(tracker, ReferrerGate::open()));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! http::serve(state, listener, shutdown_signal()).await?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::{CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::access::ReferrerGate;
use crate::blob::Channel;
use crate::counter::Report;
use crate::enrich::UNKNOWN;
use crate::error::StoreError;
use crate::identity::{client_ip, FORWARDED_FOR, REAL_IP};
use crate::lock::{InMemoryLock, Lock};
use crate::record::{SnapshotStats, Version, VisitorRecord};
use crate::tracker::{Hit, Tracker};

/// Everything the handlers share.
pub struct AppState<C, L = InMemoryLock> {
    pub tracker: Tracker<C, L>,
    pub gate: ReferrerGate,
}

impl<C, L> AppState<C, L> {
    pub fn new(tracker: Tracker<C, L>, gate: ReferrerGate) -> Self {
        Self { tracker, gate }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized referrer")]
    Unauthorized,

    #[error("could not determine client address")]
    NoClientAddress,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::NoClientAddress => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Build an axum `Router` over the given state, with CORS for the allowed origin.
pub fn router<C, L>(state: Arc<AppState<C, L>>) -> Router
where
    C: Channel + 'static,
    L: Lock + 'static,
{
    let cors = cors(&state.gate);
    Router::new()
        .route("/", get(index_handler))
        .route(
            "/track-view",
            get(track_get_handler::<C, L>).post(track_post_handler::<C, L>),
        )
        .route("/stats", get(stats_handler::<C, L>))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves, then finish in-flight requests.
pub async fn serve<C, L, F>(
    state: Arc<AppState<C, L>>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    C: Channel + 'static,
    L: Lock + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn cors(gate: &ReferrerGate) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    match gate.allowed_origin().map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            warn!(error = %e, "allowed referrer is not a valid origin, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    #[serde(default)]
    full: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    success: bool,
    is_new_visitor: bool,
    total_views: u64,
    total_unique_visitors: usize,
    visitor_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse<'a> {
    success: bool,
    #[serde(flatten)]
    stats: SnapshotStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<&'a BTreeMap<String, VisitorRecord>>,
}

/// `GET /`
async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "trackView": "GET|POST /track-view",
            "stats": "GET /stats?full=true",
            "health": "GET /health",
        },
    }))
}

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /track-view?page=...`
async fn track_get_handler<C, L>(
    State(state): State<Arc<AppState<C, L>>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<TrackResponse>, ApiError>
where
    C: Channel + 'static,
    L: Lock + 'static,
{
    track(state, connect, &headers, query.page).await
}

/// `POST /track-view` with an optional JSON body. Bodies that do not parse are
/// treated as empty rather than rejected.
async fn track_post_handler<C, L>(
    State(state): State<Arc<AppState<C, L>>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
    body: Bytes,
) -> Result<Json<TrackResponse>, ApiError>
where
    C: Channel + 'static,
    L: Lock + 'static,
{
    let from_body = serde_json::from_slice::<PageQuery>(&body)
        .ok()
        .and_then(|b| b.page);
    track(state, connect, &headers, query.page.or(from_body)).await
}

async fn track<C, L>(
    state: Arc<AppState<C, L>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    page: Option<String>,
) -> Result<Json<TrackResponse>, ApiError>
where
    C: Channel + 'static,
    L: Lock + 'static,
{
    let referer = header(headers, REFERER.as_str());
    if !state.gate.check(referer, header(headers, ORIGIN.as_str())) {
        return Err(ApiError::Unauthorized);
    }

    let client_ip = client_ip(
        header(headers, FORWARDED_FOR),
        header(headers, REAL_IP),
        connect.map(|ConnectInfo(addr)| addr.ip()),
    )
    .ok_or(ApiError::NoClientAddress)?;

    let page = page
        .filter(|p| !p.trim().is_empty())
        .or_else(|| referer.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let hit = Hit {
        client_ip,
        user_agent: header(headers, USER_AGENT.as_str()).map(str::to_string),
        page,
    };

    let outcome = tokio::task::spawn_blocking(move || state.tracker.track(&hit))
        .await
        .map_err(|e| ApiError::Task(e.to_string()))??;

    Ok(Json(TrackResponse {
        success: true,
        is_new_visitor: outcome.hit.is_new,
        total_views: outcome.hit.record.total_views,
        total_unique_visitors: outcome.hit.unique_visitors,
        visitor_id: outcome.hit.record.visitor_id(),
    }))
}

/// `GET /stats?full=true`
async fn stats_handler<C, L>(
    State(state): State<Arc<AppState<C, L>>>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError>
where
    C: Channel + 'static,
    L: Lock + 'static,
{
    let report = tokio::task::spawn_blocking(move || state.tracker.report())
        .await
        .map_err(|e| ApiError::Task(e.to_string()))??;

    let Report { snapshot, stats } = report;
    let body = StatsResponse {
        success: true,
        stats,
        version: query.full.then(|| snapshot.version().clone()),
        snapshot: query.full.then(|| snapshot.as_map()),
    };
    Ok(Json(body).into_response())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
