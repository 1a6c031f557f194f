//! HTTP/WebSocket API for the roulette server.
//!
//! # Modules
//!
//! - [`rounds`]: Round start, bet placement and draw verification
//! - [`users`]: Balance lookup
//! - [`websocket`]: Live `{channel, event, data}` frames through the hub
//! - [`request_id`]: Request correlation and access logging
//! - [`response`]: Response envelope and error mapping
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                               - Database and hub status
//! GET  /ws                                   - WebSocket
//! POST /api/v1/roulette/start                - Start and roll a round
//! POST /api/v1/roulette/rounds               - Open a round without rolling
//! GET  /api/v1/roulette/{uuid}               - Round details
//! POST /api/v1/roulette/{uuid}/roll          - Roll an open round
//! POST /api/v1/roulette/{uuid}/place-bet     - Place up to two stakes
//! GET  /api/v1/roulette/{uuid}/draw          - Provably fair record
//! GET  /api/v1/users/{uuid}/balance          - Current balance
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use roulette_server::api::{create_router, AppState};
//! # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. In production, configure appropriate
//! origins, methods, and headers.

pub mod request_id;
pub mod response;
pub mod rounds;
pub mod users;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use roulette::{Database, Dispatcher, HubHandle, RoundManager};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub rounds: Arc<RoundManager>,
    pub hub: HubHandle,
    pub dispatcher: Dispatcher,
    pub db: Database,
    /// Deadline for one HTTP request
    pub request_timeout: Duration,
    /// Outbound frame buffer per WebSocket connection
    pub ws_buffer: usize,
    /// Open WebSocket connections
    pub ws_connections: Arc<websocket::ConnectionGauge>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router())
        .layer(timeout_layer(state.request_timeout))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Versioned routes, nested under `/api/v1`
fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/roulette/start", post(rounds::play_round))
        .route("/roulette/rounds", post(rounds::start_round))
        .route("/roulette/{round_id}", get(rounds::get_round))
        .route("/roulette/{round_id}/roll", post(rounds::roll_round))
        .route("/roulette/{round_id}/place-bet", post(rounds::place_bet))
        .route("/roulette/{round_id}/draw", get(rounds::get_draw))
        .route("/users/{user_id}/balance", get(users::get_balance))
}

/// Bound synchronous request work; an expired request answers `504`.
///
/// Dropping the handler future rolls back any open storage transaction.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, timeout)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers and the hub actor is running,
/// `503 Service Unavailable` otherwise.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","database":true,"hub":{"healthy":true,...},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = state.db.health_check().await.is_ok();
    let hub_stats = state.hub.stats().await.ok();
    let hub_healthy = hub_stats.is_some();

    let overall_healthy = db_healthy && hub_healthy;
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "hub": {
            "healthy": hub_healthy,
            "stats": hub_stats,
        },
        "dispatcher": state.dispatcher.stats(),
        "websocket_connections": state.ws_connections.active(),
        "next_nonce": state.rounds.next_nonce(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    fn slow_app(timeout: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(timeout_layer(timeout))
    }

    fn request(path: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_expired_request_answers_gateway_timeout() {
        let response = slow_app(Duration::from_millis(50))
            .oneshot(request("/slow"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_request_within_deadline_passes() {
        let response = slow_app(Duration::from_millis(50))
            .oneshot(request("/fast"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
