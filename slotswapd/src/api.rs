//! HTTP API for the SlotSwap daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Slot CRUD (`/api/events`)
//! - Swap marketplace, requests and responses
//! - Swap notifications as a server-sent event stream
//!
//! Every `/api` route identifies the caller through [`AuthenticatedUser`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use slotswap_coordinator::{
    CoordinatorError, CreateSlot, RequestSwap, RespondToSwap, SlotService, SwapCoordinator,
    SwapDetails, SwapRequestLists, SwapResolution,
};
use slotswap_domain::{Slot, SlotPatch};
use slotswap_store::Store;

use crate::event_bus::EventBus;
use crate::identity::AuthenticatedUser;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub slots: SlotService<S>,
    pub swaps: SwapCoordinator<S>,
    pub event_bus: Arc<EventBus>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictBody>,
}

impl ErrorResponse {
    /// Plain error without retry or conflict details.
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { error: error.into(), kind: kind.into(), retryable: None, conflict: None }
    }
}

/// Details of a time overlap.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBody {
    pub existing: Slot,
    pub next_available: DateTime<Utc>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/events", post(create_slot_handler::<S>))
        .route("/api/events/me", get(my_slots_handler::<S>))
        .route("/api/events/other-events", get(other_slots_handler::<S>))
        .route(
            "/api/events/:id",
            patch(update_slot_handler::<S>).delete(delete_slot_handler::<S>),
        )
        .route("/api/swappable-slots", get(swappable_handler::<S>))
        .route("/api/swap-request", post(request_swap_handler::<S>))
        .route("/api/swap-response/:id", post(respond_handler::<S>))
        .route("/api/swap-requests", get(swap_requests_handler::<S>))
        .route("/api/swap-requests/history", get(history_handler::<S>))
        .route("/api/notifications", get(notifications_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a BUSY slot for the caller.
async fn create_slot_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<CreateSlot>, JsonRejection>,
) -> Result<(StatusCode, Json<Slot>), ApiError>
where
    S: Store + 'static,
{
    let Json(input) = payload.map_err(bad_body)?;
    let slot = state.slots.create_slot(user, input).await.map_err(to_error_response)?;
    Ok((StatusCode::CREATED, Json(slot)))
}

/// Slots owned by the caller.
async fn my_slots_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Slot>>, ApiError>
where
    S: Store + 'static,
{
    let slots = state.slots.list_owned_by(user).await.map_err(to_error_response)?;
    Ok(Json(slots))
}

/// Slots owned by everyone else.
async fn other_slots_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Slot>>, ApiError>
where
    S: Store + 'static,
{
    let slots = state.slots.list_not_owned_by(user).await.map_err(to_error_response)?;
    Ok(Json(slots))
}

/// Edit a slot the caller owns.
async fn update_slot_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<SlotPatch>, JsonRejection>,
) -> Result<Json<Slot>, ApiError>
where
    S: Store + 'static,
{
    let Json(patch) = payload.map_err(bad_body)?;
    let slot = state.slots.update_slot(user, id, patch).await.map_err(to_error_response)?;
    Ok(Json(slot))
}

/// Delete a slot the caller owns.
async fn delete_slot_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
    S: Store + 'static,
{
    state.slots.delete_slot(user, id).await.map_err(to_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Marketplace: SWAPPABLE slots of other users.
async fn swappable_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Slot>>, ApiError>
where
    S: Store + 'static,
{
    let slots = state.swaps.list_swappable(user).await.map_err(to_error_response)?;
    Ok(Json(slots))
}

/// Offer one of the caller's slots for someone else's.
async fn request_swap_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<RequestSwap>, JsonRejection>,
) -> Result<(StatusCode, Json<SwapDetails>), ApiError>
where
    S: Store + 'static,
{
    let Json(input) = payload.map_err(bad_body)?;
    let details = state.swaps.request_swap(user, input).await.map_err(to_error_response)?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Accept or reject a request addressed to the caller.
async fn respond_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<RespondToSwap>, JsonRejection>,
) -> Result<Json<SwapResolution>, ApiError>
where
    S: Store + 'static,
{
    let Json(input) = payload.map_err(bad_body)?;
    let resolution =
        state.swaps.respond_to_swap(user, id, input).await.map_err(to_error_response)?;
    Ok(Json(resolution))
}

/// Pending requests in both directions.
async fn swap_requests_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SwapRequestLists>, ApiError>
where
    S: Store + 'static,
{
    let lists = state.swaps.list_swap_requests(user).await.map_err(to_error_response)?;
    Ok(Json(lists))
}

/// Every request the caller took part in.
async fn history_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<SwapDetails>>, ApiError>
where
    S: Store + 'static,
{
    let history = state.swaps.list_swap_history(user).await.map_err(to_error_response)?;
    Ok(Json(history))
}

/// Stream of swap events the caller is a party to.
async fn notifications_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> impl IntoResponse
where
    S: Store + 'static,
{
    let mut receiver = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        while let Some(next) = receiver.recv().await {
            match next {
                Ok(notification) if notification.concerns(user) => {
                    match Event::default().event(&notification.name).json_data(&notification.event) {
                        Ok(event) => yield Ok::<Event, Infallible>(event),
                        Err(e) => warn!(%user, error = %e, "Failed to encode notification"),
                    }
                },
                Ok(_) => {},
                Err(lag) => warn!(%user, %lag, "Notification stream lagged"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// =============================================================================
// Error mapping
// =============================================================================

fn bad_body(rejection: JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(format!("Invalid request body: {}", rejection.body_text()), "validation")),
    )
}

fn to_error_response(error: CoordinatorError) -> ApiError {
    let status = match &error {
        CoordinatorError::Validation(_) => StatusCode::BAD_REQUEST,
        CoordinatorError::Authorization(_) => StatusCode::FORBIDDEN,
        CoordinatorError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoordinatorError::Conflict { .. } | CoordinatorError::State { .. } => StatusCode::CONFLICT,
        CoordinatorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        warn!(error = %error, "Request failed on storage");
    }

    let mut body = ErrorResponse::new(error.to_string(), error.kind());
    match error {
        CoordinatorError::State { retryable, .. } => body.retryable = Some(retryable),
        CoordinatorError::Conflict { existing, next_available } => {
            body.conflict = Some(ConflictBody { existing: *existing, next_available });
        },
        _ => {},
    }

    (status, Json(body))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use slotswap_coordinator::NotificationSink;
    use slotswap_engine::Engine;
    use slotswap_store::{MemoryStore, StoreError};
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let event_bus = Arc::new(EventBus::new(100));
        let sink: Arc<dyn NotificationSink> = event_bus.clone();
        let engine = Engine::default();

        let state = Arc::new(ApiState {
            slots: SlotService::new(Arc::clone(&store), engine.clone()),
            swaps: SwapCoordinator::new(store, sink, engine),
            event_bus,
        });

        create_router(state)
    }

    fn json_request(method: &str, uri: &str, user: Uuid, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user.to_string())
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_api_requires_user_header() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/api/events/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_create_slot_created() {
        let app = create_test_app();
        let alice = Uuid::now_v7();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/events",
                alice,
                serde_json::json!({
                    "title": "Gym",
                    "startTime": "2025-03-10T17:00:00Z",
                    "endTime": "2025-03-10T18:00:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "BUSY");
        assert_eq!(body["owner"], alice.to_string());
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = create_test_app();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/events",
                Uuid::now_v7(),
                serde_json::json!({ "title": "Gym" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_respond_unknown_request_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/swap-response/{}", Uuid::now_v7()),
                Uuid::now_v7(),
                serde_json::json!({ "accept": true }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CoordinatorError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (CoordinatorError::Authorization("no".into()), StatusCode::FORBIDDEN),
            (CoordinatorError::not_found("slot", Uuid::now_v7()), StatusCode::NOT_FOUND),
            (CoordinatorError::state("locked"), StatusCode::CONFLICT),
            (
                CoordinatorError::Storage(StoreError::Database("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let (status, Json(body)) = to_error_response(error);
            assert_eq!(status, expected);
            assert!(body.conflict.is_none());
        }
    }

    #[test]
    fn test_write_conflict_body_is_retryable() {
        let error: CoordinatorError = StoreError::WriteConflict("slot changed".into()).into();
        let (status, Json(body)) = to_error_response(error);

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.kind, "state");
        assert_eq!(body.retryable, Some(true));
    }
}
