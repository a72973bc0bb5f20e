//! # API REST
//!
//! REST API implementation for Carebook.
//!
//! Handles:
//! - HTTP endpoints with axum over in-memory booking wizard sessions
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status mapping)

#![warn(rust_2018_idioms)]

pub mod dto;
mod handlers;
mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::enter_step,
        handlers::select_choice,
        handlers::advance,
        handlers::retreat,
        handlers::reset,
        handlers::refresh,
        handlers::update_details,
        handlers::submit,
    ),
    components(schemas(
        dto::HealthRes,
        dto::CreateSessionReq,
        dto::SessionRes,
        dto::SelectReq,
        dto::AttachmentReq,
        dto::DetailsReq,
        dto::ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Headroom above the encoded attachment for the other details fields.
const BODY_HEADROOM_BYTES: u64 = 64 * 1024;

/// Largest request body the router accepts: an attachment of `max_attachment_bytes`
/// encoded as base64, plus headroom for the rest of the JSON.
pub fn request_body_limit(max_attachment_bytes: u64) -> usize {
    let encoded = max_attachment_bytes.div_ceil(3).saturating_mul(4);
    usize::try_from(encoded.saturating_add(BODY_HEADROOM_BYTES)).unwrap_or(usize::MAX)
}

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    let body_limit = request_body_limit(state.max_attachment_bytes());
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:id/enter/:step", post(handlers::enter_step))
        .route("/sessions/:id/select", post(handlers::select_choice))
        .route("/sessions/:id/advance", post(handlers::advance))
        .route("/sessions/:id/retreat", post(handlers::retreat))
        .route("/sessions/:id/reset", post(handlers::reset))
        .route("/sessions/:id/refresh", post(handlers::refresh))
        .route("/sessions/:id/details", put(handlers::update_details))
        .route("/sessions/:id/submit", post(handlers::submit))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use carebook_core::{
        ApiError, BookingApi, BookingConfig, BookingConfirmation, BookingSubmission, Choice,
        EntityId, StepQuery,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct CatalogueApi;

    #[async_trait]
    impl BookingApi for CatalogueApi {
        async fn fetch_choices(&self, query: &StepQuery) -> Result<Vec<Choice>, ApiError> {
            Ok(match query {
                StepQuery::Specializations => vec![Choice::new("1", "Cardiology")],
                StepQuery::Cities { .. } => vec![Choice::new("9", "Cairo")],
                StepQuery::Providers { .. } => vec![Choice::new("P17", "Dr. Amal")],
                StepQuery::Clinics { .. } => Vec::new(),
                StepQuery::ClinicSlots { .. } => Vec::new(),
                StepQuery::HomeSlots { .. } => {
                    vec![Choice::new("H1", "2026-11-03 18:00").with_price(500.0)]
                }
            })
        }

        async fn submit_booking(
            &self,
            submission: &BookingSubmission,
        ) -> Result<BookingConfirmation, ApiError> {
            Ok(BookingConfirmation {
                id: EntityId::new(format!("B-{}", submission.field("slot_id").unwrap_or("?"))),
                status: None,
                message: None,
            })
        }
    }

    fn state_with_limit(max_attachment_bytes: u64) -> AppState {
        let config = BookingConfig::new(
            "http://remote.invalid",
            "patient-42",
            None,
            Duration::from_secs(5),
            max_attachment_bytes,
        )
        .expect("valid config");
        AppState::new(Arc::new(CatalogueApi), &config)
    }

    fn app() -> Router {
        router(state_with_limit(1024))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .expect("request");

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn create(app: &Router, flow: &str) -> String {
        let (status, body) = call(app, Method::POST, "/sessions", Some(json!({"flow": flow}))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["session_id"].as_str().expect("session id").to_string()
    }

    async fn choose(app: &Router, id: &str, choice: &str) -> Value {
        let (status, body) = call(
            app,
            Method::POST,
            &format!("/sessions/{id}/select"),
            Some(json!({"choice_id": choice})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let (status, body) = call(app, Method::POST, &format!("/sessions/{id}/advance"), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_create_session_loads_first_step() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, "/sessions", Some(json!({"flow": "clinic"}))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session_id"].as_str().map(str::len), Some(32));
        assert_eq!(body["view"]["step"], "specialization");
        assert_eq!(body["view"]["choices"]["status"], "ready");
        assert_eq!(body["view"]["choices"]["choices"][0]["label"], "Cardiology");
    }

    #[tokio::test]
    async fn test_unknown_flow_and_session_ids() {
        let app = app();
        let (status, _) =
            call(&app, Method::POST, "/sessions", Some(json!({"flow": "teleport"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/sessions/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::GET,
            "/sessions/550e8400e29b41d4a716446655440000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found");
    }

    #[tokio::test]
    async fn test_guard_violation_is_conflict() {
        let app = app();
        let id = create(&app, "clinic").await;

        let (status, body) =
            call(&app, Method::POST, &format!("/sessions/{id}/enter/slot"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["error"],
            "cannot enter slot: missing selection for location"
        );

        let (status, _) =
            call(&app, Method::POST, &format!("/sessions/{id}/enter/lobby"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_clinics_are_reported() {
        let app = app();
        let id = create(&app, "clinic").await;
        choose(&app, &id, "1").await;
        choose(&app, &id, "9").await;
        let view = choose(&app, &id, "P17").await;

        assert_eq!(view["view"]["step"], "location");
        assert_eq!(view["view"]["choices"]["status"], "empty");
        assert_eq!(view["view"]["choices"]["message"], "no clinics available");
        assert_eq!(view["view"]["can_advance"], false);

        let (status, _) = call(&app, Method::POST, &format!("/sessions/{id}/advance"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_at_home_booking_over_rest() {
        let app = app();
        let id = create(&app, "at_home").await;
        choose(&app, &id, "1").await;
        choose(&app, &id, "9").await;
        choose(&app, &id, "P17").await;
        let view = choose(&app, &id, "H1").await;
        assert_eq!(view["view"]["step"], "details");
        assert_eq!(view["view"]["total_price"], 500.0);

        let details = json!({
            "contact_name": "Mona Adel",
            "phone": "+20 100 123 4567",
            "condition": "Fever for three days"
        });
        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/sessions/{id}/details"),
            Some(details.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::POST, &format!("/sessions/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["field_errors"]["payment_proof"].is_string());

        let mut with_proof = details;
        with_proof["payment_proof"] = json!({
            "filename": "receipt.txt",
            "content_base64": "cGFpZCA1MDA="
        });
        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/sessions/{id}/details"),
            Some(with_proof),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["details"]["payment_proof"]["size_bytes"], 8);

        let (status, body) = call(&app, Method::POST, &format!("/sessions/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["view"]["state"], "complete");
        assert_eq!(body["view"]["confirmation"]["id"], "B-H1");

        let (status, _) = call(&app, Method::POST, &format!("/sessions/{id}/retreat"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = call(&app, Method::POST, &format!("/sessions/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["step"], "specialization");
    }

    #[test]
    fn test_request_body_limit_fits_encoded_attachment() {
        assert_eq!(request_body_limit(3), 4 + 64 * 1024);
        assert_eq!(request_body_limit(4), 8 + 64 * 1024);
        assert!(request_body_limit(5 * 1024 * 1024) > 5 * 1024 * 1024 * 4 / 3);
    }

    #[tokio::test]
    async fn test_attachment_near_limit_reaches_handler() {
        const LIMIT: u64 = 3 * 1024 * 1024;
        let app = router(state_with_limit(LIMIT));
        let id = create(&app, "clinic").await;
        let details = |size: u64| {
            json!({
                "contact_name": "Mona Adel",
                "phone": "+20 100 123 4567",
                "payment_proof": {
                    "filename": "receipt.bin",
                    "content_base64": general_purpose::STANDARD.encode(vec![7u8; size as usize]),
                }
            })
        };

        // Over the default axum limit but within ours: decoded and handed to the wizard,
        // which refuses details before the last step.
        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/sessions/{id}/details"),
            Some(details(LIMIT)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/sessions/{id}/details"),
            Some(details(LIMIT + 1)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("limit"), "{body}");

        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/sessions/{id}/details"),
            Some(details(LIMIT * 2)),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let app = app();
        let id = create(&app, "clinic").await;

        let (status, _) = call(&app, Method::DELETE, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, "/sessions/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let state = state_with_limit(1024);
        let app = router(state.clone());
        let id = create(&app, "at_home").await;

        assert_eq!(state.evict_idle(Duration::from_secs(60)).await, 0);
        let (status, _) = call(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(state.evict_idle(Duration::ZERO).await, 1);
        let (status, _) = call(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_background_eviction_sweeps() {
        let state = state_with_limit(1024);
        let app = router(state.clone());
        let id = create(&app, "clinic").await;

        let sweeper = state.spawn_eviction(Duration::ZERO, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        let (status, _) = call(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
