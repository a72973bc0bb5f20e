//! Endpoint handlers.
//!
//! Each session endpoint maps one-to-one onto a [`WizardAction`], awaits every fetch or
//! submission the action triggers, and answers with the resulting view.

use crate::dto::{CreateSessionReq, DetailsReq, ErrorRes, HealthRes, SelectReq, SessionRes};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use carebook_core::{BookingSession, EntityId, Flow, StepId, WizardAction, WizardError, WizardView};
use carebook_uuid::SessionId;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ApiResult<T> = Result<T, (StatusCode, Json<ErrorRes>)>;

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorRes>) {
    (
        status,
        Json(ErrorRes {
            error: message.into(),
            field_errors: BTreeMap::new(),
        }),
    )
}

/// Refused actions are conflicts with the wizard's state, except invalid drafts.
fn wizard_error(err: WizardError) -> (StatusCode, Json<ErrorRes>) {
    let message = err.to_string();
    match err {
        WizardError::InvalidDraft(field_errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorRes {
                error: message,
                field_errors,
            }),
        ),
        _ => error(StatusCode::CONFLICT, message),
    }
}

fn parse_session_id(id: &str) -> ApiResult<SessionId> {
    SessionId::parse(id).map_err(|e| {
        tracing::debug!("Invalid session id {:?}: {}", id, e);
        error(StatusCode::BAD_REQUEST, "Invalid session id")
    })
}

async fn load_session(state: &AppState, id: &str) -> ApiResult<Arc<BookingSession>> {
    let id = parse_session_id(id)?;
    state
        .session(&id)
        .await
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Session not found"))
}

fn session_res(session: &BookingSession, view: WizardView) -> Json<SessionRes> {
    Json(SessionRes {
        session_id: session.id().to_string(),
        view,
    })
}

async fn act(state: &AppState, id: &str, action: WizardAction) -> ApiResult<Json<SessionRes>> {
    let session = load_session(state, id).await?;
    let view = session.dispatch(action).await.map_err(wizard_error)?;
    Ok(session_res(&session, view))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Carebook REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionReq,
    responses(
        (status = 201, description = "Session created and first step loaded", body = SessionRes),
        (status = 400, description = "Unknown flow", body = ErrorRes)
    )
)]
/// Start a booking wizard for one flow
///
/// Creates an in-memory session and loads the choices of its first step.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionReq>,
) -> ApiResult<(StatusCode, Json<SessionRes>)> {
    let flow: Flow = req
        .flow
        .parse()
        .map_err(|e: String| error(StatusCode::BAD_REQUEST, e))?;

    let session = state.create_session(flow).await;
    let view = session.start().await.map_err(wizard_error)?;
    Ok((StatusCode::CREATED, session_res(&session, view)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id (32 lowercase hex)")),
    responses(
        (status = 200, description = "Current view", body = SessionRes),
        (status = 400, description = "Invalid session id", body = ErrorRes),
        (status = 404, description = "Session not found", body = ErrorRes)
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    let session = load_session(&state, &id).await?;
    let view = session.view();
    Ok(session_res(&session, view))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id (32 lowercase hex)")),
    responses(
        (status = 204, description = "Session removed"),
        (status = 400, description = "Invalid session id", body = ErrorRes),
        (status = 404, description = "Session not found", body = ErrorRes)
    )
)]
/// Discard a wizard session and everything drafted in it
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_session_id(&id)?;
    if state.remove_session(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, "Session not found"))
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/enter/{step}",
    params(
        ("id" = String, Path, description = "Session id"),
        ("step" = String, Path, description = "Step to enter, e.g. `city`")
    ),
    responses(
        (status = 200, description = "Step entered", body = SessionRes),
        (status = 400, description = "Invalid id or step", body = ErrorRes),
        (status = 404, description = "Session not found", body = ErrorRes),
        (status = 409, description = "Upstream selection missing", body = ErrorRes)
    )
)]
pub async fn enter_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
) -> ApiResult<Json<SessionRes>> {
    let step: StepId = step
        .parse()
        .map_err(|e: String| error(StatusCode::BAD_REQUEST, e))?;
    act(&state, &id, WizardAction::Enter(step)).await
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/select",
    request_body = SelectReq,
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Draft selection recorded", body = SessionRes),
        (status = 409, description = "Step loading or choice unavailable", body = ErrorRes)
    )
)]
/// Record a draft choice for the active step
pub async fn select_choice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SelectReq>,
) -> ApiResult<Json<SessionRes>> {
    let session = load_session(&state, &id).await?;
    let step = session
        .active_step()
        .unwrap_or_else(|| session.flow().first());
    let view = session
        .dispatch(WizardAction::SelectChoice {
            step,
            choice: EntityId::new(req.choice_id),
        })
        .await
        .map_err(wizard_error)?;
    Ok(session_res(&session, view))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Draft confirmed and next step entered", body = SessionRes),
        (status = 409, description = "No valid draft", body = ErrorRes)
    )
)]
pub async fn advance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    act(&state, &id, WizardAction::Advance).await
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/retreat",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Previous step entered", body = SessionRes),
        (status = 409, description = "Already at the first step", body = ErrorRes)
    )
)]
pub async fn retreat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    act(&state, &id, WizardAction::Retreat).await
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/reset",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Wizard restarted", body = SessionRes),
        (status = 409, description = "Submission in flight", body = ErrorRes)
    )
)]
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    act(&state, &id, WizardAction::Reset).await
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/refresh",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Choices of the active step reloaded", body = SessionRes),
        (status = 409, description = "Active step has no choices", body = ErrorRes)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    act(&state, &id, WizardAction::Refresh).await
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/details",
    request_body = DetailsReq,
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Details draft replaced", body = SessionRes),
        (status = 400, description = "Attachment could not be accepted", body = ErrorRes),
        (status = 409, description = "Not at the details step", body = ErrorRes)
    )
)]
pub async fn update_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DetailsReq>,
) -> ApiResult<Json<SessionRes>> {
    let details = req
        .into_details(state.max_attachment_bytes())
        .map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    act(&state, &id, WizardAction::EditDetails(details)).await
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/submit",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Submission finished; see the view state and notice", body = SessionRes),
        (status = 409, description = "Not at the details step, or booking complete", body = ErrorRes),
        (status = 422, description = "Details failed validation", body = ErrorRes)
    )
)]
/// Submit the booking
///
/// Validates the details, posts the booking once and returns the outcome. A submit sent
/// while another is in flight for the same session is ignored.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRes>> {
    act(&state, &id, WizardAction::Submit).await
}
