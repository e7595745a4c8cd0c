use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::auth::AdminUser;
use crate::engine::EngineError;
use crate::model::CreationStage;

use super::response::{created, ok, parse_id, ApiResult};
use super::{AppState, JsonBody, PathParam};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/cars/create/init", post(initiate))
        .route("/cars/create/:session_id/progress", get(progress))
        .route("/cars/create/:session_id/:step", post(submit_step))
}

#[derive(Debug, Serialize)]
struct SessionStarted {
    session_id: Ulid,
    car_id: Ulid,
    current_step: CreationStage,
    expires_at: DateTime<Utc>,
}

async fn initiate(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let session = state.engine.initiate_creation().await?;
    created(
        "Car creation session started",
        SessionStarted {
            session_id: session.id,
            car_id: session.car_id,
            current_step: session.stage,
            expires_at: session.expires_at,
        },
    )
}

async fn progress(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(session_id), _): PathParam<String>,
) -> ApiResult {
    let session_id = parse_id("creation session", &session_id)?;
    ok(
        "Creation progress retrieved successfully",
        state.engine.creation_progress(session_id).await?,
    )
}

async fn submit_step(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path((session_id, step)), _): PathParam<(String, String)>,
    WithRejection(Json(body), _): JsonBody<serde_json::Value>,
) -> ApiResult {
    let session_id = parse_id("creation session", &session_id)?;
    let stage = CreationStage::from_route(&step).map_err(|e| EngineError::InvalidInput(e.to_string()))?;
    let outcome = state.engine.submit_step_json(session_id, stage, body).await?;
    let message = outcome.message.clone();
    ok(message, outcome)
}
