use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::WithRejection;

use crate::auth::{AdminUser, AuthUser};
use crate::model::OwnerInput;

use super::response::{created, ok, parse_id, ApiResult};
use super::{AppState, JsonBody, PathParam};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/owners", get(list_owners).post(create_owner))
        .route("/owners/:id", get(owner_with_cars).put(update_owner).delete(delete_owner))
}

async fn list_owners(State(state): State<AppState>, _caller: AuthUser) -> ApiResult {
    ok("Owners retrieved successfully", state.engine.list_owners().await?)
}

async fn create_owner(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Json(input), _): JsonBody<OwnerInput>,
) -> ApiResult {
    created("Owner created successfully", state.engine.create_owner(input).await?)
}

async fn owner_with_cars(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("owner", &id)?;
    ok("Owner retrieved successfully", state.engine.owner_with_cars(id).await?)
}

async fn update_owner(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(id), _): PathParam<String>,
    WithRejection(Json(input), _): JsonBody<OwnerInput>,
) -> ApiResult {
    let id = parse_id("owner", &id)?;
    ok("Owner updated successfully", state.engine.update_owner(id, input).await?)
}

async fn delete_owner(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("owner", &id)?;
    state.engine.delete_owner(id).await?;
    ok("Owner deleted successfully", serde_json::json!({ "id": id }))
}
