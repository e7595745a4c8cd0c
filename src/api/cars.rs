use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::auth::{AdminUser, AuthUser};
use crate::model::{CarFilter, CarPatch, NewCar};

use super::response::{created, ok, parse_id, ApiResult};
use super::{AppState, JsonBody, PageQuery, PathParam, QueryParams};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/cars", get(list_cars).post(create_car))
        .route("/cars/available", get(available_cars))
        .route("/cars/:id", get(car_details).put(update_car).delete(delete_car))
        .route("/cars/:id/conflicts", get(check_conflict))
        .route("/cars/:id/toggle-availability", put(toggle_availability))
}

#[derive(Debug, Deserialize)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ConflictCheck {
    car_id: Ulid,
    has_conflict: bool,
}

async fn list_cars(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Query(filter), _): QueryParams<CarFilter>,
    WithRejection(Query(page), _): QueryParams<PageQuery>,
) -> ApiResult {
    ok("Cars retrieved successfully", state.engine.list_cars(&filter, page.into()).await?)
}

async fn create_car(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Json(new), _): JsonBody<NewCar>,
) -> ApiResult {
    created("Car created successfully", state.engine.create_car(new).await?)
}

async fn available_cars(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Query(w), _): QueryParams<Window>,
) -> ApiResult {
    ok(
        "Available cars retrieved successfully",
        state.engine.available_cars(w.start, w.end).await?,
    )
}

async fn car_details(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("car", &id)?;
    ok("Car retrieved successfully", state.engine.car_details(id).await?)
}

async fn update_car(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(id), _): PathParam<String>,
    WithRejection(Json(patch), _): JsonBody<CarPatch>,
) -> ApiResult {
    let id = parse_id("car", &id)?;
    ok("Car updated successfully", state.engine.update_car(id, patch).await?)
}

async fn delete_car(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("car", &id)?;
    state.engine.delete_car(id).await?;
    ok("Car deleted successfully", serde_json::json!({ "id": id }))
}

async fn check_conflict(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
    WithRejection(Query(w), _): QueryParams<Window>,
) -> ApiResult {
    let car_id = parse_id("car", &id)?;
    let has_conflict = state.engine.has_conflict(car_id, w.start, w.end).await?;
    ok("Conflict check completed", ConflictCheck { car_id, has_conflict })
}

async fn toggle_availability(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("car", &id)?;
    ok(
        "Car availability updated successfully",
        state.engine.toggle_car_availability(id).await?,
    )
}
