use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::model::BookingFilter;

use super::response::{created, ok, parse_id, ApiResult};
use super::{AppState, JsonBody, PageQuery, PathParam, QueryParams};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/:id", get(get_booking).delete(cancel_booking))
        .route("/users/:id/bookings", get(list_user_bookings))
}

#[derive(Debug, Deserialize)]
struct CreateBooking {
    car_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(body), _): JsonBody<CreateBooking>,
) -> ApiResult {
    let car_id = parse_id("car", &body.car_id)?;
    let booking = state
        .engine
        .create_booking(user.id(), car_id, body.start_time, body.end_time)
        .await?;
    created("Booking created successfully", booking)
}

async fn get_booking(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("booking", &id)?;
    ok("Booking retrieved successfully", state.engine.get_booking(id, actor).await?)
}

async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let id = parse_id("booking", &id)?;
    ok("Booking cancelled successfully", state.engine.cancel_booking(id, user.id()).await?)
}

async fn list_user_bookings(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    WithRejection(Path(id), _): PathParam<String>,
) -> ApiResult {
    let user_id = parse_id("user", &id)?;
    ok(
        "User bookings retrieved successfully",
        state.engine.list_user_bookings(user_id, actor).await?,
    )
}

async fn list_bookings(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    WithRejection(Query(filter), _): QueryParams<BookingFilter>,
    WithRejection(Query(page), _): QueryParams<PageQuery>,
) -> ApiResult {
    let page = state.engine.list_bookings(actor, &filter, page.into()).await?;
    ok("Bookings retrieved successfully", page)
}
