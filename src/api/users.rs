use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::model::{NewAccount, Role, User};

use super::response::{created, ok, ApiResult};
use super::{AppState, JsonBody};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct Session {
    token: String,
    user: User,
}

/// Self-service sign-up always yields a regular user.
async fn register(
    State(state): State<AppState>,
    WithRejection(Json(body), _): JsonBody<NewAccount>,
) -> ApiResult {
    let user = state
        .engine
        .register(&body.name, &body.email, &body.password, Role::User)
        .await?;
    let token = state.tokens.issue(&user)?;
    created("User registered successfully", Session { token, user })
}

async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): JsonBody<Credentials>,
) -> ApiResult {
    let user = state.engine.login(&body.email, &body.password).await?;
    let token = state.tokens.issue(&user)?;
    ok("Login successful", Session { token, user })
}

async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult {
    ok("User retrieved successfully", state.engine.user(user.id()).await?)
}
