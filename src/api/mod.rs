//! HTTP surface: axum router, handlers and the JSON envelope.

mod bookings;
mod cars;
mod creation;
mod owners;
mod response;
mod users;

pub use response::{parse_id, status_of, ApiResponse, ApiResult};

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::routing::get;
use axum::{middleware, Json, Router};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::TokenKeys;
use crate::engine::{Engine, EngineError};
use crate::model::PageRequest;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, tokens: Arc<TokenKeys>) -> Self {
        Self { engine, tokens }
    }
}

/// Extractors whose failures render through the envelope as 400s.
pub(crate) type JsonBody<T> = WithRejection<Json<T>, EngineError>;
pub(crate) type QueryParams<T> = WithRejection<Query<T>, EngineError>;
pub(crate) type PathParam<T> = WithRejection<Path<T>, EngineError>;

/// `?page=&limit=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest::new(q.page, q.limit)
    }
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(bookings::routes())
        .merge(cars::routes())
        .merge(creation::routes())
        .merge(owners::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/auth", users::routes())
        .nest("/api", api)
        .route_layer(middleware::from_fn(observability::track_http))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
