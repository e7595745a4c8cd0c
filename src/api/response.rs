use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::parse_any_id;

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub status_code: u16,
}

pub type ApiResult = Result<Response, EngineError>;

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> ApiResult {
    let body = ApiResponse {
        success: true,
        message: message.into(),
        data: Some(data),
        errors: None,
        status_code: status.as_u16(),
    };
    Ok((status, Json(body)).into_response())
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> ApiResult {
    respond(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> ApiResult {
    respond(StatusCode::CREATED, message, data)
}

pub fn status_of(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidInput(_)
        | EngineError::InvalidTimeRange
        | EngineError::InvalidDuration { .. }
        | EngineError::InvalidState { .. }
        | EngineError::InvalidStep { .. }
        | EngineError::Expired(_) => StatusCode::BAD_REQUEST,
        EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(..) => StatusCode::NOT_FOUND,
        EngineError::CarUnavailable(_)
        | EngineError::AlreadyBooked(_)
        | EngineError::MissingRates(_)
        | EngineError::DuplicateVehicleNumber(_)
        | EngineError::DuplicateEmail(_)
        | EngineError::HasDependents(_) => StatusCode::CONFLICT,
        EngineError::Store(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        let (message, errors) = if status.is_server_error() {
            tracing::error!("request failed: {self}");
            ("internal server error".to_string(), None)
        } else {
            tracing::warn!("request rejected ({}): {self}", status.as_u16());
            let message = status.canonical_reason().unwrap_or("error").to_string();
            (message, Some(vec![self.to_string()]))
        };
        let body = ApiResponse::<()> {
            success: false,
            message,
            data: None,
            errors,
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for EngineError {
    fn from(r: JsonRejection) -> Self {
        EngineError::InvalidInput(r.body_text())
    }
}

impl From<QueryRejection> for EngineError {
    fn from(r: QueryRejection) -> Self {
        EngineError::InvalidInput(r.body_text())
    }
}

impl From<PathRejection> for EngineError {
    fn from(r: PathRejection) -> Self {
        EngineError::InvalidInput(r.body_text())
    }
}

/// Accept either a ULID or a UUID in paths and bodies.
pub fn parse_id(what: &str, raw: &str) -> Result<Ulid, EngineError> {
    parse_any_id(raw).ok_or_else(|| EngineError::InvalidInput(format!("invalid {what} id: {raw}")))
}
