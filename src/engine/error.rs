use ulid::Ulid;

use crate::model::{BookingStatus, CreationStage};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(String),
    InvalidTimeRange,
    InvalidDuration {
        hours: f64,
        min: i32,
        max: i32,
    },
    NotFound(&'static str, Ulid),
    Forbidden(&'static str),
    Unauthorized(&'static str),
    CarUnavailable(Ulid),
    AlreadyBooked(Ulid),
    MissingRates(Ulid),
    DuplicateVehicleNumber(String),
    DuplicateEmail(String),
    HasDependents(&'static str),
    InvalidState {
        id: Ulid,
        status: BookingStatus,
    },
    InvalidStep {
        expected: CreationStage,
        actual: CreationStage,
    },
    Expired(Ulid),
    Store(StoreError),
    Internal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidTimeRange => {
                write!(f, "invalid time range: end must be after start and start must not be in the past")
            }
            EngineError::InvalidDuration { hours, min, max } => write!(
                f,
                "rental duration {hours:.2}h outside allowed range [{min}h, {max}h]"
            ),
            EngineError::NotFound(what, id) => write!(f, "{what} not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::CarUnavailable(id) => write!(f, "car {id} is not available for booking"),
            EngineError::AlreadyBooked(id) => {
                write!(f, "car {id} is already booked for the requested interval")
            }
            EngineError::MissingRates(id) => write!(f, "car {id} has no rental rates configured"),
            EngineError::DuplicateVehicleNumber(n) => {
                write!(f, "vehicle number already registered: {n}")
            }
            EngineError::DuplicateEmail(e) => write!(f, "email already registered: {e}"),
            EngineError::HasDependents(msg) => write!(f, "cannot delete: {msg}"),
            EngineError::InvalidState { id, status } => {
                write!(f, "booking {id} is {status}, expected booked")
            }
            EngineError::InvalidStep { expected, actual } => {
                write!(f, "session is at step {actual}, cannot submit {expected}")
            }
            EngineError::Expired(id) => write!(f, "creation session {id} has expired"),
            EngineError::Store(e) => write!(f, "{e}"),
            EngineError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
