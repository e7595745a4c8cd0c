//! Persistence seam. The engine only sees `Store` and `StoreTx`; every
//! multi-record operation runs inside one `StoreTx` and is discarded unless
//! `commit` is called.

mod memory;
mod postgres;
mod rows;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The transaction lost a serialization race and may be retried.
    Serialization,
    /// An overlapping booked interval was rejected by the database.
    Exclusion,
    /// A unique constraint was violated. Carries the constraint name.
    Duplicate(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Serialization => write!(f, "serialization failure"),
            StoreError::Exclusion => write!(f, "exclusion constraint violated"),
            StoreError::Duplicate(c) => write!(f, "duplicate key: {c}"),
            StoreError::Backend(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One unit of work. Dropping without `commit` rolls back.
#[async_trait]
pub trait StoreTx: Send {
    // users
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    async fn user(&mut self, id: Ulid) -> StoreResult<Option<User>>;

    // owners
    async fn insert_owner(&mut self, owner: &Owner) -> StoreResult<()>;
    async fn update_owner(&mut self, owner: &Owner) -> StoreResult<()>;
    async fn delete_owner(&mut self, id: Ulid) -> StoreResult<()>;
    async fn owner(&mut self, id: Ulid) -> StoreResult<Option<Owner>>;
    async fn owners(&mut self) -> StoreResult<Vec<Owner>>;

    // cars
    async fn insert_car(&mut self, car: &Car) -> StoreResult<()>;
    async fn update_car(&mut self, car: &Car) -> StoreResult<()>;
    /// Removes the car with its sub-records, bookings and creation sessions.
    async fn delete_car(&mut self, id: Ulid) -> StoreResult<()>;
    async fn car(&mut self, id: Ulid) -> StoreResult<Option<Car>>;
    async fn car_by_vehicle_number(&mut self, number: &str) -> StoreResult<Option<Car>>;
    async fn cars_for_owner(&mut self, owner_id: Ulid) -> StoreResult<Vec<Car>>;
    /// Filtered page of cars ordered by `created_at` descending, plus the total match count.
    async fn search_cars(&mut self, filter: &CarFilter, page: PageRequest) -> StoreResult<(Vec<Car>, u64)>;
    /// Cars with `is_available` set and no booked interval overlapping `span`.
    async fn available_cars(&mut self, span: Span) -> StoreResult<Vec<Car>>;

    // car sub-records (one location, rental info and status per car)
    async fn put_location(&mut self, location: &CarLocation) -> StoreResult<()>;
    async fn location(&mut self, car_id: Ulid) -> StoreResult<Option<CarLocation>>;
    async fn put_rental_info(&mut self, info: &RentalInfo) -> StoreResult<()>;
    async fn rental_info(&mut self, car_id: Ulid) -> StoreResult<Option<RentalInfo>>;
    async fn put_status(&mut self, status: &CarStatus) -> StoreResult<()>;
    async fn status(&mut self, car_id: Ulid) -> StoreResult<Option<CarStatus>>;
    async fn insert_media(&mut self, media: &CarMedia) -> StoreResult<()>;
    async fn media(&mut self, car_id: Ulid) -> StoreResult<Vec<CarMedia>>;
    async fn insert_document(&mut self, doc: &CarDocument) -> StoreResult<()>;
    async fn documents(&mut self, car_id: Ulid) -> StoreResult<Vec<CarDocument>>;

    // bookings
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;
    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;
    async fn booking(&mut self, id: Ulid) -> StoreResult<Option<Booking>>;
    /// Stored-`booked` bookings for the car whose interval overlaps `span`.
    async fn booked_overlapping(&mut self, car_id: Ulid, span: Span) -> StoreResult<Vec<Booking>>;
    /// Stored-`booked` bookings for the car ending after `now`.
    async fn active_bookings_for_car(&mut self, car_id: Ulid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
    async fn bookings_for_user(&mut self, user_id: Ulid) -> StoreResult<Vec<Booking>>;
    async fn search_bookings(&mut self, filter: &BookingFilter, page: PageRequest) -> StoreResult<(Vec<Booking>, u64)>;
    /// Marks stored-`booked` bookings with `end_time <= now` as completed. Returns how many.
    async fn complete_elapsed(&mut self, now: DateTime<Utc>) -> StoreResult<u64>;

    // creation sessions
    async fn insert_session(&mut self, session: &CreationSession) -> StoreResult<()>;
    async fn session(&mut self, id: Ulid) -> StoreResult<Option<CreationSession>>;
    /// Compare-and-set on the stage. `false` if the stored stage is not `from`.
    async fn advance_session(
        &mut self,
        id: Ulid,
        from: CreationStage,
        to: CreationStage,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// Deletes sessions with `expires_at < before`, together with the cars
    /// of those that never reached `completed`. Returns how many sessions.
    async fn purge_sessions(&mut self, before: DateTime<Utc>) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
