//! Database row shapes and their conversion into domain records.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use ulid::Ulid;
use uuid::Uuid;

use super::StoreError;
use crate::model::*;

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        StoreError::Backend(format!("corrupt row: {e}"))
    }
}

pub(super) const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

#[derive(Debug, FromRow)]
pub(super) struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id.into(),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

pub(super) const OWNER_COLUMNS: &str = "id, name, contact_info, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(super) struct OwnerRow {
    pub id: Uuid,
    pub name: String,
    pub contact_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OwnerRow> for Owner {
    fn from(row: OwnerRow) -> Self {
        Owner {
            id: row.id.into(),
            name: row.name,
            contact_info: row.contact_info,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) const CAR_COLUMNS: &str = "c.id, c.owner_id, c.make, c.model, c.year, c.variant, \
     c.fuel_type, c.transmission, c.body_type, c.color, c.seating_capacity, c.vehicle_number, \
     c.registration_state, c.is_available, c.created_at, c.updated_at";

#[derive(Debug, FromRow)]
pub(super) struct CarRow {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub variant: String,
    pub fuel_type: String,
    pub transmission: String,
    pub body_type: String,
    pub color: String,
    pub seating_capacity: i32,
    pub vehicle_number: String,
    pub registration_state: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CarRow> for Car {
    type Error = StoreError;

    fn try_from(row: CarRow) -> Result<Self, Self::Error> {
        Ok(Car {
            id: row.id.into(),
            owner_id: row.owner_id.map(Ulid::from),
            make: row.make,
            model: row.model,
            year: row.year,
            variant: row.variant,
            fuel_type: row.fuel_type.parse()?,
            transmission: row.transmission.parse()?,
            body_type: row.body_type.parse()?,
            color: row.color,
            seating_capacity: row.seating_capacity,
            vehicle_number: row.vehicle_number,
            registration_state: row.registration_state,
            is_available: row.is_available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct LocationRow {
    pub car_id: Uuid,
    pub current_location: String,
    pub available_branches: Vec<String>,
}

impl From<LocationRow> for CarLocation {
    fn from(row: LocationRow) -> Self {
        CarLocation {
            car_id: row.car_id.into(),
            current_location: row.current_location,
            available_branches: row.available_branches,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct RentalInfoRow {
    pub car_id: Uuid,
    pub rental_price_per_day: f64,
    pub rental_price_per_hour: Option<f64>,
    pub minimum_rent_duration: i32,
    pub maximum_rent_duration: i32,
    pub security_deposit: f64,
    pub late_fee_per_hour: f64,
    pub discounts: Option<String>,
}

impl From<RentalInfoRow> for RentalInfo {
    fn from(row: RentalInfoRow) -> Self {
        RentalInfo {
            car_id: row.car_id.into(),
            rental_price_per_day: row.rental_price_per_day,
            rental_price_per_hour: row.rental_price_per_hour,
            minimum_rent_duration: row.minimum_rent_duration,
            maximum_rent_duration: row.maximum_rent_duration,
            security_deposit: row.security_deposit,
            late_fee_per_hour: row.late_fee_per_hour,
            discounts: row.discounts,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct StatusRow {
    pub car_id: Uuid,
    pub current_odometer_reading: f64,
    pub last_service_date: Option<DateTime<Utc>>,
    pub next_service_due: Option<DateTime<Utc>>,
    pub damages_or_issues: Vec<String>,
}

impl From<StatusRow> for CarStatus {
    fn from(row: StatusRow) -> Self {
        CarStatus {
            car_id: row.car_id.into(),
            current_odometer_reading: row.current_odometer_reading,
            last_service_date: row.last_service_date,
            next_service_due: row.next_service_due,
            damages_or_issues: row.damages_or_issues,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct MediaRow {
    pub id: Uuid,
    pub car_id: Uuid,
    pub kind: String,
    pub url: String,
    pub is_primary: bool,
}

impl TryFrom<MediaRow> for CarMedia {
    type Error = StoreError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(CarMedia {
            id: row.id.into(),
            car_id: row.car_id.into(),
            kind: row.kind.parse()?,
            url: row.url,
            is_primary: row.is_primary,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct DocumentRow {
    pub id: Uuid,
    pub car_id: Uuid,
    pub document_type: String,
    pub reference: String,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<DocumentRow> for CarDocument {
    fn from(row: DocumentRow) -> Self {
        CarDocument {
            id: row.id.into(),
            car_id: row.car_id.into(),
            document_type: row.document_type,
            reference: row.reference,
            valid_until: row.valid_until,
        }
    }
}

pub(super) const BOOKING_COLUMNS: &str =
    "id, user_id, car_id, start_time, end_time, status, total_price, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(super) struct BookingRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub car_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id.into(),
            user_id: row.user_id.into(),
            car_id: row.car_id.into(),
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) const SESSION_COLUMNS: &str = "id, car_id, stage, expires_at, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(super) struct SessionRow {
    pub id: Uuid,
    pub car_id: Uuid,
    pub stage: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for CreationSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(CreationSession {
            id: row.id.into(),
            car_id: row.car_id.into(),
            stage: row.stage.parse()?,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Convert every row, failing on the first bad one.
pub(super) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
