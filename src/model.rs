use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Fractional hours, millisecond precision.
    pub fn hours(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Parse an id given in either its ULID or its UUID rendering.
pub fn parse_any_id(raw: &str) -> Option<Ulid> {
    Ulid::from_string(raw)
        .ok()
        .or_else(|| uuid::Uuid::parse_str(raw).ok().map(Ulid::from))
}

fn any_id<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Ulid, D::Error> {
    let raw = String::deserialize(d)?;
    parse_any_id(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {raw}")))
}

fn optional_any_id<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Ulid>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|raw| parse_any_id(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {raw}"))))
        .transpose()
}

/// Error for string-backed enums read from storage or query strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Text-backed enums: one table drives `as_str`, `FromStr` and `Display`.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
}

text_enum!(BookingStatus, "booking status", {
    Booked => "booked",
    Cancelled => "cancelled",
    Completed => "completed",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub car_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }

    /// A `booked` booking whose interval has elapsed reads as `completed`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> BookingStatus {
        match self.status {
            BookingStatus::Booked if self.end_time <= now => BookingStatus::Completed,
            other => other,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == BookingStatus::Booked
    }

    /// Copy with the read-time status applied.
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

text_enum!(Role, "role", {
    User => "user",
    Admin => "admin",
});

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Sign-up details. The email is normalized before it is checked.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub name: String,
    #[garde(email, length(max = MAX_NAME_LEN))]
    pub email: String,
    #[garde(length(min = MIN_PASSWORD_LEN))]
    pub password: String,
}

// ── Owners ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Ulid,
    pub name: String,
    pub contact_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OwnerInput {
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub name: String,
    #[garde(custom(not_blank), length(max = MAX_TEXT_LEN))]
    pub contact_info: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerWithCars {
    #[serde(flatten)]
    pub owner: Owner,
    pub cars: Vec<Car>,
}

// ── Cars ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    Petrol,
    Diesel,
    Electric,
    Hybrid,
}

text_enum!(FuelType, "fuel type", {
    Petrol => "Petrol",
    Diesel => "Diesel",
    Electric => "Electric",
    Hybrid => "Hybrid",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transmission {
    Manual,
    Automatic,
    #[serde(rename = "CVT")]
    Cvt,
}

text_enum!(Transmission, "transmission", {
    Manual => "Manual",
    Automatic => "Automatic",
    Cvt => "CVT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    Sedan,
    #[serde(rename = "SUV")]
    Suv,
    Hatchback,
    Coupe,
    Van,
    Truck,
}

text_enum!(BodyType, "body type", {
    Sedan => "Sedan",
    Suv => "SUV",
    Hatchback => "Hatchback",
    Coupe => "Coupe",
    Van => "Van",
    Truck => "Truck",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: Ulid,
    /// Unset only while a creation session has not reached the owner step.
    pub owner_id: Option<Ulid>,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub variant: String,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    pub body_type: BodyType,
    pub color: String,
    pub seating_capacity: i32,
    pub vehicle_number: String,
    pub registration_state: String,
    /// Maintenance switch. Never toggled by the booking lifecycle.
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarLocation {
    pub car_id: Ulid,
    pub current_location: String,
    pub available_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalInfo {
    pub car_id: Ulid,
    pub rental_price_per_day: f64,
    pub rental_price_per_hour: Option<f64>,
    /// Hours.
    pub minimum_rent_duration: i32,
    /// Hours.
    pub maximum_rent_duration: i32,
    pub security_deposit: f64,
    pub late_fee_per_hour: f64,
    pub discounts: Option<String>,
}

/// Pricing parameters derived from a car's rental info.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateSchedule {
    /// One rate for every duration.
    Flat { hourly_rate: f64 },
    /// Hourly up to and including 24h, fractional days beyond.
    Tiered { hourly_rate: f64, daily_rate: f64 },
}

impl RentalInfo {
    pub fn rate_schedule(&self) -> RateSchedule {
        match self.rental_price_per_hour {
            Some(hourly_rate) => RateSchedule::Tiered {
                hourly_rate,
                daily_rate: self.rental_price_per_day,
            },
            None => RateSchedule::Flat {
                hourly_rate: self.rental_price_per_day / HOURS_PER_DAY,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

text_enum!(MediaKind, "media kind", {
    Image => "image",
    Video => "video",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarMedia {
    pub id: Ulid,
    pub car_id: Ulid,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarDocument {
    pub id: Ulid,
    pub car_id: Ulid,
    pub document_type: String,
    pub reference: String,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarStatus {
    pub car_id: Ulid,
    pub current_odometer_reading: f64,
    pub last_service_date: Option<DateTime<Utc>>,
    pub next_service_due: Option<DateTime<Utc>>,
    pub damages_or_issues: Vec<String>,
}

/// A car with every sub-record attached.
#[derive(Debug, Clone, Serialize)]
pub struct CarDetails {
    #[serde(flatten)]
    pub car: Car,
    pub owner: Option<Owner>,
    pub location: Option<CarLocation>,
    pub rental_info: Option<RentalInfo>,
    pub media: Vec<CarMedia>,
    pub documents: Vec<CarDocument>,
    pub status: Option<CarStatus>,
}

// ── Car creation session ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStage {
    BasicDetails,
    OwnerInfo,
    LocationDetails,
    RentalInfo,
    DocumentsMedia,
    StatusInfo,
    Completed,
}

text_enum!(CreationStage, "creation step", {
    BasicDetails => "basic_details",
    OwnerInfo => "owner_info",
    LocationDetails => "location_details",
    RentalInfo => "rental_info",
    DocumentsMedia => "documents_media",
    StatusInfo => "status_info",
    Completed => "completed",
});

impl CreationStage {
    /// The transition table. `Completed` is its own successor.
    pub fn next(self) -> Self {
        match self {
            CreationStage::BasicDetails => CreationStage::OwnerInfo,
            CreationStage::OwnerInfo => CreationStage::LocationDetails,
            CreationStage::LocationDetails => CreationStage::RentalInfo,
            CreationStage::RentalInfo => CreationStage::DocumentsMedia,
            CreationStage::DocumentsMedia => CreationStage::StatusInfo,
            CreationStage::StatusInfo => CreationStage::Completed,
            CreationStage::Completed => CreationStage::Completed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CreationStage::Completed
    }

    /// Route segment form, e.g. `basic-details` or `basic_details`.
    pub fn from_route(segment: &str) -> Result<Self, UnknownVariant> {
        segment.replace('-', "_").parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationSession {
    pub id: Ulid,
    pub car_id: Ulid,
    pub stage: CreationStage,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ── Input rules ──────────────────────────────────────────────────

fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

fn amount(value: &f64, _: &()) -> garde::Result {
    if !value.is_finite() || *value < 0.0 {
        return Err(garde::Error::new("must be a non-negative amount"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BasicDetailsStep {
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub make: String,
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub model: String,
    /// Upper bound follows the clock, see `max_model_year`.
    #[garde(range(min = MIN_MODEL_YEAR))]
    pub year: i32,
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub variant: String,
    #[garde(skip)]
    pub fuel_type: FuelType,
    #[garde(skip)]
    pub transmission: Transmission,
    #[garde(skip)]
    pub body_type: BodyType,
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub color: String,
    #[garde(range(min = MIN_SEATING, max = MAX_SEATING))]
    pub seating_capacity: i32,
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub vehicle_number: String,
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub registration_state: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OwnerInfoStep {
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub name: String,
    #[garde(custom(not_blank), length(max = MAX_TEXT_LEN))]
    pub contact_info: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationDetailsStep {
    #[garde(custom(not_blank), length(max = MAX_TEXT_LEN))]
    pub current_location: String,
    #[garde(
        length(min = 1, max = MAX_BRANCHES),
        inner(custom(not_blank), length(max = MAX_NAME_LEN))
    )]
    pub available_branches: Vec<String>,
}

/// Field rules only. `maximum_rent_duration >= minimum_rent_duration` is
/// checked by the engine, which also applies it after patches.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RentalInfoStep {
    #[garde(custom(amount))]
    pub rental_price_per_day: f64,
    #[serde(default)]
    #[garde(range(min = 0.0))]
    pub rental_price_per_hour: Option<f64>,
    #[garde(range(min = 1))]
    pub minimum_rent_duration: i32,
    #[garde(range(min = 1))]
    pub maximum_rent_duration: i32,
    #[garde(custom(amount))]
    pub security_deposit: f64,
    #[garde(custom(amount))]
    pub late_fee_per_hour: f64,
    #[serde(default)]
    #[garde(length(max = MAX_TEXT_LEN))]
    pub discounts: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDocument {
    #[garde(custom(not_blank), length(max = MAX_NAME_LEN))]
    pub document_type: String,
    #[garde(custom(not_blank), length(max = MAX_TEXT_LEN))]
    pub reference: String,
    #[serde(default)]
    #[garde(skip)]
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMedia {
    #[serde(rename = "type")]
    #[garde(skip)]
    pub kind: MediaKind,
    #[garde(custom(not_blank), length(max = MAX_TEXT_LEN))]
    pub url: String,
    #[serde(default)]
    #[garde(skip)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DocumentsMediaStep {
    #[serde(default)]
    #[garde(length(max = MAX_DOCUMENTS), dive)]
    pub documents: Vec<NewDocument>,
    #[garde(length(max = MAX_MEDIA_ITEMS), dive)]
    pub media: Vec<NewMedia>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StatusInfoStep {
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub is_available: bool,
    #[garde(custom(amount))]
    pub current_odometer_reading: f64,
    #[serde(default)]
    #[garde(skip)]
    pub last_service_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[garde(skip)]
    pub next_service_due: Option<DateTime<Utc>>,
    #[serde(default)]
    #[garde(inner(custom(not_blank), length(max = MAX_TEXT_LEN)))]
    pub damages_or_issues: Vec<String>,
}

/// One step's payload, tagged by the stage it completes.
#[derive(Debug, Clone)]
pub enum StepPayload {
    BasicDetails(BasicDetailsStep),
    OwnerInfo(OwnerInfoStep),
    LocationDetails(LocationDetailsStep),
    RentalInfo(RentalInfoStep),
    DocumentsMedia(DocumentsMediaStep),
    StatusInfo(StatusInfoStep),
}

impl StepPayload {
    pub fn stage(&self) -> CreationStage {
        match self {
            StepPayload::BasicDetails(_) => CreationStage::BasicDetails,
            StepPayload::OwnerInfo(_) => CreationStage::OwnerInfo,
            StepPayload::LocationDetails(_) => CreationStage::LocationDetails,
            StepPayload::RentalInfo(_) => CreationStage::RentalInfo,
            StepPayload::DocumentsMedia(_) => CreationStage::DocumentsMedia,
            StepPayload::StatusInfo(_) => CreationStage::StatusInfo,
        }
    }

    /// Decode a JSON body for the given stage. `Completed` has no payload.
    pub fn from_json(
        stage: CreationStage,
        body: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        Ok(Some(match stage {
            CreationStage::BasicDetails => StepPayload::BasicDetails(serde_json::from_value(body)?),
            CreationStage::OwnerInfo => StepPayload::OwnerInfo(serde_json::from_value(body)?),
            CreationStage::LocationDetails => {
                StepPayload::LocationDetails(serde_json::from_value(body)?)
            }
            CreationStage::RentalInfo => StepPayload::RentalInfo(serde_json::from_value(body)?),
            CreationStage::DocumentsMedia => {
                StepPayload::DocumentsMedia(serde_json::from_value(body)?)
            }
            CreationStage::StatusInfo => StepPayload::StatusInfo(serde_json::from_value(body)?),
            CreationStage::Completed => return Ok(None),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub session_id: Ulid,
    pub car_id: Ulid,
    pub current_step: CreationStage,
    pub next_step: CreationStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreationProgress {
    pub session_id: Ulid,
    pub car_id: Ulid,
    pub current_step: CreationStage,
    pub next_step: CreationStage,
    pub expires_at: DateTime<Utc>,
}

/// Direct (single request) car creation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCar {
    #[serde(flatten)]
    #[garde(dive)]
    pub basic: BasicDetailsStep,
    #[serde(deserialize_with = "any_id")]
    #[garde(skip)]
    pub owner_id: Ulid,
    #[garde(dive)]
    pub location: LocationDetailsStep,
    #[garde(dive)]
    pub rental_info: RentalInfoStep,
    #[serde(default)]
    #[garde(length(max = MAX_DOCUMENTS), dive)]
    pub documents: Vec<NewDocument>,
    #[garde(length(max = MAX_MEDIA_ITEMS), dive)]
    pub media: Vec<NewMedia>,
    #[garde(dive)]
    pub status: StatusInfoStep,
}

// ── Typed patches ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarPatch {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub variant: Option<String>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub body_type: Option<BodyType>,
    pub color: Option<String>,
    pub seating_capacity: Option<i32>,
    pub vehicle_number: Option<String>,
    pub registration_state: Option<String>,
    #[serde(default, deserialize_with = "optional_any_id")]
    pub owner_id: Option<Ulid>,
    pub location: Option<LocationPatch>,
    pub rental_info: Option<RentalInfoPatch>,
    pub status: Option<StatusPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationPatch {
    pub current_location: Option<String>,
    pub available_branches: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RentalInfoPatch {
    pub rental_price_per_day: Option<f64>,
    pub rental_price_per_hour: Option<f64>,
    pub minimum_rent_duration: Option<i32>,
    pub maximum_rent_duration: Option<i32>,
    pub security_deposit: Option<f64>,
    pub late_fee_per_hour: Option<f64>,
    pub discounts: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPatch {
    pub is_available: Option<bool>,
    pub current_odometer_reading: Option<f64>,
    pub last_service_date: Option<DateTime<Utc>>,
    pub next_service_due: Option<DateTime<Utc>>,
    pub damages_or_issues: Option<Vec<String>>,
}

impl CarPatch {
    pub fn apply_to(&self, car: &mut Car) {
        macro_rules! set {
            ($($field:ident),+) => {
                $(if let Some(v) = &self.$field { car.$field = v.clone(); })+
            };
        }
        set!(make, model, variant, color, vehicle_number, registration_state);
        if let Some(v) = self.year {
            car.year = v;
        }
        if let Some(v) = self.fuel_type {
            car.fuel_type = v;
        }
        if let Some(v) = self.transmission {
            car.transmission = v;
        }
        if let Some(v) = self.body_type {
            car.body_type = v;
        }
        if let Some(v) = self.seating_capacity {
            car.seating_capacity = v;
        }
        if let Some(v) = self.owner_id {
            car.owner_id = Some(v);
        }
        if let Some(v) = self.status.as_ref().and_then(|s| s.is_available) {
            car.is_available = v;
        }
    }
}

impl LocationPatch {
    pub fn apply_to(&self, location: &mut CarLocation) {
        if let Some(v) = &self.current_location {
            location.current_location = v.clone();
        }
        if let Some(v) = &self.available_branches {
            location.available_branches = v.clone();
        }
    }
}

impl RentalInfoPatch {
    pub fn apply_to(&self, info: &mut RentalInfo) {
        if let Some(v) = self.rental_price_per_day {
            info.rental_price_per_day = v;
        }
        if let Some(v) = self.rental_price_per_hour {
            info.rental_price_per_hour = Some(v);
        }
        if let Some(v) = self.minimum_rent_duration {
            info.minimum_rent_duration = v;
        }
        if let Some(v) = self.maximum_rent_duration {
            info.maximum_rent_duration = v;
        }
        if let Some(v) = self.security_deposit {
            info.security_deposit = v;
        }
        if let Some(v) = self.late_fee_per_hour {
            info.late_fee_per_hour = v;
        }
        if let Some(v) = &self.discounts {
            info.discounts = Some(v.clone());
        }
    }
}

impl StatusPatch {
    pub fn apply_to(&self, status: &mut CarStatus) {
        if let Some(v) = self.current_odometer_reading {
            status.current_odometer_reading = v;
        }
        if let Some(v) = self.last_service_date {
            status.last_service_date = Some(v);
        }
        if let Some(v) = self.next_service_due {
            status.next_service_due = Some(v);
        }
        if let Some(v) = &self.damages_or_issues {
            status.damages_or_issues = v.clone();
        }
    }
}

// ── Filters and pagination ───────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    /// `start_time >= start_date`
    pub start_date: Option<DateTime<Utc>>,
    /// `end_time <= end_date`
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_any_id")]
    pub car_id: Option<Ulid>,
    #[serde(default, deserialize_with = "optional_any_id")]
    pub user_id: Option<Ulid>,
}

impl BookingFilter {
    /// Matches against the stored status, the same column the SQL backend filters on.
    pub fn matches(&self, b: &Booking) -> bool {
        self.status.is_none_or(|s| b.status == s)
            && self.start_date.is_none_or(|d| b.start_time >= d)
            && self.end_date.is_none_or(|d| b.end_time <= d)
            && self.car_id.is_none_or(|id| b.car_id == id)
            && self.user_id.is_none_or(|id| b.user_id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CarFilter {
    pub make: Option<String>,
    pub model: Option<String>,
    pub vehicle_number: Option<String>,
    pub year: Option<i32>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub body_type: Option<BodyType>,
    pub is_available: Option<bool>,
    /// Bounds on the daily rate.
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl CarFilter {
    pub fn matches(&self, car: &Car, rental: Option<&RentalInfo>) -> bool {
        let day_rate = rental.map(|r| r.rental_price_per_day);
        self.make.as_deref().is_none_or(|m| contains_ci(&car.make, m))
            && self.model.as_deref().is_none_or(|m| contains_ci(&car.model, m))
            && self
                .vehicle_number
                .as_deref()
                .is_none_or(|v| contains_ci(&car.vehicle_number, v))
            && self.year.is_none_or(|y| car.year == y)
            && self.min_year.is_none_or(|y| car.year >= y)
            && self.max_year.is_none_or(|y| car.year <= y)
            && self.fuel_type.is_none_or(|f| car.fuel_type == f)
            && self.transmission.is_none_or(|t| car.transmission == t)
            && self.body_type.is_none_or(|b| car.body_type == b)
            && self.is_available.is_none_or(|a| car.is_available == a)
            && self.min_price.is_none_or(|p| day_rate.is_some_and(|r| r >= p))
            && self.max_price.is_none_or(|p| day_rate.is_some_and(|r| r <= p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Out-of-range values fall back to defaults; the size is capped.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE);
        let page_size = page_size
            .filter(|s| *s >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(total_items: u64, req: PageRequest) -> Self {
        let total_pages = total_items.div_ceil(req.page_size as u64);
        Self {
            current_page: req.page,
            page_size: req.page_size,
            total_items,
            total_pages,
            has_next: (req.page as u64) < total_pages,
            has_prev: req.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, req: PageRequest) -> Self {
        Self {
            items,
            pagination: Pagination::new(total_items, req),
        }
    }
}

/// Latest model year accepted for a car.
pub fn max_model_year(now: DateTime<Utc>) -> i32 {
    now.year() + 1
}
