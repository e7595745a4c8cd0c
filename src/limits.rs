use std::time::Duration;

// ── Booking ──────────────────────────────────────────────────────

/// How far in the past a new booking may start (clock skew between client and server).
pub const BOOKING_START_GRACE: chrono::TimeDelta = chrono::TimeDelta::minutes(5);

/// Longest booking accepted regardless of the car's own maximum.
pub const MAX_BOOKING_DAYS: i64 = 366;

// ── Pricing ──────────────────────────────────────────────────────

pub const HOURS_PER_DAY: f64 = 24.0;

/// Durations up to and including this many hours are billed hourly.
pub const HOURLY_PRICING_MAX_HOURS: f64 = 24.0;

// ── Car creation ─────────────────────────────────────────────────

pub const SESSION_TTL: chrono::TimeDelta = chrono::TimeDelta::hours(24);

/// Expired sessions are kept this long past expiry before purging.
pub const SESSION_RETENTION: chrono::TimeDelta = chrono::TimeDelta::days(7);

pub const MIN_MODEL_YEAR: i32 = 1900;
pub const MIN_SEATING: i32 = 1;
pub const MAX_SEATING: i32 = 50;

// ── Input sizes ──────────────────────────────────────────────────

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_BRANCHES: usize = 64;
pub const MAX_MEDIA_ITEMS: usize = 64;
pub const MAX_DOCUMENTS: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 6;

// ── Listing ──────────────────────────────────────────────────────

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

// ── Runtime ──────────────────────────────────────────────────────

/// Attempts for a transaction aborted by a serialization failure.
pub const MAX_TX_RETRIES: u32 = 5;

pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Time allowed for in-flight requests after a shutdown signal.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);
