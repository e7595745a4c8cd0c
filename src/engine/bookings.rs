use chrono::{DateTime, Utc};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::observability::*;
use crate::store::StoreError;

use super::conflict::{check_duration, check_no_conflict, now, validate_span};
use super::pricing::compute_price;
use super::{Engine, EngineError, EngineResult};

fn record_conflict(reason: &'static str) {
    metrics::counter!(BOOKING_CONFLICTS_TOTAL, "reason" => reason).increment(1);
}

impl Engine {
    /// Book `car_id` for `[start, end)`. Overlap check, pricing and insert run
    /// in one transaction.
    pub async fn create_booking(
        &self,
        user_id: Ulid,
        car_id: Ulid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        self.create_booking_at(user_id, car_id, start, end, now()).await
    }

    pub(crate) async fn create_booking_at(
        &self,
        user_id: Ulid,
        car_id: Ulid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        let span = validate_span(start, end, now)?;
        let booking = retry_serializable!("create_booking", self.try_create_booking(user_id, car_id, span, now).await)?;

        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            "booking {} created: car {car_id} user {user_id} [{}, {}) price {:.2}",
            booking.id, span.start, span.end, booking.total_price
        );
        Ok(booking)
    }

    async fn try_create_booking(
        &self,
        user_id: Ulid,
        car_id: Ulid,
        span: Span,
        now: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        let mut tx = self.tx().await?;

        let car = tx.car(car_id).await?.ok_or(EngineError::NotFound("car", car_id))?;
        if !car.is_available {
            record_conflict("unavailable");
            return Err(EngineError::CarUnavailable(car_id));
        }
        let rental = tx.rental_info(car_id).await?.ok_or(EngineError::MissingRates(car_id))?;
        check_duration(&rental, &span)?;

        let existing = tx.booked_overlapping(car_id, span).await?;
        if let Err(e) = check_no_conflict(car_id, &existing, &span) {
            record_conflict("overlap");
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            user_id,
            car_id,
            start_time: span.start,
            end_time: span.end,
            status: BookingStatus::Booked,
            total_price: compute_price(&rental.rate_schedule(), &span),
            created_at: now,
            updated_at: now,
        };
        match tx.insert_booking(&booking).await {
            Err(StoreError::Exclusion) => {
                record_conflict("overlap");
                return Err(EngineError::AlreadyBooked(car_id));
            }
            other => other?,
        }
        tx.commit().await?;
        Ok(booking)
    }

    /// Cancel a booking. Only its owner may cancel, and only while it is active.
    pub async fn cancel_booking(&self, booking_id: Ulid, requester: Ulid) -> EngineResult<Booking> {
        self.cancel_booking_at(booking_id, requester, now()).await
    }

    pub(crate) async fn cancel_booking_at(
        &self,
        booking_id: Ulid,
        requester: Ulid,
        now: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        let booking = retry_serializable!("cancel_booking", self.try_cancel_booking(booking_id, requester, now).await)?;

        metrics::counter!(BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!("booking {booking_id} cancelled by {requester}");
        Ok(booking)
    }

    async fn try_cancel_booking(
        &self,
        booking_id: Ulid,
        requester: Ulid,
        now: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        let mut tx = self.tx().await?;
        let mut booking = tx
            .booking(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking", booking_id))?;
        if booking.user_id != requester {
            return Err(EngineError::Forbidden("booking belongs to another user"));
        }
        let status = booking.effective_status(now);
        if status != BookingStatus::Booked {
            return Err(EngineError::InvalidState { id: booking_id, status });
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;
        tx.update_booking(&booking).await?;
        tx.commit().await?;
        Ok(booking)
    }

    /// Fetch a booking visible to `actor` (its owner or an admin).
    pub async fn get_booking(&self, booking_id: Ulid, actor: Actor) -> EngineResult<Booking> {
        let mut tx = self.tx().await?;
        let booking = tx
            .booking(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking", booking_id))?;
        if booking.user_id != actor.user_id && !actor.is_admin() {
            return Err(EngineError::Forbidden("booking belongs to another user"));
        }
        Ok(booking.as_of(now()))
    }

    /// All bookings of `user_id`, newest first. Callers may only list their own unless admin.
    pub async fn list_user_bookings(&self, user_id: Ulid, actor: Actor) -> EngineResult<Vec<Booking>> {
        if user_id != actor.user_id && !actor.is_admin() {
            return Err(EngineError::Forbidden("cannot list another user's bookings"));
        }
        let mut tx = self.tx().await?;
        let now = now();
        Ok(tx
            .bookings_for_user(user_id)
            .await?
            .into_iter()
            .map(|b| b.as_of(now))
            .collect())
    }

    /// Admin listing with filters and pagination.
    pub async fn list_bookings(
        &self,
        actor: Actor,
        filter: &BookingFilter,
        page: PageRequest,
    ) -> EngineResult<Page<Booking>> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("admin role required"));
        }
        let mut tx = self.tx().await?;
        let (items, total) = tx.search_bookings(filter, page).await?;
        let now = now();
        Ok(Page::new(
            items.into_iter().map(|b| b.as_of(now)).collect(),
            total,
            page,
        ))
    }

    /// `true` if any active booking on the car overlaps `[start, end)`.
    pub async fn has_conflict(&self, car_id: Ulid, start: DateTime<Utc>, end: DateTime<Utc>) -> EngineResult<bool> {
        let span = Span::try_new(start, end).ok_or(EngineError::InvalidTimeRange)?;
        let mut tx = self.tx().await?;
        if tx.car(car_id).await?.is_none() {
            return Err(EngineError::NotFound("car", car_id));
        }
        let existing = tx.booked_overlapping(car_id, span).await?;
        Ok(super::has_conflict(&existing, &span))
    }

    /// Persist `completed` on every booked interval that has ended by `now`.
    pub async fn complete_elapsed_bookings(&self, now: DateTime<Utc>) -> EngineResult<u64> {
        let n = retry_serializable!("complete_elapsed", async {
            let mut tx = self.tx().await?;
            let n = tx.complete_elapsed(now).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(n)
        }
        .await)?;
        if n > 0 {
            metrics::counter!(BOOKINGS_COMPLETED_TOTAL).increment(n);
        }
        Ok(n)
    }
}
