use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build a bookable span: `start < end`, not starting in the past beyond the
/// grace window, and no wider than the global cap.
pub(crate) fn validate_span(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Span, EngineError> {
    let span = Span::try_new(start, end).ok_or(EngineError::InvalidTimeRange)?;
    if span.start < now - BOOKING_START_GRACE {
        return Err(EngineError::InvalidTimeRange);
    }
    if span.duration() > chrono::TimeDelta::days(MAX_BOOKING_DAYS) {
        return Err(EngineError::InvalidInput("booking interval too wide".into()));
    }
    Ok(span)
}

/// Id of the first `booked` booking overlapping `span`, if any.
pub fn find_conflict(existing: &[Booking], span: &Span) -> Option<Ulid> {
    existing
        .iter()
        .filter(|b| b.status == BookingStatus::Booked)
        .find(|b| b.span().overlaps(span))
        .map(|b| b.id)
}

pub fn has_conflict(existing: &[Booking], span: &Span) -> bool {
    find_conflict(existing, span).is_some()
}

pub(crate) fn check_no_conflict(car_id: Ulid, existing: &[Booking], span: &Span) -> Result<(), EngineError> {
    match find_conflict(existing, span) {
        Some(other) => {
            tracing::debug!("car {car_id}: requested span overlaps booking {other}");
            Err(EngineError::AlreadyBooked(car_id))
        }
        None => Ok(()),
    }
}

/// Enforce the car's own minimum/maximum rental duration (hours).
pub(crate) fn check_duration(info: &RentalInfo, span: &Span) -> Result<(), EngineError> {
    let hours = span.hours();
    let (min, max) = (info.minimum_rent_duration, info.maximum_rent_duration);
    if hours < min as f64 || hours > max as f64 {
        return Err(EngineError::InvalidDuration { hours, min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, h, 0, 0).unwrap()
    }

    fn booked(start: u32, end: u32, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            car_id: Ulid::new(),
            start_time: at(start),
            end_time: at(end),
            status,
            total_price: 0.0,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[test]
    fn adjacent_intervals_do_not_conflict() {
        let existing = vec![booked(10, 12, BookingStatus::Booked)];
        assert!(!has_conflict(&existing, &Span::new(at(12), at(14))));
        assert!(!has_conflict(&existing, &Span::new(at(8), at(10))));
        assert!(has_conflict(&existing, &Span::new(at(11), at(13))));
        assert!(has_conflict(&existing, &Span::new(at(9), at(15))));
    }

    #[test]
    fn only_booked_rows_count() {
        let existing = vec![
            booked(10, 12, BookingStatus::Cancelled),
            booked(10, 12, BookingStatus::Completed),
        ];
        assert!(!has_conflict(&existing, &Span::new(at(10), at(12))));
    }

    #[test]
    fn overlap_matches_definition_exhaustively() {
        for a1 in 0..6 {
            for a2 in (a1 + 1)..7 {
                for b1 in 0..6 {
                    for b2 in (b1 + 1)..7 {
                        let existing = vec![booked(a1, a2, BookingStatus::Booked)];
                        let expected = a1 < b2 && a2 > b1;
                        assert_eq!(
                            has_conflict(&existing, &Span::new(at(b1), at(b2))),
                            expected,
                            "[{a1},{a2}) vs [{b1},{b2})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn span_validation() {
        let now = at(9);
        assert!(validate_span(at(10), at(12), now).is_ok());
        assert!(matches!(validate_span(at(12), at(12), now), Err(EngineError::InvalidTimeRange)));
        assert!(matches!(validate_span(at(12), at(10), now), Err(EngineError::InvalidTimeRange)));
        // starting well in the past
        assert!(matches!(validate_span(at(5), at(12), now), Err(EngineError::InvalidTimeRange)));
        // inside the grace window
        assert!(validate_span(now - chrono::TimeDelta::minutes(1), at(12), now).is_ok());
    }

    #[test]
    fn duration_bounds() {
        let info = RentalInfo {
            car_id: Ulid::new(),
            rental_price_per_day: 100.0,
            rental_price_per_hour: None,
            minimum_rent_duration: 2,
            maximum_rent_duration: 48,
            security_deposit: 0.0,
            late_fee_per_hour: 0.0,
            discounts: None,
        };
        assert!(check_duration(&info, &Span::new(at(10), at(12))).is_ok());
        assert!(matches!(
            check_duration(&info, &Span::new(at(10), at(11))),
            Err(EngineError::InvalidDuration { min: 2, max: 48, .. })
        ));
    }
}
