use crate::limits::*;
use crate::model::{RateSchedule, Span};

/// Price for renting over `span`. Fractional hours and days, no rounding.
///
/// Tiered schedules bill hourly up to and including 24 hours and switch to
/// fractional days beyond that.
pub fn compute_price(rates: &RateSchedule, span: &Span) -> f64 {
    let hours = span.hours();
    match *rates {
        RateSchedule::Flat { hourly_rate } => hours * hourly_rate,
        RateSchedule::Tiered { hourly_rate, .. } if hours <= HOURLY_PRICING_MAX_HOURS => {
            hours * hourly_rate
        }
        RateSchedule::Tiered { daily_rate, .. } => hours / HOURS_PER_DAY * daily_rate,
    }
}
