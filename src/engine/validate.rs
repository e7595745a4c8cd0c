//! Field rules live on the input types as `garde` derives. What stays here
//! spans several fields or depends on the clock.

use chrono::{DateTime, Utc};
use garde::Validate;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, EngineResult};

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidInput(msg.into())
}

impl From<garde::Report> for EngineError {
    fn from(report: garde::Report) -> Self {
        let fields: Vec<String> = report.iter().map(|(path, e)| format!("{path}: {e}")).collect();
        EngineError::InvalidInput(fields.join("; "))
    }
}

pub(crate) fn fields<T: Validate<Context = ()>>(value: &T) -> EngineResult<()> {
    value.validate()?;
    Ok(())
}

pub(crate) fn model_year(year: i32, now: DateTime<Utc>) -> EngineResult<()> {
    let max = max_model_year(now);
    if !(MIN_MODEL_YEAR..=max).contains(&year) {
        return Err(invalid(format!("year must be between {MIN_MODEL_YEAR} and {max}")));
    }
    Ok(())
}

pub(crate) fn basic_details(step: &BasicDetailsStep, now: DateTime<Utc>) -> EngineResult<()> {
    fields(step)?;
    model_year(step.year, now)
}

/// Rules for a car row after a patch has been merged into it.
pub(crate) fn car(car: &Car, now: DateTime<Utc>) -> EngineResult<()> {
    basic_details(
        &BasicDetailsStep {
            make: car.make.clone(),
            model: car.model.clone(),
            year: car.year,
            variant: car.variant.clone(),
            fuel_type: car.fuel_type,
            transmission: car.transmission,
            body_type: car.body_type,
            color: car.color.clone(),
            seating_capacity: car.seating_capacity,
            vehicle_number: car.vehicle_number.clone(),
            registration_state: car.registration_state.clone(),
        },
        now,
    )
}

pub(crate) fn location(location: &CarLocation) -> EngineResult<()> {
    fields(&LocationDetailsStep {
        current_location: location.current_location.clone(),
        available_branches: location.available_branches.clone(),
    })
}

pub(crate) fn rental_step(step: &RentalInfoStep) -> EngineResult<()> {
    fields(step)?;
    if step.maximum_rent_duration < step.minimum_rent_duration {
        return Err(invalid("maximum_rent_duration must not be below minimum_rent_duration"));
    }
    Ok(())
}

pub(crate) fn rental_info(info: &RentalInfo) -> EngineResult<()> {
    rental_step(&RentalInfoStep {
        rental_price_per_day: info.rental_price_per_day,
        rental_price_per_hour: info.rental_price_per_hour,
        minimum_rent_duration: info.minimum_rent_duration,
        maximum_rent_duration: info.maximum_rent_duration,
        security_deposit: info.security_deposit,
        late_fee_per_hour: info.late_fee_per_hour,
        discounts: info.discounts.clone(),
    })
}

/// At least one image, at most one of them primary. A primary video does
/// not count.
pub(crate) fn media_set(media: &[NewMedia]) -> EngineResult<()> {
    let images = media.iter().filter(|m| m.kind == MediaKind::Image);
    if images.clone().count() == 0 {
        return Err(invalid("at least one image is required"));
    }
    if images.filter(|m| m.is_primary).count() > 1 {
        return Err(invalid("only one primary image is allowed"));
    }
    Ok(())
}

pub(crate) fn documents_media(step: &DocumentsMediaStep) -> EngineResult<()> {
    fields(step)?;
    media_set(&step.media)
}

pub(crate) fn status(status: &CarStatus, is_available: bool) -> EngineResult<()> {
    fields(&StatusInfoStep {
        is_available,
        current_odometer_reading: status.current_odometer_reading,
        last_service_date: status.last_service_date,
        next_service_due: status.next_service_due,
        damages_or_issues: status.damages_or_issues.clone(),
    })
}

pub(crate) fn new_car(new: &NewCar, now: DateTime<Utc>) -> EngineResult<()> {
    fields(new)?;
    model_year(new.basic.year, now)?;
    rental_step(&new.rental_info)?;
    media_set(&new.media)
}
