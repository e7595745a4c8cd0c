use chrono::{DateTime, Utc};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::store::StoreTx;

use super::conflict::now;
use super::creation::{
    ensure_vehicle_number_free, insert_documents_media, rental_info_from, status_from, vehicle_number_taken,
};
use super::{validate, Engine, EngineError, EngineResult};

async fn load_details(tx: &mut dyn StoreTx, car: Car) -> EngineResult<CarDetails> {
    let owner = match car.owner_id {
        Some(id) => tx.owner(id).await?,
        None => None,
    };
    Ok(CarDetails {
        owner,
        location: tx.location(car.id).await?,
        rental_info: tx.rental_info(car.id).await?,
        media: tx.media(car.id).await?,
        documents: tx.documents(car.id).await?,
        status: tx.status(car.id).await?,
        car,
    })
}

impl Engine {
    /// Create a car with every sub-record in a single request.
    pub async fn create_car(&self, new: NewCar) -> EngineResult<CarDetails> {
        let now = now();
        validate::new_car(&new, now)?;

        let details = retry_serializable!("create_car", self.try_create_car(&new, now).await)?;
        info!("car {} created ({})", details.car.id, details.car.vehicle_number);
        Ok(details)
    }

    async fn try_create_car(&self, new: &NewCar, now: DateTime<Utc>) -> EngineResult<CarDetails> {
        let mut tx = self.tx().await?;
        if tx.owner(new.owner_id).await?.is_none() {
            return Err(EngineError::NotFound("owner", new.owner_id));
        }
        let id = Ulid::new();
        let b = &new.basic;
        ensure_vehicle_number_free(tx.as_mut(), &b.vehicle_number, id).await?;

        let car = Car {
            id,
            owner_id: Some(new.owner_id),
            make: b.make.clone(),
            model: b.model.clone(),
            year: b.year,
            variant: b.variant.clone(),
            fuel_type: b.fuel_type,
            transmission: b.transmission,
            body_type: b.body_type,
            color: b.color.clone(),
            seating_capacity: b.seating_capacity,
            vehicle_number: b.vehicle_number.clone(),
            registration_state: b.registration_state.clone(),
            is_available: new.status.is_available,
            created_at: now,
            updated_at: now,
        };
        tx.insert_car(&car)
            .await
            .map_err(|e| vehicle_number_taken(e, &b.vehicle_number))?;
        tx.put_location(&CarLocation {
            car_id: id,
            current_location: new.location.current_location.clone(),
            available_branches: new.location.available_branches.clone(),
        })
        .await?;
        tx.put_rental_info(&rental_info_from(id, &new.rental_info)).await?;
        insert_documents_media(tx.as_mut(), id, &new.documents, &new.media).await?;
        tx.put_status(&status_from(id, &new.status)).await?;

        let details = load_details(tx.as_mut(), car).await?;
        tx.commit().await?;
        Ok(details)
    }

    /// A car with owner, location, rates, media, documents and status.
    pub async fn car_details(&self, car_id: Ulid) -> EngineResult<CarDetails> {
        let mut tx = self.tx().await?;
        let car = tx.car(car_id).await?.ok_or(EngineError::NotFound("car", car_id))?;
        load_details(tx.as_mut(), car).await
    }

    pub async fn list_cars(&self, filter: &CarFilter, page: PageRequest) -> EngineResult<Page<Car>> {
        if let (Some(lo), Some(hi)) = (filter.min_price, filter.max_price)
            && lo > hi
        {
            return Err(EngineError::InvalidInput("min_price exceeds max_price".into()));
        }
        let mut tx = self.tx().await?;
        let (items, total) = tx.search_cars(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Cars switched on for rental with no active booking overlapping `[start, end)`.
    pub async fn available_cars(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> EngineResult<Vec<Car>> {
        let span = Span::try_new(start, end).ok_or(EngineError::InvalidTimeRange)?;
        let mut tx = self.tx().await?;
        Ok(tx.available_cars(span).await?)
    }

    /// Apply a typed patch to a car and its sub-records.
    pub async fn update_car(&self, car_id: Ulid, patch: CarPatch) -> EngineResult<CarDetails> {
        let details = retry_serializable!("update_car", self.try_update_car(car_id, &patch, now()).await)?;
        info!("car {car_id} updated");
        Ok(details)
    }

    async fn try_update_car(&self, car_id: Ulid, patch: &CarPatch, now: DateTime<Utc>) -> EngineResult<CarDetails> {
        let mut tx = self.tx().await?;
        let mut car = tx.car(car_id).await?.ok_or(EngineError::NotFound("car", car_id))?;

        if let Some(owner_id) = patch.owner_id
            && tx.owner(owner_id).await?.is_none()
        {
            return Err(EngineError::NotFound("owner", owner_id));
        }
        if let Some(number) = &patch.vehicle_number {
            ensure_vehicle_number_free(tx.as_mut(), number, car_id).await?;
        }
        patch.apply_to(&mut car);
        validate::car(&car, now)?;
        car.updated_at = now;
        tx.update_car(&car)
            .await
            .map_err(|e| vehicle_number_taken(e, &car.vehicle_number))?;

        if let Some(p) = &patch.location {
            let mut location = tx
                .location(car_id)
                .await?
                .ok_or_else(|| EngineError::InvalidInput("car has no location to update".into()))?;
            p.apply_to(&mut location);
            validate::location(&location)?;
            tx.put_location(&location).await?;
        }
        if let Some(p) = &patch.rental_info {
            let mut info = tx
                .rental_info(car_id)
                .await?
                .ok_or_else(|| EngineError::InvalidInput("car has no rental info to update".into()))?;
            p.apply_to(&mut info);
            validate::rental_info(&info)?;
            tx.put_rental_info(&info).await?;
        }
        if let Some(p) = &patch.status {
            // is_available lives on the car row; the rest on the status record
            if let Some(mut status) = tx.status(car_id).await? {
                p.apply_to(&mut status);
                validate::status(&status, car.is_available)?;
                tx.put_status(&status).await?;
            }
        }

        let details = load_details(tx.as_mut(), car).await?;
        tx.commit().await?;
        Ok(details)
    }

    /// Delete a car with its sub-records and booking history. Refused while
    /// any booking on it is still active.
    pub async fn delete_car(&self, car_id: Ulid) -> EngineResult<()> {
        self.delete_car_at(car_id, now()).await
    }

    pub(crate) async fn delete_car_at(&self, car_id: Ulid, now: DateTime<Utc>) -> EngineResult<()> {
        retry_serializable!("delete_car", async {
            let mut tx = self.tx().await?;
            if tx.car(car_id).await?.is_none() {
                return Err(EngineError::NotFound("car", car_id));
            }
            if !tx.active_bookings_for_car(car_id, now).await?.is_empty() {
                return Err(EngineError::HasDependents("car has active bookings"));
            }
            tx.delete_car(car_id).await?;
            tx.commit().await?;
            Ok(())
        }
        .await)?;
        info!("car {car_id} deleted");
        Ok(())
    }

    /// Flip the maintenance switch.
    pub async fn toggle_car_availability(&self, car_id: Ulid) -> EngineResult<Car> {
        let car = retry_serializable!("toggle_availability", async {
            let mut tx = self.tx().await?;
            let mut car = tx.car(car_id).await?.ok_or(EngineError::NotFound("car", car_id))?;
            car.is_available = !car.is_available;
            car.updated_at = now();
            tx.update_car(&car).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(car)
        }
        .await)?;
        info!("car {car_id} availability set to {}", car.is_available);
        Ok(car)
    }
}
