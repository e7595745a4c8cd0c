use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use super::{Store, StoreError, StoreResult, StoreTx};
use crate::model::*;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Ulid, User>,
    owners: HashMap<Ulid, Owner>,
    cars: HashMap<Ulid, Car>,
    locations: HashMap<Ulid, CarLocation>,
    rental_infos: HashMap<Ulid, RentalInfo>,
    statuses: HashMap<Ulid, CarStatus>,
    media: HashMap<Ulid, CarMedia>,
    documents: HashMap<Ulid, CarDocument>,
    bookings: HashMap<Ulid, Booking>,
    sessions: HashMap<Ulid, CreationSession>,
}

impl Tables {
    /// Mirrors the database's exclusion constraint on booked intervals.
    fn check_exclusion(&self, booking: &Booking) -> StoreResult<()> {
        if booking.status != BookingStatus::Booked {
            return Ok(());
        }
        let span = booking.span();
        let clash = self.bookings.values().any(|b| {
            b.id != booking.id
                && b.car_id == booking.car_id
                && b.status == BookingStatus::Booked
                && b.span().overlaps(&span)
        });
        if clash { Err(StoreError::Exclusion) } else { Ok(()) }
    }

    fn remove_car(&mut self, id: Ulid) {
        self.cars.remove(&id);
        self.locations.remove(&id);
        self.rental_infos.remove(&id);
        self.statuses.remove(&id);
        self.media.retain(|_, m| m.car_id != id);
        self.documents.retain(|_, d| d.car_id != id);
        self.bookings.retain(|_, b| b.car_id != id);
        self.sessions.retain(|_, s| s.car_id != id);
    }

    fn check_vehicle_number(&self, car: &Car) -> StoreResult<()> {
        let taken = self
            .cars
            .values()
            .any(|c| c.id != car.id && c.vehicle_number == car.vehicle_number);
        if taken {
            Err(StoreError::Duplicate("cars_vehicle_number_key".into()))
        } else {
            Ok(())
        }
    }
}

fn paginate<T>(mut items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.page_size as usize).min(items.len());
    items.truncate(end);
    (items.split_off(start), total)
}

/// In-process store. Transactions are serialized behind one lock and work
/// on a private copy of the tables that replaces the shared copy on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.work.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("users_email_key".into()));
        }
        self.work.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.work.users.values().find(|u| u.email == email).cloned())
    }

    async fn user(&mut self, id: Ulid) -> StoreResult<Option<User>> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn insert_owner(&mut self, owner: &Owner) -> StoreResult<()> {
        self.work.owners.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn update_owner(&mut self, owner: &Owner) -> StoreResult<()> {
        self.work.owners.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn delete_owner(&mut self, id: Ulid) -> StoreResult<()> {
        self.work.owners.remove(&id);
        Ok(())
    }

    async fn owner(&mut self, id: Ulid) -> StoreResult<Option<Owner>> {
        Ok(self.work.owners.get(&id).cloned())
    }

    async fn owners(&mut self) -> StoreResult<Vec<Owner>> {
        let mut owners: Vec<_> = self.work.owners.values().cloned().collect();
        owners.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owners)
    }

    async fn insert_car(&mut self, car: &Car) -> StoreResult<()> {
        self.work.check_vehicle_number(car)?;
        self.work.cars.insert(car.id, car.clone());
        Ok(())
    }

    async fn update_car(&mut self, car: &Car) -> StoreResult<()> {
        self.work.check_vehicle_number(car)?;
        self.work.cars.insert(car.id, car.clone());
        Ok(())
    }

    async fn delete_car(&mut self, id: Ulid) -> StoreResult<()> {
        self.work.remove_car(id);
        Ok(())
    }

    async fn car(&mut self, id: Ulid) -> StoreResult<Option<Car>> {
        Ok(self.work.cars.get(&id).cloned())
    }

    async fn car_by_vehicle_number(&mut self, number: &str) -> StoreResult<Option<Car>> {
        Ok(self.work.cars.values().find(|c| c.vehicle_number == number).cloned())
    }

    async fn cars_for_owner(&mut self, owner_id: Ulid) -> StoreResult<Vec<Car>> {
        let mut cars: Vec<_> = self
            .work
            .cars
            .values()
            .filter(|c| c.owner_id == Some(owner_id))
            .cloned()
            .collect();
        cars.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(cars)
    }

    async fn search_cars(&mut self, filter: &CarFilter, page: PageRequest) -> StoreResult<(Vec<Car>, u64)> {
        let t = &self.work;
        let mut cars: Vec<_> = t
            .cars
            .values()
            .filter(|c| filter.matches(c, t.rental_infos.get(&c.id)))
            .cloned()
            .collect();
        cars.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(cars, page))
    }

    async fn available_cars(&mut self, span: Span) -> StoreResult<Vec<Car>> {
        let t = &self.work;
        let mut cars: Vec<_> = t
            .cars
            .values()
            .filter(|c| c.is_available)
            .filter(|c| {
                !t.bookings.values().any(|b| {
                    b.car_id == c.id && b.status == BookingStatus::Booked && b.span().overlaps(&span)
                })
            })
            .cloned()
            .collect();
        cars.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(cars)
    }

    async fn put_location(&mut self, location: &CarLocation) -> StoreResult<()> {
        self.work.locations.insert(location.car_id, location.clone());
        Ok(())
    }

    async fn location(&mut self, car_id: Ulid) -> StoreResult<Option<CarLocation>> {
        Ok(self.work.locations.get(&car_id).cloned())
    }

    async fn put_rental_info(&mut self, info: &RentalInfo) -> StoreResult<()> {
        self.work.rental_infos.insert(info.car_id, info.clone());
        Ok(())
    }

    async fn rental_info(&mut self, car_id: Ulid) -> StoreResult<Option<RentalInfo>> {
        Ok(self.work.rental_infos.get(&car_id).cloned())
    }

    async fn put_status(&mut self, status: &CarStatus) -> StoreResult<()> {
        self.work.statuses.insert(status.car_id, status.clone());
        Ok(())
    }

    async fn status(&mut self, car_id: Ulid) -> StoreResult<Option<CarStatus>> {
        Ok(self.work.statuses.get(&car_id).cloned())
    }

    async fn insert_media(&mut self, media: &CarMedia) -> StoreResult<()> {
        self.work.media.insert(media.id, media.clone());
        Ok(())
    }

    async fn media(&mut self, car_id: Ulid) -> StoreResult<Vec<CarMedia>> {
        let mut media: Vec<_> = self.work.media.values().filter(|m| m.car_id == car_id).cloned().collect();
        media.sort_by_key(|m| m.id);
        Ok(media)
    }

    async fn insert_document(&mut self, doc: &CarDocument) -> StoreResult<()> {
        self.work.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn documents(&mut self, car_id: Ulid) -> StoreResult<Vec<CarDocument>> {
        let mut docs: Vec<_> = self
            .work
            .documents
            .values()
            .filter(|d| d.car_id == car_id)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.work.check_exclusion(booking)?;
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.work.check_exclusion(booking)?;
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking(&mut self, id: Ulid) -> StoreResult<Option<Booking>> {
        Ok(self.work.bookings.get(&id).cloned())
    }

    async fn booked_overlapping(&mut self, car_id: Ulid, span: Span) -> StoreResult<Vec<Booking>> {
        Ok(self
            .work
            .bookings
            .values()
            .filter(|b| b.car_id == car_id && b.status == BookingStatus::Booked && b.span().overlaps(&span))
            .cloned()
            .collect())
    }

    async fn active_bookings_for_car(&mut self, car_id: Ulid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        Ok(self
            .work
            .bookings
            .values()
            .filter(|b| b.car_id == car_id && b.status == BookingStatus::Booked && b.end_time > now)
            .cloned()
            .collect())
    }

    async fn bookings_for_user(&mut self, user_id: Ulid) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<_> = self
            .work
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn search_bookings(&mut self, filter: &BookingFilter, page: PageRequest) -> StoreResult<(Vec<Booking>, u64)> {
        let mut bookings: Vec<_> = self.work.bookings.values().filter(|b| filter.matches(b)).cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(bookings, page))
    }

    async fn complete_elapsed(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut n = 0;
        for b in self.work.bookings.values_mut() {
            if b.status == BookingStatus::Booked && b.end_time <= now {
                b.status = BookingStatus::Completed;
                b.updated_at = now;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn insert_session(&mut self, session: &CreationSession) -> StoreResult<()> {
        self.work.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn session(&mut self, id: Ulid) -> StoreResult<Option<CreationSession>> {
        Ok(self.work.sessions.get(&id).cloned())
    }

    async fn advance_session(
        &mut self,
        id: Ulid,
        from: CreationStage,
        to: CreationStage,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.work.sessions.get_mut(&id) {
            Some(s) if s.stage == from => {
                s.stage = to;
                s.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_sessions(&mut self, before: DateTime<Utc>) -> StoreResult<u64> {
        let stale: Vec<CreationSession> = self
            .work
            .sessions
            .values()
            .filter(|s| s.expires_at < before)
            .cloned()
            .collect();
        for s in &stale {
            self.work.sessions.remove(&s.id);
            if s.stage != CreationStage::Completed {
                self.work.remove_car(s.car_id);
            }
        }
        Ok(stale.len() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
