use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use ulid::Ulid;
use uuid::Uuid;

use super::rows::*;
use super::{Store, StoreError, StoreResult, StoreTx};
use crate::model::*;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                Some("40001") | Some("40P01") => return StoreError::Serialization,
                Some("23P01") => return StoreError::Exclusion,
                Some("23505") => {
                    return StoreError::Duplicate(db.constraint().unwrap_or_default().to_string());
                }
                _ => {}
            }
        }
        StoreError::Backend(e.to_string())
    }
}

fn uuid(id: Ulid) -> Uuid {
    id.into()
}

/// PostgreSQL-backed store. Every transaction runs at SERIALIZABLE.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn push_car_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CarFilter) {
    if let Some(make) = &filter.make {
        qb.push(" AND c.make ILIKE ").push_bind(format!("%{make}%"));
    }
    if let Some(model) = &filter.model {
        qb.push(" AND c.model ILIKE ").push_bind(format!("%{model}%"));
    }
    if let Some(number) = &filter.vehicle_number {
        qb.push(" AND c.vehicle_number ILIKE ").push_bind(format!("%{number}%"));
    }
    if let Some(year) = filter.year {
        qb.push(" AND c.year = ").push_bind(year);
    }
    if let Some(year) = filter.min_year {
        qb.push(" AND c.year >= ").push_bind(year);
    }
    if let Some(year) = filter.max_year {
        qb.push(" AND c.year <= ").push_bind(year);
    }
    if let Some(fuel) = filter.fuel_type {
        qb.push(" AND c.fuel_type = ").push_bind(fuel.as_str());
    }
    if let Some(t) = filter.transmission {
        qb.push(" AND c.transmission = ").push_bind(t.as_str());
    }
    if let Some(body) = filter.body_type {
        qb.push(" AND c.body_type = ").push_bind(body.as_str());
    }
    if let Some(available) = filter.is_available {
        qb.push(" AND c.is_available = ").push_bind(available);
    }
    if let Some(price) = filter.min_price {
        qb.push(" AND r.rental_price_per_day >= ").push_bind(price);
    }
    if let Some(price) = filter.max_price {
        qb.push(" AND r.rental_price_per_day <= ").push_bind(price);
    }
}

fn push_booking_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(d) = filter.start_date {
        qb.push(" AND start_time >= ").push_bind(d);
    }
    if let Some(d) = filter.end_date {
        qb.push(" AND end_time <= ").push_bind(d);
    }
    if let Some(id) = filter.car_id {
        qb.push(" AND car_id = ").push_bind(uuid(id));
    }
    if let Some(id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(uuid(id));
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(uuid(user.id))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn user(&mut self, id: Ulid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(uuid(id))
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert_owner(&mut self, owner: &Owner) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO owners (id, name, contact_info, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid(owner.id))
        .bind(&owner.name)
        .bind(&owner.contact_info)
        .bind(owner.created_at)
        .bind(owner.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_owner(&mut self, owner: &Owner) -> StoreResult<()> {
        sqlx::query("UPDATE owners SET name = $2, contact_info = $3, updated_at = $4 WHERE id = $1")
            .bind(uuid(owner.id))
            .bind(&owner.name)
            .bind(&owner.contact_info)
            .bind(owner.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_owner(&mut self, id: Ulid) -> StoreResult<()> {
        sqlx::query("DELETE FROM owners WHERE id = $1")
            .bind(uuid(id))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn owner(&mut self, id: Ulid) -> StoreResult<Option<Owner>> {
        let row: Option<OwnerRow> =
            sqlx::query_as(&format!("SELECT {OWNER_COLUMNS} FROM owners WHERE id = $1"))
                .bind(uuid(id))
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.map(Owner::from))
    }

    async fn owners(&mut self) -> StoreResult<Vec<Owner>> {
        let rows: Vec<OwnerRow> = sqlx::query_as(&format!(
            "SELECT {OWNER_COLUMNS} FROM owners ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Owner::from).collect())
    }

    async fn insert_car(&mut self, car: &Car) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO cars (id, owner_id, make, model, year, variant, fuel_type, transmission,
                body_type, color, seating_capacity, vehicle_number, registration_state,
                is_available, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(uuid(car.id))
        .bind(car.owner_id.map(uuid))
        .bind(&car.make)
        .bind(&car.model)
        .bind(car.year)
        .bind(&car.variant)
        .bind(car.fuel_type.as_str())
        .bind(car.transmission.as_str())
        .bind(car.body_type.as_str())
        .bind(&car.color)
        .bind(car.seating_capacity)
        .bind(&car.vehicle_number)
        .bind(&car.registration_state)
        .bind(car.is_available)
        .bind(car.created_at)
        .bind(car.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_car(&mut self, car: &Car) -> StoreResult<()> {
        sqlx::query(
            "UPDATE cars SET owner_id = $2, make = $3, model = $4, year = $5, variant = $6,
                fuel_type = $7, transmission = $8, body_type = $9, color = $10,
                seating_capacity = $11, vehicle_number = $12, registration_state = $13,
                is_available = $14, updated_at = $15
             WHERE id = $1",
        )
        .bind(uuid(car.id))
        .bind(car.owner_id.map(uuid))
        .bind(&car.make)
        .bind(&car.model)
        .bind(car.year)
        .bind(&car.variant)
        .bind(car.fuel_type.as_str())
        .bind(car.transmission.as_str())
        .bind(car.body_type.as_str())
        .bind(&car.color)
        .bind(car.seating_capacity)
        .bind(&car.vehicle_number)
        .bind(&car.registration_state)
        .bind(car.is_available)
        .bind(car.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_car(&mut self, id: Ulid) -> StoreResult<()> {
        sqlx::query("DELETE FROM car_creation_sessions WHERE car_id = $1")
            .bind(uuid(id))
            .execute(&mut *self.tx)
            .await?;
        // sub-records and bookings cascade
        sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(uuid(id))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn car(&mut self, id: Ulid) -> StoreResult<Option<Car>> {
        let row: Option<CarRow> =
            sqlx::query_as(&format!("SELECT {CAR_COLUMNS} FROM cars c WHERE c.id = $1"))
                .bind(uuid(id))
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(Car::try_from).transpose()
    }

    async fn car_by_vehicle_number(&mut self, number: &str) -> StoreResult<Option<Car>> {
        let row: Option<CarRow> = sqlx::query_as(&format!(
            "SELECT {CAR_COLUMNS} FROM cars c WHERE c.vehicle_number = $1"
        ))
        .bind(number)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Car::try_from).transpose()
    }

    async fn cars_for_owner(&mut self, owner_id: Ulid) -> StoreResult<Vec<Car>> {
        let rows: Vec<CarRow> = sqlx::query_as(&format!(
            "SELECT {CAR_COLUMNS} FROM cars c WHERE c.owner_id = $1
             ORDER BY c.created_at DESC, c.id DESC"
        ))
        .bind(uuid(owner_id))
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn search_cars(&mut self, filter: &CarFilter, page: PageRequest) -> StoreResult<(Vec<Car>, u64)> {
        const FROM: &str = " FROM cars c LEFT JOIN car_rental_infos r ON r.car_id = c.id WHERE TRUE";

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        count.push(FROM);
        push_car_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *self.tx).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {CAR_COLUMNS}"));
        qb.push(FROM);
        push_car_filter(&mut qb, filter);
        qb.push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows: Vec<CarRow> = qb.build_query_as().fetch_all(&mut *self.tx).await?;

        Ok((convert_all(rows)?, total as u64))
    }

    async fn available_cars(&mut self, span: Span) -> StoreResult<Vec<Car>> {
        let rows: Vec<CarRow> = sqlx::query_as(&format!(
            "SELECT {CAR_COLUMNS} FROM cars c
             WHERE c.is_available
               AND NOT EXISTS (
                   SELECT 1 FROM bookings b
                   WHERE b.car_id = c.id
                     AND b.status = 'booked'
                     AND b.start_time < $2
                     AND $1 < b.end_time)
             ORDER BY c.created_at DESC, c.id DESC"
        ))
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn put_location(&mut self, location: &CarLocation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO car_locations (car_id, current_location, available_branches)
             VALUES ($1, $2, $3)
             ON CONFLICT (car_id) DO UPDATE
             SET current_location = EXCLUDED.current_location,
                 available_branches = EXCLUDED.available_branches",
        )
        .bind(uuid(location.car_id))
        .bind(&location.current_location)
        .bind(&location.available_branches)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn location(&mut self, car_id: Ulid) -> StoreResult<Option<CarLocation>> {
        let row: Option<LocationRow> = sqlx::query_as(
            "SELECT car_id, current_location, available_branches FROM car_locations WHERE car_id = $1",
        )
        .bind(uuid(car_id))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(CarLocation::from))
    }

    async fn put_rental_info(&mut self, info: &RentalInfo) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO car_rental_infos (car_id, rental_price_per_day, rental_price_per_hour,
                minimum_rent_duration, maximum_rent_duration, security_deposit,
                late_fee_per_hour, discounts)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (car_id) DO UPDATE
             SET rental_price_per_day = EXCLUDED.rental_price_per_day,
                 rental_price_per_hour = EXCLUDED.rental_price_per_hour,
                 minimum_rent_duration = EXCLUDED.minimum_rent_duration,
                 maximum_rent_duration = EXCLUDED.maximum_rent_duration,
                 security_deposit = EXCLUDED.security_deposit,
                 late_fee_per_hour = EXCLUDED.late_fee_per_hour,
                 discounts = EXCLUDED.discounts",
        )
        .bind(uuid(info.car_id))
        .bind(info.rental_price_per_day)
        .bind(info.rental_price_per_hour)
        .bind(info.minimum_rent_duration)
        .bind(info.maximum_rent_duration)
        .bind(info.security_deposit)
        .bind(info.late_fee_per_hour)
        .bind(&info.discounts)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn rental_info(&mut self, car_id: Ulid) -> StoreResult<Option<RentalInfo>> {
        let row: Option<RentalInfoRow> = sqlx::query_as(
            "SELECT car_id, rental_price_per_day, rental_price_per_hour, minimum_rent_duration,
                    maximum_rent_duration, security_deposit, late_fee_per_hour, discounts
             FROM car_rental_infos WHERE car_id = $1",
        )
        .bind(uuid(car_id))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(RentalInfo::from))
    }

    async fn put_status(&mut self, status: &CarStatus) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO car_statuses (car_id, current_odometer_reading, last_service_date,
                next_service_due, damages_or_issues)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (car_id) DO UPDATE
             SET current_odometer_reading = EXCLUDED.current_odometer_reading,
                 last_service_date = EXCLUDED.last_service_date,
                 next_service_due = EXCLUDED.next_service_due,
                 damages_or_issues = EXCLUDED.damages_or_issues",
        )
        .bind(uuid(status.car_id))
        .bind(status.current_odometer_reading)
        .bind(status.last_service_date)
        .bind(status.next_service_due)
        .bind(&status.damages_or_issues)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn status(&mut self, car_id: Ulid) -> StoreResult<Option<CarStatus>> {
        let row: Option<StatusRow> = sqlx::query_as(
            "SELECT car_id, current_odometer_reading, last_service_date, next_service_due,
                    damages_or_issues
             FROM car_statuses WHERE car_id = $1",
        )
        .bind(uuid(car_id))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(CarStatus::from))
    }

    async fn insert_media(&mut self, media: &CarMedia) -> StoreResult<()> {
        sqlx::query("INSERT INTO car_media (id, car_id, kind, url, is_primary) VALUES ($1, $2, $3, $4, $5)")
            .bind(uuid(media.id))
            .bind(uuid(media.car_id))
            .bind(media.kind.as_str())
            .bind(&media.url)
            .bind(media.is_primary)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn media(&mut self, car_id: Ulid) -> StoreResult<Vec<CarMedia>> {
        let rows: Vec<MediaRow> =
            sqlx::query_as("SELECT id, car_id, kind, url, is_primary FROM car_media WHERE car_id = $1 ORDER BY id")
                .bind(uuid(car_id))
                .fetch_all(&mut *self.tx)
                .await?;
        convert_all(rows)
    }

    async fn insert_document(&mut self, doc: &CarDocument) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO car_documents (id, car_id, document_type, reference, valid_until)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid(doc.id))
        .bind(uuid(doc.car_id))
        .bind(&doc.document_type)
        .bind(&doc.reference)
        .bind(doc.valid_until)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn documents(&mut self, car_id: Ulid) -> StoreResult<Vec<CarDocument>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, car_id, document_type, reference, valid_until
             FROM car_documents WHERE car_id = $1 ORDER BY id",
        )
        .bind(uuid(car_id))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(CarDocument::from).collect())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(uuid(booking.id))
        .bind(uuid(booking.user_id))
        .bind(uuid(booking.car_id))
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status.as_str())
        .bind(booking.total_price)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            "UPDATE bookings SET start_time = $2, end_time = $3, status = $4, total_price = $5,
                updated_at = $6
             WHERE id = $1",
        )
        .bind(uuid(booking.id))
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status.as_str())
        .bind(booking.total_price)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn booking(&mut self, id: Ulid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(uuid(id))
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn booked_overlapping(&mut self, car_id: Ulid, span: Span) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE car_id = $1 AND status = 'booked' AND start_time < $3 AND $2 < end_time
             ORDER BY start_time"
        ))
        .bind(uuid(car_id))
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn active_bookings_for_car(&mut self, car_id: Ulid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE car_id = $1 AND status = 'booked' AND end_time > $2
             ORDER BY start_time"
        ))
        .bind(uuid(car_id))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn bookings_for_user(&mut self, user_id: Ulid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(uuid(user_id))
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn search_bookings(
        &mut self,
        filter: &BookingFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings WHERE TRUE");
        push_booking_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *self.tx).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE TRUE"));
        push_booking_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows: Vec<BookingRow> = qb.build_query_as().fetch_all(&mut *self.tx).await?;

        Ok((convert_all(rows)?, total as u64))
    }

    async fn complete_elapsed(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let res = sqlx::query(
            "UPDATE bookings SET status = 'completed', updated_at = $1
             WHERE status = 'booked' AND end_time <= $1",
        )
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn insert_session(&mut self, session: &CreationSession) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO car_creation_sessions ({SESSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(uuid(session.id))
        .bind(uuid(session.car_id))
        .bind(session.stage.as_str())
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn session(&mut self, id: Ulid) -> StoreResult<Option<CreationSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM car_creation_sessions WHERE id = $1"
        ))
        .bind(uuid(id))
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CreationSession::try_from).transpose()
    }

    async fn advance_session(
        &mut self,
        id: Ulid,
        from: CreationStage,
        to: CreationStage,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE car_creation_sessions SET stage = $3, updated_at = $4
             WHERE id = $1 AND stage = $2",
        )
        .bind(uuid(id))
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn purge_sessions(&mut self, before: DateTime<Utc>) -> StoreResult<u64> {
        let purged: Vec<(Uuid, String)> = sqlx::query_as(
            "DELETE FROM car_creation_sessions WHERE expires_at < $1 RETURNING car_id, stage",
        )
        .bind(before)
        .fetch_all(&mut *self.tx)
        .await?;
        let abandoned: Vec<Uuid> = purged
            .iter()
            .filter(|(_, stage)| stage != CreationStage::Completed.as_str())
            .map(|(car_id, _)| *car_id)
            .collect();
        if !abandoned.is_empty() {
            // sub-records and bookings cascade
            sqlx::query("DELETE FROM cars WHERE id = ANY($1)")
                .bind(&abandoned)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(purged.len() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
