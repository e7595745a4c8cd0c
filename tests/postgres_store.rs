//! Runs against a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use sqlx::postgres::PgPoolOptions;
use ulid::Ulid;

use fleetbook::engine::{Engine, EngineError};
use fleetbook::model::*;
use fleetbook::store::{PgStore, Store, StoreError};

async fn pg_store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    let pool = PgPoolOptions::new().max_connections(16).connect(&url).await.unwrap();
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    store
}

async fn seeded_car(engine: &Engine) -> Ulid {
    let owner = engine
        .create_owner(OwnerInput {
            name: "PG Fleet".into(),
            contact_info: "pg@example.com".into(),
        })
        .await
        .unwrap();
    let details = engine
        .create_car(NewCar {
            basic: BasicDetailsStep {
                make: "Skoda".into(),
                model: "Octavia".into(),
                year: 2021,
                variant: "Style".into(),
                fuel_type: FuelType::Diesel,
                transmission: Transmission::Manual,
                body_type: BodyType::Sedan,
                color: "Grey".into(),
                seating_capacity: 5,
                vehicle_number: format!("PG-{}", Ulid::new()),
                registration_state: "MH".into(),
            },
            owner_id: owner.id,
            location: LocationDetailsStep {
                current_location: "Depot".into(),
                available_branches: vec!["Depot".into()],
            },
            rental_info: RentalInfoStep {
                rental_price_per_day: 120.0,
                rental_price_per_hour: None,
                minimum_rent_duration: 1,
                maximum_rent_duration: 240,
                security_deposit: 0.0,
                late_fee_per_hour: 0.0,
                discounts: None,
            },
            documents: vec![],
            media: vec![NewMedia {
                kind: MediaKind::Image,
                url: "https://cdn.example.com/pg.jpg".into(),
                is_primary: true,
            }],
            status: StatusInfoStep {
                is_available: true,
                current_odometer_reading: 0.0,
                last_service_date: None,
                next_service_due: None,
                damages_or_issues: vec![],
            },
        })
        .await
        .unwrap();
    details.car.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_bookings_admit_exactly_one() {
    let engine = Arc::new(Engine::new(Arc::new(pg_store().await)).with_hash_cost(4));
    let car = seeded_car(&engine).await;

    let mut users = Vec::new();
    for i in 0..8 {
        let email = format!("pg{i}-{}@example.com", Ulid::new());
        users.push(engine.register("Racer", &email, "secret-pw", Role::User).await.unwrap().id);
    }
    let start = Utc::now() + TimeDelta::days(3);

    let handles = users.into_iter().map(|user| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .create_booking(user, car, start, start + TimeDelta::hours(4))
                .await
        })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::AlreadyBooked(_))));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn exclusion_constraint_rejects_overlap_and_ignores_cancelled() {
    let store = pg_store().await;
    let engine = Engine::new(Arc::new(store.clone())).with_hash_cost(4);
    let car = seeded_car(&engine).await;
    let user = engine
        .register("Pg", &format!("pg-{}@example.com", Ulid::new()), "secret-pw", Role::User)
        .await
        .unwrap()
        .id;

    let start = Utc::now() + TimeDelta::days(5);
    let booking = |offset: i64, status: BookingStatus| Booking {
        id: Ulid::new(),
        user_id: user,
        car_id: car,
        start_time: start + TimeDelta::hours(offset),
        end_time: start + TimeDelta::hours(offset + 2),
        status,
        total_price: 10.0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_booking(&booking(0, BookingStatus::Booked)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_booking(&booking(1, BookingStatus::Booked)).await.unwrap_err();
    assert!(matches!(err, StoreError::Exclusion), "{err}");
    drop(tx);

    // adjacent and cancelled rows are both fine
    let mut tx = store.begin().await.unwrap();
    tx.insert_booking(&booking(2, BookingStatus::Booked)).await.unwrap();
    tx.insert_booking(&booking(1, BookingStatus::Cancelled)).await.unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn purge_drops_cars_of_abandoned_sessions() {
    let engine = Engine::new(Arc::new(pg_store().await)).with_hash_cost(4);
    let session = engine.initiate_creation().await.unwrap();
    engine
        .submit_step(
            session.id,
            StepPayload::BasicDetails(BasicDetailsStep {
                make: "Skoda".into(),
                model: "Fabia".into(),
                year: 2020,
                variant: "Base".into(),
                fuel_type: FuelType::Petrol,
                transmission: Transmission::Manual,
                body_type: BodyType::Hatchback,
                color: "White".into(),
                seating_capacity: 5,
                vehicle_number: format!("PG-HALF-{}", Ulid::new()),
                registration_state: "MH".into(),
            }),
        )
        .await
        .unwrap();
    assert!(!engine.car_details(session.car_id).await.unwrap().car.is_available);

    let purged = engine
        .purge_stale_sessions(Utc::now() + TimeDelta::days(30))
        .await
        .unwrap();
    assert!(purged >= 1);
    assert!(matches!(
        engine.car_details(session.car_id).await,
        Err(EngineError::NotFound("car", _))
    ));
}
