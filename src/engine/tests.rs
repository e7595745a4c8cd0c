use super::*;
use crate::model::*;
use crate::store::MemoryStore;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};
use std::sync::Arc;
use ulid::Ulid;

fn engine() -> Engine {
    Engine::new(Arc::new(MemoryStore::new())).with_hash_cost(4)
}

/// Tomorrow at a whole hour, so spans built from it are always bookable.
fn base() -> DateTime<Utc> {
    let t = Utc::now() + TimeDelta::days(1);
    t - TimeDelta::seconds(t.timestamp() % 3600)
}

fn hours(h: i64) -> TimeDelta {
    TimeDelta::hours(h)
}

async fn account(e: &Engine, name: &str, role: Role) -> Actor {
    let user = e
        .register(name, &format!("{name}@example.com"), "secret-pw", role)
        .await
        .unwrap();
    Actor {
        user_id: user.id,
        role: user.role,
    }
}

fn basic(vehicle_number: &str) -> BasicDetailsStep {
    BasicDetailsStep {
        make: "Toyota".into(),
        model: "Corolla".into(),
        year: 2022,
        variant: "GLi".into(),
        fuel_type: FuelType::Petrol,
        transmission: Transmission::Automatic,
        body_type: BodyType::Sedan,
        color: "White".into(),
        seating_capacity: 5,
        vehicle_number: vehicle_number.into(),
        registration_state: "KA".into(),
    }
}

fn rates() -> RentalInfoStep {
    RentalInfoStep {
        rental_price_per_day: 200.0,
        rental_price_per_hour: Some(10.0),
        minimum_rent_duration: 1,
        maximum_rent_duration: 720,
        security_deposit: 500.0,
        late_fee_per_hour: 15.0,
        discounts: None,
    }
}

fn location() -> LocationDetailsStep {
    LocationDetailsStep {
        current_location: "Airport".into(),
        available_branches: vec!["Airport".into(), "Downtown".into()],
    }
}

fn gallery() -> DocumentsMediaStep {
    DocumentsMediaStep {
        documents: vec![NewDocument {
            document_type: "insurance".into(),
            reference: "POL-1".into(),
            valid_until: None,
        }],
        media: vec![NewMedia {
            kind: MediaKind::Image,
            url: "https://cdn.example.com/front.jpg".into(),
            is_primary: true,
        }],
    }
}

fn condition() -> StatusInfoStep {
    StatusInfoStep {
        is_available: true,
        current_odometer_reading: 12_000.0,
        last_service_date: None,
        next_service_due: None,
        damages_or_issues: vec![],
    }
}

async fn owner(e: &Engine) -> Owner {
    e.create_owner(OwnerInput {
        name: "Fleet Co".into(),
        contact_info: "fleet@example.com".into(),
    })
    .await
    .unwrap()
}

async fn car_for(e: &Engine, owner_id: Ulid, vehicle_number: &str) -> Ulid {
    let details = e
        .create_car(NewCar {
            basic: basic(vehicle_number),
            owner_id,
            location: location(),
            rental_info: rates(),
            documents: gallery().documents,
            media: gallery().media,
            status: condition(),
        })
        .await
        .unwrap();
    details.car.id
}

async fn car(e: &Engine) -> Ulid {
    let o = owner(e).await;
    car_for(e, o.id, &format!("KA01-{}", Ulid::new())).await
}

// ── Booking conflicts ────────────────────────────────────────────

#[tokio::test]
async fn booking_prices_and_persists() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(u.user_id, c, t, t + hours(25)).await.unwrap();
    assert_eq!(b.status, BookingStatus::Booked);
    assert!((b.total_price - 208.333).abs() < 0.01);

    let short = e.create_booking(u.user_id, c, t + hours(30), t + hours(33)).await.unwrap();
    assert_eq!(short.total_price, 30.0);

    let fetched = e.get_booking(b.id, u).await.unwrap();
    assert_eq!(fetched, b);
}

#[tokio::test]
async fn overlapping_booking_is_rejected() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    e.create_booking(u.user_id, c, t, t + hours(4)).await.unwrap();
    let err = e.create_booking(u.user_id, c, t + hours(2), t + hours(6)).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyBooked(id) if id == c));

    let inside = e.create_booking(u.user_id, c, t + hours(1), t + hours(2)).await;
    assert!(matches!(inside, Err(EngineError::AlreadyBooked(_))));
}

#[tokio::test]
async fn adjacent_bookings_do_not_conflict() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    e.create_booking(u.user_id, c, t, t + hours(2)).await.unwrap();
    e.create_booking(u.user_id, c, t + hours(2), t + hours(4)).await.unwrap();
    e.create_booking(u.user_id, c, t - hours(2), t).await.unwrap();

    assert!(!e.has_conflict(c, t + hours(4), t + hours(5)).await.unwrap());
    assert!(e.has_conflict(c, t + hours(3), t + hours(5)).await.unwrap());
}

#[tokio::test]
async fn different_cars_never_conflict() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let o = owner(&e).await;
    let a = car_for(&e, o.id, "KA01-A").await;
    let b = car_for(&e, o.id, "KA01-B").await;
    let t = base();

    assert_ok!(e.create_booking(u.user_id, a, t, t + hours(3)).await);
    assert_ok!(e.create_booking(u.user_id, b, t, t + hours(3)).await);
    assert_err!(e.create_booking(u.user_id, b, t + hours(1), t + hours(2)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_requests_admit_exactly_one() {
    let e = Arc::new(engine());
    let c = car(&e).await;
    let mut users = Vec::new();
    for i in 0..8 {
        users.push(account(&e, &format!("racer{i}"), Role::User).await);
    }
    let t = base();

    let handles = users.iter().enumerate().map(|(i, u)| {
        let e = e.clone();
        let user_id = u.user_id;
        // every request overlaps every other one
        let start = t + TimeDelta::minutes(i as i64 * 10);
        tokio::spawn(async move { e.create_booking(user_id, c, start, start + hours(3)).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::AlreadyBooked(_))))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(refused, 7);
}

#[tokio::test]
async fn invalid_ranges_are_rejected() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let reversed = e.create_booking(u.user_id, c, t + hours(2), t).await;
    assert!(matches!(reversed, Err(EngineError::InvalidTimeRange)));
    let empty = e.create_booking(u.user_id, c, t, t).await;
    assert!(matches!(empty, Err(EngineError::InvalidTimeRange)));
    let past = e
        .create_booking(u.user_id, c, Utc::now() - hours(3), Utc::now() + hours(1))
        .await;
    assert!(matches!(past, Err(EngineError::InvalidTimeRange)));
    assert!(matches!(
        e.has_conflict(c, t, t).await,
        Err(EngineError::InvalidTimeRange)
    ));
}

#[tokio::test]
async fn booking_unknown_car_is_not_found() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let t = base();
    let missing = Ulid::new();
    let err = e.create_booking(u.user_id, missing, t, t + hours(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound("car", id) if id == missing));
}

#[tokio::test]
async fn switched_off_car_cannot_be_booked() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let car = e.toggle_car_availability(c).await.unwrap();
    assert!(!car.is_available);
    let err = e.create_booking(u.user_id, c, t, t + hours(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::CarUnavailable(_)));

    e.toggle_car_availability(c).await.unwrap();
    e.create_booking(u.user_id, c, t, t + hours(2)).await.unwrap();
}

#[tokio::test]
async fn car_without_rates_cannot_be_booked() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let session = e.initiate_creation().await.unwrap();
    e.submit_step(session.id, StepPayload::BasicDetails(basic("KA01-NORATE")))
        .await
        .unwrap();
    // switched on by hand before the session reached its rental step
    e.toggle_car_availability(session.car_id).await.unwrap();
    let t = base();

    let err = e
        .create_booking(u.user_id, session.car_id, t, t + hours(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingRates(id) if id == session.car_id));
}

#[tokio::test]
async fn rental_duration_bounds_apply() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let short = e
        .create_booking(u.user_id, c, t, t + TimeDelta::minutes(30))
        .await
        .unwrap_err();
    assert!(matches!(short, EngineError::InvalidDuration { min: 1, max: 720, .. }));

    let long = e.create_booking(u.user_id, c, t, t + TimeDelta::days(31)).await.unwrap_err();
    assert!(matches!(long, EngineError::InvalidDuration { .. }));

    e.create_booking(u.user_id, c, t, t + hours(720)).await.unwrap();
}

// ── Cancellation and lifecycle ───────────────────────────────────

#[tokio::test]
async fn cancel_frees_the_interval() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(u.user_id, c, t, t + hours(3)).await.unwrap();
    let cancelled = e.cancel_booking(b.id, u.user_id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    assert!(!e.has_conflict(c, t, t + hours(3)).await.unwrap());
    e.create_booking(u.user_id, c, t + hours(1), t + hours(2)).await.unwrap();
}

#[tokio::test]
async fn cancel_twice_is_invalid_state() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(u.user_id, c, t, t + hours(3)).await.unwrap();
    e.cancel_booking(b.id, u.user_id).await.unwrap();
    let err = e.cancel_booking(b.id, u.user_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState { status: BookingStatus::Cancelled, .. }
    ));
}

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let e = engine();
    let ada = account(&e, "ada", Role::User).await;
    let bob = account(&e, "bob", Role::User).await;
    let admin = account(&e, "root", Role::Admin).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(ada.user_id, c, t, t + hours(3)).await.unwrap();
    assert!(matches!(
        e.cancel_booking(b.id, bob.user_id).await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        e.cancel_booking(b.id, admin.user_id).await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        e.cancel_booking(Ulid::new(), ada.user_id).await,
        Err(EngineError::NotFound("booking", _))
    ));
}

#[tokio::test]
async fn availability_flag_survives_booking_round_trip() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let visible = |cars: Vec<Car>| cars.iter().any(|car| car.id == c);
    assert!(visible(e.available_cars(t, t + hours(3)).await.unwrap()));

    let b = e.create_booking(u.user_id, c, t, t + hours(3)).await.unwrap();
    assert!(e.car_details(c).await.unwrap().car.is_available);
    assert!(!visible(e.available_cars(t + hours(1), t + hours(2)).await.unwrap()));
    // a later, non-overlapping window is still open
    assert!(visible(e.available_cars(t + hours(3), t + hours(6)).await.unwrap()));
    e.create_booking(u.user_id, c, t + hours(3), t + hours(6)).await.unwrap();

    e.cancel_booking(b.id, u.user_id).await.unwrap();
    assert!(e.car_details(c).await.unwrap().car.is_available);
    assert!(visible(e.available_cars(t, t + hours(3)).await.unwrap()));
}

#[tokio::test]
async fn elapsed_booking_reads_as_completed() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let now = Utc::now();

    let b = e
        .create_booking_at(u.user_id, c, now - hours(5), now - hours(2), now - hours(6))
        .await
        .unwrap();
    assert_eq!(b.status, BookingStatus::Booked);

    let read = e.get_booking(b.id, u).await.unwrap();
    assert_eq!(read.status, BookingStatus::Completed);
    let listed = e.list_user_bookings(u.user_id, u).await.unwrap();
    assert_eq!(listed[0].status, BookingStatus::Completed);

    let err = e.cancel_booking(b.id, u.user_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState { status: BookingStatus::Completed, .. }
    ));

    assert_eq!(e.complete_elapsed_bookings(now).await.unwrap(), 1);
    assert_eq!(e.complete_elapsed_bookings(now).await.unwrap(), 0);
}

// ── Visibility ───────────────────────────────────────────────────

#[tokio::test]
async fn bookings_are_private_to_owner_and_admin() {
    let e = engine();
    let ada = account(&e, "ada", Role::User).await;
    let bob = account(&e, "bob", Role::User).await;
    let admin = account(&e, "root", Role::Admin).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(ada.user_id, c, t, t + hours(2)).await.unwrap();
    assert!(e.get_booking(b.id, admin).await.is_ok());
    assert!(matches!(e.get_booking(b.id, bob).await, Err(EngineError::Forbidden(_))));

    assert_eq!(e.list_user_bookings(ada.user_id, admin).await.unwrap().len(), 1);
    assert!(e.list_user_bookings(bob.user_id, bob).await.unwrap().is_empty());
    assert!(matches!(
        e.list_user_bookings(ada.user_id, bob).await,
        Err(EngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn admin_listing_filters_and_paginates() {
    let e = engine();
    let ada = account(&e, "ada", Role::User).await;
    let admin = account(&e, "root", Role::Admin).await;
    let c = car(&e).await;
    let t = base();

    let mut ids = Vec::new();
    for i in 0..3 {
        let start = t + hours(i * 3);
        ids.push(e.create_booking(ada.user_id, c, start, start + hours(2)).await.unwrap().id);
    }
    e.cancel_booking(ids[0], ada.user_id).await.unwrap();

    assert!(matches!(
        e.list_bookings(ada, &BookingFilter::default(), PageRequest::default()).await,
        Err(EngineError::Forbidden(_))
    ));

    let page = e
        .list_bookings(admin, &BookingFilter::default(), PageRequest::new(Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.pagination.total_items, 3);
    assert_eq!(page.pagination.total_pages, 2);
    assert!(page.pagination.has_next);
    assert!(!page.pagination.has_prev);

    let cancelled = BookingFilter {
        status: Some(BookingStatus::Cancelled),
        ..Default::default()
    };
    let page = e.list_bookings(admin, &cancelled, PageRequest::default()).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, ids[0]);

    let window = BookingFilter {
        start_date: Some(t + hours(3)),
        car_id: Some(c),
        ..Default::default()
    };
    let page = e.list_bookings(admin, &window, PageRequest::default()).await.unwrap();
    assert_eq!(page.pagination.total_items, 2);
}

// ── Creation sessions ────────────────────────────────────────────

#[tokio::test]
async fn session_walks_every_step_in_order() {
    let e = engine();
    let session = e.initiate_creation().await.unwrap();
    assert_eq!(session.stage, CreationStage::BasicDetails);

    let progress = e.creation_progress(session.id).await.unwrap();
    assert_eq!(progress.current_step, CreationStage::BasicDetails);
    assert_eq!(progress.next_step, CreationStage::OwnerInfo);

    let steps = vec![
        StepPayload::BasicDetails(basic("KA01-WALK")),
        StepPayload::OwnerInfo(OwnerInfoStep {
            name: "Walker".into(),
            contact_info: "walker@example.com".into(),
        }),
        StepPayload::LocationDetails(location()),
        StepPayload::RentalInfo(rates()),
        StepPayload::DocumentsMedia(gallery()),
        StepPayload::StatusInfo(condition()),
    ];
    for step in steps {
        let stage = step.stage();
        let outcome = e.submit_step(session.id, step).await.unwrap();
        assert_eq!(outcome.current_step, stage);
        assert_eq!(outcome.next_step, stage.next());
        assert_eq!(outcome.car_id, session.car_id);
    }

    let progress = e.creation_progress(session.id).await.unwrap();
    assert_eq!(progress.current_step, CreationStage::Completed);
    assert_eq!(progress.next_step, CreationStage::Completed);

    let details = e.car_details(session.car_id).await.unwrap();
    assert_eq!(details.owner.unwrap().name, "Walker");
    assert_eq!(details.location.unwrap().available_branches.len(), 2);
    assert!(details.rental_info.is_some());
    assert_eq!(details.media.len(), 1);
    assert_eq!(details.documents.len(), 1);
    assert!(details.status.is_some());
    assert!(details.car.is_available);

    let again = e.submit_step(session.id, StepPayload::StatusInfo(condition())).await;
    assert!(matches!(
        again,
        Err(EngineError::InvalidStep { actual: CreationStage::Completed, .. })
    ));
}

#[tokio::test]
async fn out_of_order_step_is_rejected_without_side_effects() {
    let e = engine();
    let session = e.initiate_creation().await.unwrap();

    let err = e
        .submit_step(session.id, StepPayload::LocationDetails(location()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStep {
            expected: CreationStage::LocationDetails,
            actual: CreationStage::BasicDetails,
        }
    ));
    assert!(matches!(
        e.car_details(session.car_id).await,
        Err(EngineError::NotFound("car", _))
    ));
    assert_eq!(
        e.creation_progress(session.id).await.unwrap().current_step,
        CreationStage::BasicDetails
    );
}

#[tokio::test]
async fn invalid_step_payload_leaves_session_in_place() {
    let e = engine();
    let session = e.initiate_creation().await.unwrap();

    let mut old = basic("KA01-OLD");
    old.year = 1850;
    let err = e.submit_step(session.id, StepPayload::BasicDetails(old)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    e.submit_step(session.id, StepPayload::BasicDetails(basic("KA01-OLD")))
        .await
        .unwrap();
    let mut no_branches = location();
    no_branches.available_branches.clear();
    e.submit_step(session.id, StepPayload::OwnerInfo(OwnerInfoStep {
        name: "X".into(),
        contact_info: "x@example.com".into(),
    }))
    .await
    .unwrap();
    let err = e
        .submit_step(session.id, StepPayload::LocationDetails(no_branches))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(
        e.creation_progress(session.id).await.unwrap().current_step,
        CreationStage::LocationDetails
    );
}

#[tokio::test]
async fn session_step_rejects_taken_vehicle_number() {
    let e = engine();
    let o = owner(&e).await;
    car_for(&e, o.id, "KA01-TAKEN").await;

    let session = e.initiate_creation().await.unwrap();
    let err = e
        .submit_step(session.id, StepPayload::BasicDetails(basic("KA01-TAKEN")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateVehicleNumber(n) if n == "KA01-TAKEN"));
    assert_eq!(
        e.creation_progress(session.id).await.unwrap().current_step,
        CreationStage::BasicDetails
    );
}

#[tokio::test]
async fn expired_session_refuses_steps_and_progress() {
    let e = engine();
    let session = e.initiate_creation_at(Utc::now() - hours(25)).await.unwrap();

    let err = e
        .submit_step(session.id, StepPayload::BasicDetails(basic("KA01-LATE")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Expired(id) if id == session.id));
    assert!(matches!(
        e.creation_progress(session.id).await,
        Err(EngineError::Expired(_))
    ));

    // still inside the retention window, so nothing is purged yet
    assert_eq!(e.purge_stale_sessions(Utc::now()).await.unwrap(), 0);
    assert_eq!(e.purge_stale_sessions(Utc::now() + TimeDelta::days(8)).await.unwrap(), 1);
    assert!(matches!(
        e.creation_progress(session.id).await,
        Err(EngineError::NotFound("creation session", _))
    ));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let e = engine();
    let err = e
        .submit_step(Ulid::new(), StepPayload::BasicDetails(basic("KA01-NONE")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound("creation session", _)));
}

#[tokio::test]
async fn car_in_progress_is_not_bookable_until_status_step() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let session = e.initiate_creation().await.unwrap();
    let c = session.car_id;
    let t = base();
    let listed = |cars: Vec<Car>| cars.iter().any(|car| car.id == c);

    for step in [
        StepPayload::BasicDetails(basic("KA01-HALF")),
        StepPayload::OwnerInfo(OwnerInfoStep {
            name: "Half".into(),
            contact_info: "half@example.com".into(),
        }),
        StepPayload::LocationDetails(location()),
        StepPayload::RentalInfo(rates()),
    ] {
        e.submit_step(session.id, step).await.unwrap();
    }
    assert!(!e.car_details(c).await.unwrap().car.is_available);
    assert!(!listed(e.available_cars(t, t + hours(2)).await.unwrap()));
    assert!(matches!(
        e.create_booking(u.user_id, c, t, t + hours(2)).await,
        Err(EngineError::CarUnavailable(_))
    ));

    e.submit_step(session.id, StepPayload::DocumentsMedia(gallery())).await.unwrap();
    e.submit_step(session.id, StepPayload::StatusInfo(condition())).await.unwrap();
    assert!(listed(e.available_cars(t, t + hours(2)).await.unwrap()));
    assert_ok!(e.create_booking(u.user_id, c, t, t + hours(2)).await);
}

#[tokio::test]
async fn purge_removes_abandoned_cars_but_keeps_completed_ones() {
    let e = engine();
    let half = e.initiate_creation().await.unwrap();
    e.submit_step(half.id, StepPayload::BasicDetails(basic("KA01-HALF")))
        .await
        .unwrap();

    let done = e.initiate_creation().await.unwrap();
    for step in [
        StepPayload::BasicDetails(basic("KA01-DONE")),
        StepPayload::OwnerInfo(OwnerInfoStep {
            name: "Done".into(),
            contact_info: "done@example.com".into(),
        }),
        StepPayload::LocationDetails(location()),
        StepPayload::RentalInfo(rates()),
        StepPayload::DocumentsMedia(gallery()),
        StepPayload::StatusInfo(condition()),
    ] {
        e.submit_step(done.id, step).await.unwrap();
    }

    // both sessions are long past expiry and retention by then
    let later = Utc::now() + TimeDelta::days(30);
    assert_eq!(e.purge_stale_sessions(later).await.unwrap(), 2);
    assert!(matches!(
        e.car_details(half.car_id).await,
        Err(EngineError::NotFound("car", _))
    ));
    assert!(e.car_details(done.car_id).await.unwrap().car.is_available);
    // the vehicle number of the abandoned car is free again
    let again = e.initiate_creation().await.unwrap();
    assert_ok!(e.submit_step(again.id, StepPayload::BasicDetails(basic("KA01-HALF"))).await);
}

#[tokio::test]
async fn session_errors_win_over_malformed_json_steps() {
    let e = engine();
    let garbage = serde_json::json!({ "make": 7 });

    let unknown = e
        .submit_step_json(Ulid::new(), CreationStage::BasicDetails, garbage.clone())
        .await;
    assert!(matches!(unknown, Err(EngineError::NotFound("creation session", _))));

    let expired = e.initiate_creation_at(Utc::now() - hours(25)).await.unwrap();
    let err = e
        .submit_step_json(expired.id, CreationStage::BasicDetails, garbage.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Expired(_)));

    let live = e.initiate_creation().await.unwrap();
    let err = e
        .submit_step_json(live.id, CreationStage::OwnerInfo, garbage.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStep { actual: CreationStage::BasicDetails, .. }));

    let err = e
        .submit_step_json(live.id, CreationStage::BasicDetails, garbage)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let outcome = e
        .submit_step_json(
            live.id,
            CreationStage::BasicDetails,
            serde_json::json!({
                "make": "Honda", "model": "City", "year": 2021, "variant": "V",
                "fuel_type": "Petrol", "transmission": "Manual", "body_type": "Sedan",
                "color": "Silver", "seating_capacity": 5, "vehicle_number": "KA01-JSON",
                "registration_state": "KA"
            }),
        )
        .await
        .unwrap();
    assert_eq!(outcome.next_step, CreationStage::OwnerInfo);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_of_one_step_advance_once() {
    let e = Arc::new(engine());
    let session = e.initiate_creation().await.unwrap();

    let handles = (0..4).map(|i| {
        let e = e.clone();
        let step = StepPayload::BasicDetails(basic(&format!("KA01-RACE{i}")));
        tokio::spawn(async move { e.submit_step(session.id, step).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, EngineError::InvalidStep { actual: CreationStage::OwnerInfo, .. })));
}

// ── Cars and owners ──────────────────────────────────────────────

#[tokio::test]
async fn direct_creation_requires_owner_and_unique_number() {
    let e = engine();
    let o = owner(&e).await;
    car_for(&e, o.id, "KA01-DUP").await;

    let dup = e
        .create_car(NewCar {
            basic: basic("KA01-DUP"),
            owner_id: o.id,
            location: location(),
            rental_info: rates(),
            documents: vec![],
            media: gallery().media,
            status: condition(),
        })
        .await;
    assert!(matches!(dup, Err(EngineError::DuplicateVehicleNumber(_))));

    let orphan = e
        .create_car(NewCar {
            basic: basic("KA01-ORPHAN"),
            owner_id: Ulid::new(),
            location: location(),
            rental_info: rates(),
            documents: vec![],
            media: gallery().media,
            status: condition(),
        })
        .await;
    assert!(matches!(orphan, Err(EngineError::NotFound("owner", _))));

    let no_images = e
        .create_car(NewCar {
            basic: basic("KA01-BLANK"),
            owner_id: o.id,
            location: location(),
            rental_info: rates(),
            documents: vec![],
            media: vec![],
            status: condition(),
        })
        .await;
    assert!(matches!(no_images, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn car_patch_updates_car_and_sub_records() {
    let e = engine();
    let o = owner(&e).await;
    let c = car_for(&e, o.id, "KA01-PATCH").await;

    let details = e
        .update_car(
            c,
            CarPatch {
                color: Some("Red".into()),
                rental_info: Some(RentalInfoPatch {
                    rental_price_per_day: Some(300.0),
                    ..Default::default()
                }),
                location: Some(LocationPatch {
                    current_location: Some("Downtown".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(details.car.color, "Red");
    assert_eq!(details.rental_info.unwrap().rental_price_per_day, 300.0);
    assert_eq!(details.location.unwrap().current_location, "Downtown");

    let bad = e
        .update_car(
            c,
            CarPatch {
                seating_capacity: Some(0),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(bad, Err(EngineError::InvalidInput(_))));
    assert_eq!(e.car_details(c).await.unwrap().car.seating_capacity, 5);

    // the merged window must stay ordered
    let inverted = e
        .update_car(
            c,
            CarPatch {
                rental_info: Some(RentalInfoPatch {
                    minimum_rent_duration: Some(1000),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(inverted, Err(EngineError::InvalidInput(m)) if m.contains("maximum_rent_duration")));

    let other = car_for(&e, o.id, "KA01-OTHER").await;
    let clash = e
        .update_car(
            other,
            CarPatch {
                vehicle_number: Some("KA01-PATCH".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(clash, Err(EngineError::DuplicateVehicleNumber(_))));
}

#[tokio::test]
async fn car_listing_filters_by_attributes_and_price() {
    let e = engine();
    let o = owner(&e).await;
    car_for(&e, o.id, "KA01-LIST1").await;
    let second = car_for(&e, o.id, "KA01-LIST2").await;
    e.update_car(
        second,
        CarPatch {
            make: Some("Honda".into()),
            rental_info: Some(RentalInfoPatch {
                rental_price_per_day: Some(500.0),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let hondas = CarFilter {
        make: Some("hon".into()),
        ..Default::default()
    };
    let page = e.list_cars(&hondas, PageRequest::default()).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, second);

    let cheap = CarFilter {
        max_price: Some(250.0),
        ..Default::default()
    };
    assert_eq!(e.list_cars(&cheap, PageRequest::default()).await.unwrap().items.len(), 1);

    let inverted = CarFilter {
        min_price: Some(10.0),
        max_price: Some(5.0),
        ..Default::default()
    };
    assert!(matches!(
        e.list_cars(&inverted, PageRequest::default()).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn car_with_active_booking_cannot_be_deleted() {
    let e = engine();
    let u = account(&e, "ada", Role::User).await;
    let c = car(&e).await;
    let t = base();

    let b = e.create_booking(u.user_id, c, t, t + hours(2)).await.unwrap();
    assert!(matches!(e.delete_car(c).await, Err(EngineError::HasDependents(_))));

    e.cancel_booking(b.id, u.user_id).await.unwrap();
    e.delete_car(c).await.unwrap();
    assert!(matches!(e.car_details(c).await, Err(EngineError::NotFound(..))));
    assert!(matches!(e.get_booking(b.id, u).await, Err(EngineError::NotFound(..))));
}

#[tokio::test]
async fn owner_with_cars_cannot_be_deleted() {
    let e = engine();
    let o = owner(&e).await;
    let c = car_for(&e, o.id, "KA01-OWNED").await;

    let with_cars = e.owner_with_cars(o.id).await.unwrap();
    assert_eq!(with_cars.cars.len(), 1);
    assert!(matches!(e.delete_owner(o.id).await, Err(EngineError::HasDependents(_))));

    e.delete_car(c).await.unwrap();
    e.delete_owner(o.id).await.unwrap();
    assert!(matches!(e.delete_owner(o.id).await, Err(EngineError::NotFound("owner", _))));
}

#[tokio::test]
async fn owner_update_and_listing() {
    let e = engine();
    let o = owner(&e).await;
    let updated = e
        .update_owner(
            o.id,
            OwnerInput {
                name: "Fleet Co Ltd".into(),
                contact_info: "ops@example.com".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Fleet Co Ltd");
    assert_eq!(e.list_owners().await.unwrap(), vec![updated]);

    let blank = e
        .create_owner(OwnerInput {
            name: " ".into(),
            contact_info: "x".into(),
        })
        .await;
    assert!(matches!(blank, Err(EngineError::InvalidInput(_))));
}

// ── Accounts ─────────────────────────────────────────────────────

#[tokio::test]
async fn register_and_login() {
    let e = engine();
    let user = e
        .register("Ada", "Ada@Example.com", "secret-pw", Role::User)
        .await
        .unwrap();
    assert_eq!(user.email, "ada@example.com");

    let dup = e.register("Ada2", "ada@example.com", "secret-pw", Role::User).await;
    assert!(matches!(dup, Err(EngineError::DuplicateEmail(_))));
    let weak = e.register("Bob", "bob@example.com", "123", Role::User).await;
    assert!(matches!(weak, Err(EngineError::InvalidInput(_))));
    let bad_domain = e.register("Bob", "bob@.", "secret-pw", Role::User).await;
    assert!(matches!(bad_domain, Err(EngineError::InvalidInput(m)) if m.contains("email")));

    assert_eq!(e.login("ADA@example.com", "secret-pw").await.unwrap().id, user.id);
    assert!(matches!(
        e.login("ada@example.com", "wrong-pw").await,
        Err(EngineError::Unauthorized(_))
    ));
    assert!(matches!(
        e.login("nobody@example.com", "secret-pw").await,
        Err(EngineError::Unauthorized(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signups_for_one_email_admit_one() {
    let e = Arc::new(engine());
    let handles = (0..4).map(|i| {
        let e = e.clone();
        tokio::spawn(async move {
            e.register(&format!("Twin{i}"), "twin@example.com", "secret-pw", Role::User)
                .await
        })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, EngineError::DuplicateEmail(_))));
}

#[tokio::test]
async fn admin_seeding_is_idempotent() {
    let e = engine();
    let first = e.ensure_admin("Root", "root@example.com", "changeme").await.unwrap();
    assert_eq!(first.role, Role::Admin);
    let second = e.ensure_admin("Root", "root@example.com", "other-pw").await.unwrap();
    assert_eq!(first.id, second.id);
}
