use chrono::{DateTime, Utc};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;
use crate::store::{StoreError, StoreTx};

use super::conflict::now;
use super::{validate, Engine, EngineError, EngineResult};

/// Translate a unique violation on the car table into the domain error.
pub(super) fn vehicle_number_taken(e: StoreError, number: &str) -> EngineError {
    match e {
        StoreError::Duplicate(c) if c.contains("vehicle_number") => {
            EngineError::DuplicateVehicleNumber(number.to_string())
        }
        other => other.into(),
    }
}

pub(super) async fn ensure_vehicle_number_free(
    tx: &mut dyn StoreTx,
    number: &str,
    car_id: Ulid,
) -> EngineResult<()> {
    match tx.car_by_vehicle_number(number).await? {
        Some(existing) if existing.id != car_id => {
            Err(EngineError::DuplicateVehicleNumber(number.to_string()))
        }
        _ => Ok(()),
    }
}

pub(super) fn rental_info_from(car_id: Ulid, step: &RentalInfoStep) -> RentalInfo {
    RentalInfo {
        car_id,
        rental_price_per_day: step.rental_price_per_day,
        rental_price_per_hour: step.rental_price_per_hour,
        minimum_rent_duration: step.minimum_rent_duration,
        maximum_rent_duration: step.maximum_rent_duration,
        security_deposit: step.security_deposit,
        late_fee_per_hour: step.late_fee_per_hour,
        discounts: step.discounts.clone(),
    }
}

pub(super) fn status_from(car_id: Ulid, step: &StatusInfoStep) -> CarStatus {
    CarStatus {
        car_id,
        current_odometer_reading: step.current_odometer_reading,
        last_service_date: step.last_service_date,
        next_service_due: step.next_service_due,
        damages_or_issues: step.damages_or_issues.clone(),
    }
}

pub(super) async fn insert_documents_media(
    tx: &mut dyn StoreTx,
    car_id: Ulid,
    documents: &[NewDocument],
    media: &[NewMedia],
) -> EngineResult<()> {
    for d in documents {
        tx.insert_document(&CarDocument {
            id: Ulid::new(),
            car_id,
            document_type: d.document_type.clone(),
            reference: d.reference.clone(),
            valid_until: d.valid_until,
        })
        .await?;
    }
    for m in media {
        tx.insert_media(&CarMedia {
            id: Ulid::new(),
            car_id,
            kind: m.kind,
            url: m.url.clone(),
            is_primary: m.is_primary,
        })
        .await?;
    }
    Ok(())
}

/// Validate a step payload. Runs before anything is written.
fn validate_step(payload: &StepPayload, now: DateTime<Utc>) -> EngineResult<()> {
    match payload {
        StepPayload::BasicDetails(s) => validate::basic_details(s, now),
        StepPayload::OwnerInfo(s) => validate::fields(s),
        StepPayload::LocationDetails(s) => validate::fields(s),
        StepPayload::RentalInfo(s) => validate::rental_step(s),
        StepPayload::DocumentsMedia(s) => validate::documents_media(s),
        StepPayload::StatusInfo(s) => validate::fields(s),
    }
}

/// A step body as it reaches the engine. JSON bodies are decoded only once
/// the session is known to accept the step.
enum StepBody {
    Typed(StepPayload),
    Json(serde_json::Value),
}

impl StepBody {
    fn decode(&self, stage: CreationStage) -> EngineResult<StepPayload> {
        match self {
            StepBody::Typed(p) => Ok(p.clone()),
            StepBody::Json(v) => StepPayload::from_json(stage, v.clone())
                .map_err(|e| EngineError::InvalidInput(format!("{stage} payload: {e}")))?
                .ok_or_else(|| EngineError::InvalidInput(format!("{stage} takes no payload"))),
        }
    }
}

async fn load_car(tx: &mut dyn StoreTx, car_id: Ulid) -> EngineResult<Car> {
    tx.car(car_id).await?.ok_or(EngineError::NotFound("car", car_id))
}

/// Write the records one step produces.
async fn apply_step(
    tx: &mut dyn StoreTx,
    car_id: Ulid,
    payload: &StepPayload,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    match payload {
        StepPayload::BasicDetails(s) => {
            ensure_vehicle_number_free(tx, &s.vehicle_number, car_id).await?;
            let car = Car {
                id: car_id,
                owner_id: None,
                make: s.make.clone(),
                model: s.model.clone(),
                year: s.year,
                variant: s.variant.clone(),
                fuel_type: s.fuel_type,
                transmission: s.transmission,
                body_type: s.body_type,
                color: s.color.clone(),
                seating_capacity: s.seating_capacity,
                vehicle_number: s.vehicle_number.clone(),
                registration_state: s.registration_state.clone(),
                // switched on by the status step
                is_available: false,
                created_at: now,
                updated_at: now,
            };
            tx.insert_car(&car)
                .await
                .map_err(|e| vehicle_number_taken(e, &s.vehicle_number))?;
        }
        StepPayload::OwnerInfo(s) => {
            let mut car = load_car(tx, car_id).await?;
            let owner = Owner {
                id: Ulid::new(),
                name: s.name.clone(),
                contact_info: s.contact_info.clone(),
                created_at: now,
                updated_at: now,
            };
            tx.insert_owner(&owner).await?;
            car.owner_id = Some(owner.id);
            car.updated_at = now;
            tx.update_car(&car).await?;
        }
        StepPayload::LocationDetails(s) => {
            tx.put_location(&CarLocation {
                car_id,
                current_location: s.current_location.clone(),
                available_branches: s.available_branches.clone(),
            })
            .await?;
        }
        StepPayload::RentalInfo(s) => {
            tx.put_rental_info(&rental_info_from(car_id, s)).await?;
        }
        StepPayload::DocumentsMedia(s) => {
            insert_documents_media(tx, car_id, &s.documents, &s.media).await?;
        }
        StepPayload::StatusInfo(s) => {
            tx.put_status(&status_from(car_id, s)).await?;
            let mut car = load_car(tx, car_id).await?;
            car.is_available = s.is_available;
            car.updated_at = now;
            tx.update_car(&car).await?;
        }
    }
    Ok(())
}

fn step_message(stage: CreationStage, next: CreationStage) -> String {
    if next.is_terminal() {
        format!("{stage} saved; car creation completed")
    } else {
        format!("{stage} saved; next step is {next}")
    }
}

impl Engine {
    /// Start a creation session for a freshly allocated car id.
    pub async fn initiate_creation(&self) -> EngineResult<CreationSession> {
        self.initiate_creation_at(now()).await
    }

    pub(crate) async fn initiate_creation_at(&self, now: DateTime<Utc>) -> EngineResult<CreationSession> {
        let session = CreationSession {
            id: Ulid::new(),
            car_id: Ulid::new(),
            stage: CreationStage::BasicDetails,
            expires_at: now + SESSION_TTL,
            created_at: now,
            updated_at: now,
        };
        let mut tx = self.tx().await?;
        tx.insert_session(&session).await?;
        tx.commit().await?;
        info!("creation session {} started for car {}", session.id, session.car_id);
        Ok(session)
    }

    /// Submit the payload for the session's current step. The step's records
    /// and the stage advance commit together or not at all.
    pub async fn submit_step(&self, session_id: Ulid, payload: StepPayload) -> EngineResult<StepOutcome> {
        let stage = payload.stage();
        self.submit_step_at(session_id, stage, StepBody::Typed(payload), now()).await
    }

    /// Like `submit_step`, for a JSON body addressed to `stage`. Session
    /// errors (unknown, expired, wrong step) win over a malformed body.
    pub async fn submit_step_json(
        &self,
        session_id: Ulid,
        stage: CreationStage,
        body: serde_json::Value,
    ) -> EngineResult<StepOutcome> {
        self.submit_step_at(session_id, stage, StepBody::Json(body), now()).await
    }

    async fn submit_step_at(
        &self,
        session_id: Ulid,
        stage: CreationStage,
        body: StepBody,
        now: DateTime<Utc>,
    ) -> EngineResult<StepOutcome> {
        let outcome = retry_serializable!("submit_step", self.try_submit_step(session_id, stage, &body, now).await)?;

        metrics::counter!(CREATION_STEPS_TOTAL, "step" => outcome.current_step.as_str()).increment(1);
        info!(
            "creation session {session_id}: {} accepted, now at {}",
            outcome.current_step, outcome.next_step
        );
        Ok(outcome)
    }

    async fn try_submit_step(
        &self,
        session_id: Ulid,
        expected: CreationStage,
        body: &StepBody,
        now: DateTime<Utc>,
    ) -> EngineResult<StepOutcome> {
        let mut tx = self.tx().await?;

        let session = tx
            .session(session_id)
            .await?
            .ok_or(EngineError::NotFound("creation session", session_id))?;
        if session.is_expired(now) {
            return Err(EngineError::Expired(session_id));
        }
        if session.stage != expected {
            return Err(EngineError::InvalidStep { expected, actual: session.stage });
        }
        let payload = body.decode(expected)?;
        validate_step(&payload, now)?;

        apply_step(tx.as_mut(), session.car_id, &payload, now).await?;

        let next = expected.next();
        if !tx.advance_session(session_id, expected, next, now).await? {
            // lost the race to a concurrent submission of the same step
            let actual = tx.session(session_id).await?.map_or(expected, |s| s.stage);
            return Err(EngineError::InvalidStep { expected, actual });
        }
        tx.commit().await?;

        Ok(StepOutcome {
            session_id,
            car_id: session.car_id,
            current_step: expected,
            next_step: next,
            message: step_message(expected, next),
        })
    }

    /// Current stage of a session and the stage that follows it.
    pub async fn creation_progress(&self, session_id: Ulid) -> EngineResult<CreationProgress> {
        self.creation_progress_at(session_id, now()).await
    }

    pub(crate) async fn creation_progress_at(
        &self,
        session_id: Ulid,
        now: DateTime<Utc>,
    ) -> EngineResult<CreationProgress> {
        let mut tx = self.tx().await?;
        let session = tx
            .session(session_id)
            .await?
            .ok_or(EngineError::NotFound("creation session", session_id))?;
        if session.is_expired(now) {
            return Err(EngineError::Expired(session_id));
        }
        Ok(CreationProgress {
            session_id,
            car_id: session.car_id,
            current_step: session.stage,
            next_step: session.stage.next(),
            expires_at: session.expires_at,
        })
    }

    /// Delete sessions that expired before `now - SESSION_RETENTION`, and the
    /// half-built cars of those that never completed.
    pub async fn purge_stale_sessions(&self, now: DateTime<Utc>) -> EngineResult<u64> {
        retry_serializable!("purge_sessions", async {
            let mut tx = self.tx().await?;
            let n = tx.purge_sessions(now - SESSION_RETENTION).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(n)
        }
        .await)
    }
}
