#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use appointment_cell::*;
use deferred_task_cell::{Clock, DeferredTaskManager, TaskManagerConfig, TokioClock};
use shared_models::user::{RoleName, UserAccount};

/// 2025-03-10 08:00 UTC, inside the January to May quota window.
pub fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        self.sent.lock().await.push(SentNotification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// In-memory reservations whose deletes can be switched to fail.
#[derive(Default)]
pub struct FlakyReservationStore {
    inner: InMemoryReservationStore,
    fail_deletes: AtomicBool,
}

impl FlakyReservationStore {
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReservationStore for FlakyReservationStore {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        self.inner.insert(reservation).await
    }

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        ReservationStore::get(&self.inner, reservation_id).await
    }

    async fn delete(&self, reservation_id: Uuid) -> StoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        ReservationStore::delete(&self.inner, reservation_id).await
    }

    async fn close_pending(&self, reservation_id: Uuid) -> StoreResult<bool> {
        self.inner.close_pending(reservation_id).await
    }

    async fn record_assistance(
        &self,
        reservation_id: Uuid,
        attended: bool,
    ) -> StoreResult<Option<Reservation>> {
        self.inner.record_assistance(reservation_id, attended).await
    }

    async fn has_pending(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<bool> {
        self.inner.has_pending(patient_id, appointment_type).await
    }

    async fn count_attended(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<usize> {
        self.inner
            .count_attended(patient_id, appointment_type, from, to)
            .await
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Reservation>> {
        self.inner.list_for_patient(patient_id).await
    }

    async fn list_for_professional(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Vec<Reservation>> {
        self.inner.list_for_professional(filter).await
    }

    async fn list_recorded(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<Vec<Reservation>> {
        self.inner.list_recorded(patient_id, appointment_type).await
    }
}

pub struct Harness {
    pub engine: Arc<SchedulingEngine>,
    pub slots: Arc<InMemorySlotStore>,
    pub reservations: Arc<FlakyReservationStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<TokioClock>,
}

impl Harness {
    pub fn new() -> Self {
        let slots = Arc::new(InMemorySlotStore::new());
        let reservations = Arc::new(FlakyReservationStore::default());
        let users = Arc::new(InMemoryUserDirectory::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(TokioClock::new(anchor()));
        let tasks = DeferredTaskManager::new(TaskManagerConfig::default(), clock.clone());

        let engine = Arc::new(SchedulingEngine::new(
            slots.clone(),
            reservations.clone(),
            users.clone(),
            notifier.clone(),
            tasks,
        ));

        Self {
            engine,
            slots,
            reservations,
            users,
            notifier,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn in_minutes(&self, minutes: i64) -> DateTime<Utc> {
        self.now() + Duration::minutes(minutes)
    }

    pub async fn add_user(&self, roles: &[RoleName]) -> UserAccount {
        let id = Uuid::new_v4();
        let user = UserAccount {
            id,
            username: format!("user-{}", &id.to_string()[..8]),
            name: "Test".to_string(),
            last_name: "User".to_string(),
            email: Some(format!("{}@campus.example", id)),
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
            phone: None,
            eps: None,
            semester: None,
        };
        self.users.upsert(user.clone()).await;
        user
    }

    pub async fn professional(&self, role: RoleName) -> Uuid {
        self.add_user(&[role]).await.id
    }

    pub async fn patient(&self) -> Uuid {
        self.add_user(&[RoleName::Student]).await.id
    }

    pub async fn create_slot(
        &self,
        professional_id: Uuid,
        appointment_type: AppointmentType,
        date_time: DateTime<Utc>,
    ) -> Slot {
        let mut created = self
            .engine
            .create_slots(
                professional_id,
                vec![SlotCandidate {
                    date_time,
                    appointment_type: appointment_type.to_string(),
                }],
            )
            .await
            .expect("slot creation should succeed");
        created.remove(0)
    }

    pub async fn book(&self, patient_id: Uuid, slot_id: Uuid) -> Result<Reservation, SchedulingError> {
        self.engine
            .book_reservation(BookReservationRequest {
                patient_id,
                slot_id,
                phone: None,
                eps: None,
                semester: None,
            })
            .await
    }

    pub async fn slot(&self, slot_id: Uuid) -> Option<Slot> {
        SlotStore::get(self.slots.as_ref(), slot_id)
            .await
            .expect("slot lookup should succeed")
    }

    pub async fn reservation(&self, reservation_id: Uuid) -> Option<Reservation> {
        ReservationStore::get(self.reservations.as_ref(), reservation_id)
            .await
            .expect("reservation lookup should succeed")
    }

    /// Stores a reservation whose attendance was recorded at `date_time`.
    pub async fn seed_attended(
        &self,
        patient_id: Uuid,
        professional_id: Uuid,
        appointment_type: AppointmentType,
        date_time: DateTime<Utc>,
    ) -> Reservation {
        let slot = Slot::new(
            professional_id,
            appointment_type,
            date_time,
            false,
            AvailabilityWriter::Booking,
            date_time,
        );
        let mut reservation = Reservation::for_slot(patient_id, &slot, date_time);
        reservation.pending = false;
        reservation.assistant = Some(true);
        self.reservations
            .insert(&reservation)
            .await
            .expect("seeding should succeed");
        reservation
    }
}

/// Lets paused tokio time move forward, firing every timer due on the way.
pub async fn advance_minutes(minutes: u64) {
    tokio::time::sleep(StdDuration::from_secs(minutes * 60)).await;
    settle().await;
}

/// Gives spawned timer tasks a chance to run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(StdDuration::from_millis(1)).await;
    }
}
