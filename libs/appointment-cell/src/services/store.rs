use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AppointmentType, AvailabilityWriter, Reservation, ReservationFilter, Slot};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn insert_many(&self, slots: &[Slot]) -> StoreResult<()>;

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>>;

    /// Atomically flips `available` from true to false. Returns false when the
    /// slot is missing or already taken.
    async fn claim(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Marks a slot available again. Returns false when the slot is missing.
    async fn release(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn delete(&self, slot_id: Uuid) -> StoreResult<bool>;

    /// Slots of the professional strictly between `after` and `before`.
    async fn find_between(
        &self,
        professional_id: Uuid,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<Slot>>;

    async fn list_for_professional(&self, professional_id: Uuid) -> StoreResult<Vec<Slot>>;

    async fn list_available(&self, appointment_type: AppointmentType) -> StoreResult<Vec<Slot>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>>;

    async fn delete(&self, reservation_id: Uuid) -> StoreResult<bool>;

    /// Sets `pending = false` when it is still true. Returns whether a row changed.
    async fn close_pending(&self, reservation_id: Uuid) -> StoreResult<bool>;

    async fn record_assistance(
        &self,
        reservation_id: Uuid,
        attended: bool,
    ) -> StoreResult<Option<Reservation>>;

    async fn has_pending(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<bool>;

    /// Attended reservations of the patient whose date falls inside `[from, to]`.
    async fn count_attended(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<usize>;

    async fn list_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Reservation>>;

    async fn list_for_professional(&self, filter: &ReservationFilter)
        -> StoreResult<Vec<Reservation>>;

    /// Reservations of the patient and type whose attendance has been recorded.
    async fn list_recorded(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<Vec<Reservation>>;
}
