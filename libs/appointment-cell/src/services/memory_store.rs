use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AppointmentType, AvailabilityWriter, Reservation, ReservationFilter, ReservationListStatus,
    Slot,
};
use crate::services::store::{ReservationStore, SlotStore, StoreResult};

/// Slot storage kept in process memory. Used when no database is configured.
#[derive(Default)]
pub struct InMemorySlotStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_time(mut slots: Vec<Slot>) -> Vec<Slot> {
    slots.sort_by_key(|slot| (slot.date_time, slot.id));
    slots
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn insert_many(&self, slots: &[Slot]) -> StoreResult<()> {
        let mut stored = self.slots.write().await;
        for slot in slots {
            stored.insert(slot.id, slot.clone());
        }
        Ok(())
    }

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>> {
        Ok(self.slots.read().await.get(&slot_id).cloned())
    }

    async fn claim(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut stored = self.slots.write().await;
        match stored.get_mut(&slot_id) {
            Some(slot) if slot.available => {
                slot.available = false;
                slot.availability_changed_by = writer;
                slot.availability_changed_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut stored = self.slots.write().await;
        match stored.get_mut(&slot_id) {
            Some(slot) => {
                slot.available = true;
                slot.availability_changed_by = writer;
                slot.availability_changed_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, slot_id: Uuid) -> StoreResult<bool> {
        Ok(self.slots.write().await.remove(&slot_id).is_some())
    }

    async fn find_between(
        &self,
        professional_id: Uuid,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<Slot>> {
        let stored = self.slots.read().await;
        Ok(sorted_by_time(
            stored
                .values()
                .filter(|slot| {
                    slot.professional_id == professional_id
                        && slot.date_time > after
                        && slot.date_time < before
                })
                .cloned()
                .collect(),
        ))
    }

    async fn list_for_professional(&self, professional_id: Uuid) -> StoreResult<Vec<Slot>> {
        let stored = self.slots.read().await;
        Ok(sorted_by_time(
            stored
                .values()
                .filter(|slot| slot.professional_id == professional_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_available(&self, appointment_type: AppointmentType) -> StoreResult<Vec<Slot>> {
        let stored = self.slots.read().await;
        Ok(sorted_by_time(
            stored
                .values()
                .filter(|slot| slot.available && slot.appointment_type == appointment_type)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default)]
pub struct InMemoryReservationStore {
    reservations: RwLock<HashMap<Uuid, Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect<F>(&self, predicate: F) -> Vec<Reservation>
    where
        F: Fn(&Reservation) -> bool,
    {
        self.reservations
            .read()
            .await
            .values()
            .filter(|reservation| predicate(reservation))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.reservations.read().await.get(&reservation_id).cloned())
    }

    async fn delete(&self, reservation_id: Uuid) -> StoreResult<bool> {
        Ok(self.reservations.write().await.remove(&reservation_id).is_some())
    }

    async fn close_pending(&self, reservation_id: Uuid) -> StoreResult<bool> {
        let mut stored = self.reservations.write().await;
        match stored.get_mut(&reservation_id) {
            Some(reservation) if reservation.pending => {
                reservation.pending = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_assistance(
        &self,
        reservation_id: Uuid,
        attended: bool,
    ) -> StoreResult<Option<Reservation>> {
        let mut stored = self.reservations.write().await;
        Ok(stored.get_mut(&reservation_id).map(|reservation| {
            reservation.assistant = Some(attended);
            reservation.pending = false;
            reservation.clone()
        }))
    }

    async fn has_pending(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<bool> {
        Ok(self.reservations.read().await.values().any(|reservation| {
            reservation.patient_id == patient_id
                && reservation.appointment_type == appointment_type
                && reservation.pending
        }))
    }

    async fn count_attended(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<usize> {
        Ok(self.reservations.read().await.values().filter(|reservation| {
            reservation.patient_id == patient_id
                && reservation.appointment_type == appointment_type
                && reservation.assistant == Some(true)
                && reservation.date_time >= from
                && reservation.date_time <= to
        }).count())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let mut reservations = self
            .collect(|reservation| reservation.patient_id == patient_id)
            .await;
        reservations.sort_by(|a, b| b.date_time.cmp(&a.date_time));
        Ok(reservations)
    }

    async fn list_for_professional(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Vec<Reservation>> {
        let mut reservations = self
            .collect(|reservation| {
                reservation.professional_id == filter.professional_id
                    && match filter.status {
                        ReservationListStatus::Pending => reservation.pending,
                        ReservationListStatus::Closed => !reservation.pending,
                    }
                    && filter
                        .date
                        .map_or(true, |date| reservation.date_time.date_naive() == date)
            })
            .await;

        match filter.status {
            ReservationListStatus::Pending => {
                reservations.sort_by(|a, b| a.date_time.cmp(&b.date_time))
            }
            ReservationListStatus::Closed => {
                reservations.sort_by(|a, b| b.date_time.cmp(&a.date_time))
            }
        }
        Ok(reservations)
    }

    async fn list_recorded(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<Vec<Reservation>> {
        let mut reservations = self
            .collect(|reservation| {
                reservation.patient_id == patient_id
                    && reservation.appointment_type == appointment_type
                    && reservation.assistant.is_some()
            })
            .await;
        reservations.sort_by(|a, b| b.date_time.cmp(&a.date_time));
        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot_at(professional_id: Uuid, hour: u32) -> Slot {
        Slot::new(
            professional_id,
            AppointmentType::Nursing,
            Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap(),
            true,
            AvailabilityWriter::SlotCreation,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_claim_succeeds_once() {
        let store = InMemorySlotStore::new();
        let slot = slot_at(Uuid::new_v4(), 9);
        store.insert_many(&[slot.clone()]).await.unwrap();

        assert!(store.claim(slot.id, AvailabilityWriter::Booking, Utc::now()).await.unwrap());
        assert!(!store.claim(slot.id, AvailabilityWriter::Booking, Utc::now()).await.unwrap());
        assert!(!store.claim(Uuid::new_v4(), AvailabilityWriter::Booking, Utc::now()).await.unwrap());

        let stored = store.get(slot.id).await.unwrap().unwrap();
        assert!(!stored.available);
        assert_eq!(stored.availability_changed_by, AvailabilityWriter::Booking);
    }

    #[tokio::test]
    async fn test_find_between_excludes_bounds() {
        let store = InMemorySlotStore::new();
        let professional_id = Uuid::new_v4();
        let nine = slot_at(professional_id, 9);
        let ten = slot_at(professional_id, 10);
        store.insert_many(&[nine.clone(), ten.clone()]).await.unwrap();

        let found = store
            .find_between(professional_id, nine.date_time, ten.date_time)
            .await
            .unwrap();
        assert!(found.is_empty());

        let found = store
            .find_between(
                professional_id,
                nine.date_time - chrono::Duration::minutes(1),
                ten.date_time,
            )
            .await
            .unwrap();
        assert_eq!(found, vec![nine]);
    }
}
