use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::user::{ContactDetails, UserAccount};

use crate::models::{
    AppointmentType, AvailabilityWriter, Reservation, ReservationFilter, ReservationListStatus,
    Slot,
};
use crate::services::store::{ReservationStore, SlotStore, StoreResult};
use crate::services::users::UserDirectory;

const SLOTS_PATH: &str = "/rest/v1/slots";
const RESERVATIONS_PATH: &str = "/rest/v1/reservations";
const USERS_PATH: &str = "/rest/v1/users";

fn timestamp(date_time: DateTime<Utc>) -> String {
    urlencoding::encode(&date_time.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

pub struct SupabaseSlotStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSlotStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, query: &str) -> StoreResult<Vec<Slot>> {
        let path = format!("{}?{}", SLOTS_PATH, query);
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    async fn update_availability(
        &self,
        query: &str,
        available: bool,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let path = format!("{}?{}", SLOTS_PATH, query);
        let body = json!({
            "available": available,
            "availability_changed_by": writer,
            "availability_changed_at": at,
        });
        let updated: Vec<Slot> = self
            .supabase
            .request(Method::PATCH, &path, None, Some(body))
            .await?;
        Ok(!updated.is_empty())
    }
}

#[async_trait]
impl SlotStore for SupabaseSlotStore {
    async fn insert_many(&self, slots: &[Slot]) -> StoreResult<()> {
        if slots.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(slots)?;
        let _: Vec<Slot> = self
            .supabase
            .request(Method::POST, SLOTS_PATH, None, Some(body))
            .await?;
        debug!("Inserted {} slots", slots.len());
        Ok(())
    }

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>> {
        let slots = self.fetch(&format!("id=eq.{}", slot_id)).await?;
        Ok(slots.into_iter().next())
    }

    async fn claim(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        // The filter on available makes this a compare-and-swap on the server.
        self.update_availability(
            &format!("id=eq.{}&available=eq.true", slot_id),
            false,
            writer,
            at,
        )
        .await
    }

    async fn release(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.update_availability(&format!("id=eq.{}", slot_id), true, writer, at)
            .await
    }

    async fn delete(&self, slot_id: Uuid) -> StoreResult<bool> {
        let path = format!("{}?id=eq.{}", SLOTS_PATH, slot_id);
        let deleted: Vec<Slot> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await?;
        Ok(!deleted.is_empty())
    }

    async fn find_between(
        &self,
        professional_id: Uuid,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<Slot>> {
        self.fetch(&format!(
            "professional_id=eq.{}&date_time=gt.{}&date_time=lt.{}&order=date_time.asc",
            professional_id,
            timestamp(after),
            timestamp(before)
        ))
        .await
    }

    async fn list_for_professional(&self, professional_id: Uuid) -> StoreResult<Vec<Slot>> {
        self.fetch(&format!(
            "professional_id=eq.{}&order=date_time.asc",
            professional_id
        ))
        .await
    }

    async fn list_available(&self, appointment_type: AppointmentType) -> StoreResult<Vec<Slot>> {
        self.fetch(&format!(
            "appointment_type=eq.{}&available=eq.true&order=date_time.asc",
            appointment_type
        ))
        .await
    }
}

pub struct SupabaseReservationStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseReservationStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, query: &str) -> StoreResult<Vec<Reservation>> {
        let path = format!("{}?{}", RESERVATIONS_PATH, query);
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    async fn patch(&self, query: &str, body: Value) -> StoreResult<Vec<Reservation>> {
        let path = format!("{}?{}", RESERVATIONS_PATH, query);
        Ok(self
            .supabase
            .request(Method::PATCH, &path, None, Some(body))
            .await?)
    }
}

#[async_trait]
impl ReservationStore for SupabaseReservationStore {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        let body = serde_json::to_value(reservation)?;
        let _: Vec<Reservation> = self
            .supabase
            .request(Method::POST, RESERVATIONS_PATH, None, Some(body))
            .await?;
        Ok(())
    }

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let reservations = self.fetch(&format!("id=eq.{}", reservation_id)).await?;
        Ok(reservations.into_iter().next())
    }

    async fn delete(&self, reservation_id: Uuid) -> StoreResult<bool> {
        let path = format!("{}?id=eq.{}", RESERVATIONS_PATH, reservation_id);
        let deleted: Vec<Reservation> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await?;
        Ok(!deleted.is_empty())
    }

    async fn close_pending(&self, reservation_id: Uuid) -> StoreResult<bool> {
        let updated = self
            .patch(
                &format!("id=eq.{}&pending=eq.true", reservation_id),
                json!({ "pending": false }),
            )
            .await?;
        Ok(!updated.is_empty())
    }

    async fn record_assistance(
        &self,
        reservation_id: Uuid,
        attended: bool,
    ) -> StoreResult<Option<Reservation>> {
        let updated = self
            .patch(
                &format!("id=eq.{}", reservation_id),
                json!({ "assistant": attended, "pending": false }),
            )
            .await?;
        Ok(updated.into_iter().next())
    }

    async fn has_pending(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<bool> {
        let path = format!(
            "{}?patient_id=eq.{}&appointment_type=eq.{}&pending=eq.true&select=id&limit=1",
            RESERVATIONS_PATH, patient_id, appointment_type
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(!rows.is_empty())
    }

    async fn count_attended(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let path = format!(
            "{}?patient_id=eq.{}&appointment_type=eq.{}&assistant=is.true&date_time=gte.{}&date_time=lte.{}&select=id",
            RESERVATIONS_PATH,
            patient_id,
            appointment_type,
            timestamp(from),
            timestamp(to)
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.len())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Reservation>> {
        self.fetch(&format!("patient_id=eq.{}&order=date_time.desc", patient_id))
            .await
    }

    async fn list_for_professional(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Vec<Reservation>> {
        let (pending, order) = match filter.status {
            ReservationListStatus::Pending => (true, "asc"),
            ReservationListStatus::Closed => (false, "desc"),
        };
        let mut query = format!(
            "professional_id=eq.{}&pending=eq.{}&order=date_time.{}",
            filter.professional_id, pending, order
        );
        if let Some(day_start) = filter
            .date
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
        {
            query.push_str(&format!(
                "&date_time=gte.{}&date_time=lt.{}",
                timestamp(day_start),
                timestamp(day_start + Duration::days(1))
            ));
        }
        self.fetch(&query).await
    }

    async fn list_recorded(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
    ) -> StoreResult<Vec<Reservation>> {
        self.fetch(&format!(
            "patient_id=eq.{}&appointment_type=eq.{}&assistant=not.is.null&order=date_time.desc",
            patient_id, appointment_type
        ))
        .await
    }
}

pub struct SupabaseUserDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseUserDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl UserDirectory for SupabaseUserDirectory {
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<UserAccount>> {
        let path = format!("{}?id=eq.{}", USERS_PATH, user_id);
        let users: Vec<UserAccount> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(users.into_iter().next())
    }

    async fn update_contact_details(
        &self,
        user_id: Uuid,
        details: &ContactDetails,
    ) -> StoreResult<()> {
        if details.is_empty() {
            return Ok(());
        }

        let mut fields = Map::new();
        if let Some(phone) = &details.phone {
            fields.insert("phone".to_string(), json!(phone));
        }
        if let Some(eps) = &details.eps {
            fields.insert("eps".to_string(), json!(eps));
        }
        if let Some(semester) = &details.semester {
            fields.insert("semester".to_string(), json!(semester));
        }

        let path = format!("{}?id=eq.{}", USERS_PATH, user_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, None, Some(Value::Object(fields)))
            .await?;
        Ok(())
    }
}
