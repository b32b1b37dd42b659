// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::user::ContactDetails;

use crate::error::SchedulingError;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentType {
    Nursing,
    Dental,
    Psychology,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Nursing => "NURSING",
            AppointmentType::Dental => "DENTAL",
            AppointmentType::Psychology => "PSYCHOLOGY",
        }
    }

    /// Human readable label used in patient-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            AppointmentType::Nursing => "Nursing",
            AppointmentType::Dental => "Dental",
            AppointmentType::Psychology => "Psychology",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NURSING" => Ok(AppointmentType::Nursing),
            "DENTAL" => Ok(AppointmentType::Dental),
            "PSYCHOLOGY" => Ok(AppointmentType::Psychology),
            _ => Err(SchedulingError::InvalidAppointmentType(s.to_string())),
        }
    }
}

/// Engine path that last wrote a slot's availability flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityWriter {
    SlotCreation,
    Booking,
    FollowUp,
    Cancellation,
    Deletion,
    Expiry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub appointment_type: AppointmentType,
    pub date_time: DateTime<Utc>,
    pub available: bool,
    pub availability_changed_by: AvailabilityWriter,
    pub availability_changed_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(
        professional_id: Uuid,
        appointment_type: AppointmentType,
        date_time: DateTime<Utc>,
        available: bool,
        writer: AvailabilityWriter,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            professional_id,
            appointment_type,
            date_time: truncate_to_minute(date_time),
            available,
            availability_changed_by: writer,
            availability_changed_at: at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub appointment_type: AppointmentType,
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
    pub assistant: Option<bool>,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn for_slot(patient_id: Uuid, slot: &Slot, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            slot_id: slot.id,
            appointment_type: slot.appointment_type,
            professional_id: slot.professional_id,
            date_time: slot.date_time,
            assistant: None,
            pending: true,
            created_at,
        }
    }

    pub fn state(&self) -> ReservationState {
        match (self.pending, self.assistant) {
            (_, Some(true)) => ReservationState::Attended,
            (_, Some(false)) => ReservationState::NotAttended,
            (true, None) => ReservationState::Pending,
            (false, None) => ReservationState::AwaitingAssistance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Pending,
    AwaitingAssistance,
    Attended,
    NotAttended,
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationState::Pending => write!(f, "pending"),
            ReservationState::AwaitingAssistance => write!(f, "awaiting_assistance"),
            ReservationState::Attended => write!(f, "attended"),
            ReservationState::NotAttended => write!(f, "not_attended"),
        }
    }
}

/// Stored date-times carry minute precision.
pub fn truncate_to_minute(date_time: DateTime<Utc>) -> DateTime<Utc> {
    date_time
        .with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(date_time)
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub date_time: DateTime<Utc>,
    pub appointment_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotsRequest {
    pub professional_id: Uuid,
    pub slots: Vec<SlotCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReservationRequest {
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub phone: Option<String>,
    pub eps: Option<String>,
    pub semester: Option<String>,
}

impl BookReservationRequest {
    pub fn contact_details(&self) -> ContactDetails {
        ContactDetails {
            phone: self.phone.clone(),
            eps: self.eps.clone(),
            semester: self.semester.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAssistanceRequest {
    pub attended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationListStatus {
    #[default]
    Pending,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservationFilter {
    pub professional_id: Uuid,
    pub status: ReservationListStatus,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub const DEFAULT_SIZE: usize = 20;
    pub const MAX_SIZE: usize = 100;

    pub fn new(page: Option<usize>, size: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size
                .unwrap_or(Self::DEFAULT_SIZE)
                .clamp(1, Self::MAX_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.page.saturating_mul(request.size))
            .take(request.size)
            .collect();
        Self {
            items,
            page: request.page,
            size: request.size,
            total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUpOutcome {
    pub slot: Slot,
    pub reservation: Reservation,
}

// ==============================================================================
// EVENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulingEvent {
    SlotsCreated {
        professional_id: Uuid,
        slot_ids: Vec<Uuid>,
    },
    SlotBooked {
        slot_id: Uuid,
        reservation_id: Uuid,
    },
    SlotReleased {
        slot_id: Uuid,
    },
    SlotExpired {
        slot_id: Uuid,
    },
    SlotDeleted {
        slot_id: Uuid,
    },
    ReminderSent {
        reservation_id: Uuid,
    },
    ReservationClosed {
        reservation_id: Uuid,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        slot_id: Uuid,
    },
    AssistanceRecorded {
        reservation_id: Uuid,
        attended: bool,
    },
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Minimum distance between two slots of one professional.
    pub slot_buffer: Duration,
    pub min_booking_lead: Duration,
    pub reminder_lead: Duration,
    pub psychology_quota: usize,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            slot_buffer: Duration::minutes(30),
            min_booking_lead: Duration::minutes(60),
            reminder_lead: Duration::hours(2),
            psychology_quota: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot() -> Slot {
        Slot::new(
            Uuid::new_v4(),
            AppointmentType::Dental,
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 42).unwrap(),
            true,
            AvailabilityWriter::SlotCreation,
            Utc::now(),
        )
    }

    #[test]
    fn appointment_type_parses_case_insensitively() {
        assert_eq!("psychology".parse::<AppointmentType>().unwrap(), AppointmentType::Psychology);
        assert_eq!(" Nursing ".parse::<AppointmentType>().unwrap(), AppointmentType::Nursing);
        assert!("surgery".parse::<AppointmentType>().is_err());
    }

    #[test]
    fn slots_are_stored_with_minute_precision() {
        assert_eq!(slot().date_time, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn reservation_state_follows_pending_and_assistant() {
        let mut reservation = Reservation::for_slot(Uuid::new_v4(), &slot(), Utc::now());
        assert_eq!(reservation.state(), ReservationState::Pending);

        reservation.pending = false;
        assert_eq!(reservation.state(), ReservationState::AwaitingAssistance);

        reservation.assistant = Some(false);
        assert_eq!(reservation.state(), ReservationState::NotAttended);

        reservation.assistant = Some(true);
        assert_eq!(reservation.state(), ReservationState::Attended);
    }

    #[test]
    fn page_slices_and_reports_total() {
        let page = Page::from_vec((0..45).collect::<Vec<_>>(), PageRequest::new(Some(2), Some(20)));
        assert_eq!(page.items, (40..45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);

        assert_eq!(PageRequest::new(None, Some(0)).size, 1);
    }
}
