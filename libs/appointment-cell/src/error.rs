use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{AppointmentType, ReservationState};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Could not decode stored record: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Backend(format!("{:#}", e))
    }
}

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotifierError {
    fn from(e: reqwest::Error) -> Self {
        NotifierError::Transport(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("User {0} does not hold a role that offers appointments")]
    NotAProfessional(Uuid),

    #[error("Unknown appointment type: {0}")]
    InvalidAppointmentType(String),

    #[error("Professional {professional_id} already has a slot within 30 minutes of {date_time}")]
    ConflictingSlot {
        professional_id: Uuid,
        date_time: DateTime<Utc>,
    },

    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Slot {0} is no longer available")]
    SlotUnavailable(Uuid),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Patient {patient_id} already has a pending {appointment_type} appointment")]
    HasPendingAppointment {
        patient_id: Uuid,
        appointment_type: AppointmentType,
    },

    #[error("Patient {patient_id} reached the limit of {limit} attended appointments for this period")]
    QuotaExceeded { patient_id: Uuid, limit: usize },

    #[error("Appointment date {0} is in the past")]
    DateInPast(DateTime<Utc>),

    #[error("Appointment at {date_time} must be booked at least {min_lead_minutes} minutes ahead")]
    TooSoon {
        date_time: DateTime<Utc>,
        min_lead_minutes: i64,
    },

    #[error("External users cannot book appointments")]
    ExternalNotAllowed(Uuid),

    #[error("Cannot {action} a reservation in state {from}")]
    InvalidStatusTransition {
        from: ReservationState,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulingError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulingError::NotAProfessional(_) => "not_a_professional",
            SchedulingError::InvalidAppointmentType(_) => "invalid_appointment_type",
            SchedulingError::ConflictingSlot { .. } => "conflicting_slot",
            SchedulingError::SlotNotFound(_) => "slot_not_found",
            SchedulingError::SlotUnavailable(_) => "slot_unavailable",
            SchedulingError::ReservationNotFound(_) => "reservation_not_found",
            SchedulingError::UserNotFound(_) => "user_not_found",
            SchedulingError::HasPendingAppointment { .. } => "has_pending_appointment",
            SchedulingError::QuotaExceeded { .. } => "quota_exceeded",
            SchedulingError::DateInPast(_) => "date_in_past",
            SchedulingError::TooSoon { .. } => "too_soon",
            SchedulingError::ExternalNotAllowed(_) => "external_not_allowed",
            SchedulingError::InvalidStatusTransition { .. } => "invalid_status_transition",
            SchedulingError::Store(_) => "store",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulingError::SlotNotFound(_)
            | SchedulingError::ReservationNotFound(_)
            | SchedulingError::UserNotFound(_) => StatusCode::NOT_FOUND,
            SchedulingError::ConflictingSlot { .. }
            | SchedulingError::SlotUnavailable(_)
            | SchedulingError::HasPendingAppointment { .. }
            | SchedulingError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            SchedulingError::QuotaExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulingError::InvalidAppointmentType(_)
            | SchedulingError::DateInPast(_)
            | SchedulingError::TooSoon { .. } => StatusCode::BAD_REQUEST,
            SchedulingError::NotAProfessional(_) | SchedulingError::ExternalNotAllowed(_) => {
                StatusCode::FORBIDDEN
            }
            SchedulingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Store(store) => AppError::Database(store.to_string()),
            other => AppError::Rejected {
                status: other.status_code(),
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses_at_the_boundary() {
        let err: AppError = SchedulingError::QuotaExceeded {
            patient_id: Uuid::new_v4(),
            limit: 4,
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind(), "quota_exceeded");

        let err: AppError = SchedulingError::SlotUnavailable(Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "slot_unavailable");
    }

    #[test]
    fn store_failures_are_not_validation_errors() {
        let err = SchedulingError::from(StoreError::Backend("connection reset".to_string()));
        assert_eq!(err.kind(), "store");

        let app: AppError = err.into();
        assert_eq!(app.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
