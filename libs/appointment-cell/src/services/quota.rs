use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::AppointmentType;
use crate::services::store::ReservationStore;

/// Half-year window the quota is counted over.
///
/// After June the window is June 1st to December 31st; otherwise it is
/// January 1st to May 31st. Both bounds are inclusive.
pub fn quota_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = now.year();
    let (start, end) = if now.month() > 6 {
        (
            Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0),
            Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59),
        )
    } else {
        (
            Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0),
            Utc.with_ymd_and_hms(year, 5, 31, 23, 59, 59),
        )
    };
    // Fixed calendar dates at midnight and just before it are never ambiguous in UTC.
    (start.single().unwrap_or(now), end.single().unwrap_or(now))
}

pub struct QuotaValidator {
    reservations: Arc<dyn ReservationStore>,
    limit: usize,
}

impl QuotaValidator {
    pub fn new(reservations: Arc<dyn ReservationStore>, limit: usize) -> Self {
        Self {
            reservations,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Only psychology appointments are capped.
    pub async fn check_quota(
        &self,
        patient_id: Uuid,
        appointment_type: AppointmentType,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        if appointment_type != AppointmentType::Psychology {
            return Ok(());
        }

        let (from, to) = quota_window(now);
        let attended = self
            .reservations
            .count_attended(patient_id, appointment_type, from, to)
            .await?;
        debug!(
            "Patient {} attended {} psychology appointments between {} and {}",
            patient_id, attended, from, to
        );

        if attended >= self.limit {
            info!("Patient {} reached the psychology quota", patient_id);
            return Err(SchedulingError::QuotaExceeded {
                patient_id,
                limit: self.limit,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn second_half_window_starts_in_june() {
        let (from, to) = quota_window(at(9, 15));
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn june_still_uses_the_first_half_window() {
        let (from, to) = quota_window(at(6, 20));
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 5, 31, 23, 59, 59).unwrap());
    }
}
