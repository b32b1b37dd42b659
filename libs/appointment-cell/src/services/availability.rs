use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::services::store::SlotStore;

/// Keeps each professional's slots at least `buffer` apart.
///
/// Callers must hold the professional's lock across validation and insert,
/// otherwise two concurrent batches could both pass.
pub struct AvailabilityValidator {
    slots: Arc<dyn SlotStore>,
    buffer: Duration,
}

impl AvailabilityValidator {
    pub fn new(slots: Arc<dyn SlotStore>, buffer: Duration) -> Self {
        Self { slots, buffer }
    }

    pub fn within_buffer(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        (a - b).abs() < self.buffer
    }

    /// Fails when a stored slot of the professional lies strictly inside
    /// `(date_time - buffer, date_time + buffer)`.
    pub async fn validate_slot_creation(
        &self,
        professional_id: Uuid,
        date_time: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        let nearby = self
            .slots
            .find_between(professional_id, date_time - self.buffer, date_time + self.buffer)
            .await?;

        if let Some(existing) = nearby.first() {
            warn!(
                "Slot at {} for professional {} conflicts with slot {} at {}",
                date_time, professional_id, existing.id, existing.date_time
            );
            return Err(SchedulingError::ConflictingSlot {
                professional_id,
                date_time,
            });
        }

        Ok(())
    }

    /// Validates a batch against stored slots and against itself.
    pub async fn validate_batch(
        &self,
        professional_id: Uuid,
        candidates: &[DateTime<Utc>],
    ) -> Result<(), SchedulingError> {
        for (index, candidate) in candidates.iter().enumerate() {
            if candidates[..index]
                .iter()
                .any(|earlier| self.within_buffer(*earlier, *candidate))
            {
                warn!(
                    "Batch for professional {} contains slots closer than {} minutes around {}",
                    professional_id,
                    self.buffer.num_minutes(),
                    candidate
                );
                return Err(SchedulingError::ConflictingSlot {
                    professional_id,
                    date_time: *candidate,
                });
            }

            self.validate_slot_creation(professional_id, *candidate).await?;
        }

        debug!(
            "{} candidate slots validated for professional {}",
            candidates.len(),
            professional_id
        );
        Ok(())
    }
}
