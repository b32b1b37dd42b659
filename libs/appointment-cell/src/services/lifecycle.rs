use tracing::{debug, warn};

use crate::error::SchedulingError;
use crate::models::ReservationState;

/// Operations that move a reservation through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    /// Slot time reached with no attendance recorded.
    Elapse,
    RecordAssistance,
    Cancel,
}

impl ReservationAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ReservationAction::Elapse => "close",
            ReservationAction::RecordAssistance => "record assistance for",
            ReservationAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReservationLifecycle;

impl ReservationLifecycle {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_action(
        &self,
        current: ReservationState,
        action: ReservationAction,
    ) -> Result<(), SchedulingError> {
        if !self.allowed_actions(current).contains(&action) {
            warn!("Rejected {:?} on reservation in state {}", action, current);
            return Err(SchedulingError::InvalidStatusTransition {
                from: current,
                action: action.verb(),
            });
        }

        debug!("{:?} allowed from {}", action, current);
        Ok(())
    }

    pub fn allowed_actions(&self, current: ReservationState) -> Vec<ReservationAction> {
        match current {
            ReservationState::Pending => vec![
                ReservationAction::Elapse,
                ReservationAction::RecordAssistance,
                ReservationAction::Cancel,
            ],
            ReservationState::AwaitingAssistance => vec![
                ReservationAction::RecordAssistance,
                ReservationAction::Cancel,
            ],
            // Attendance is final
            ReservationState::Attended | ReservationState::NotAttended => vec![],
        }
    }
}
