use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_POOL_SIZE: usize = 50;

/// Identifies a deferred action. At most one action is pending per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn reservation_reminder(reservation_id: Uuid) -> Self {
        Self(format!("reservation:{}:reminder", reservation_id))
    }

    pub fn reservation_transition(reservation_id: Uuid) -> Self {
        Self(format!("reservation:{}:transition", reservation_id))
    }

    pub fn slot_expiry(slot_id: Uuid) -> Self {
        Self(format!("slot:{}", slot_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledTaskInfo {
    pub key: TaskKey,
    pub fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Upper bound on deferred actions executing at the same time.
    pub pool_size: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_for_the_same_reservation_do_not_collide() {
        let id = Uuid::new_v4();
        let reminder = TaskKey::reservation_reminder(id);
        let transition = TaskKey::reservation_transition(id);

        assert_ne!(reminder, transition);
        assert_eq!(reminder.as_str(), format!("reservation:{}:reminder", id));
        assert_eq!(TaskKey::slot_expiry(id).to_string(), format!("slot:{}", id));
    }
}
