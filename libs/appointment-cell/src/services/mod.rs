pub mod store;
pub mod memory_store;
pub mod supabase_store;
pub mod users;
pub mod notifier;
pub mod roles;
pub mod locks;
pub mod availability;
pub mod quota;
pub mod lifecycle;
pub mod events;
pub mod engine;

pub use store::*;
pub use memory_store::*;
pub use supabase_store::*;
pub use users::*;
pub use notifier::*;
pub use roles::*;
pub use locks::KeyedLocks;
pub use availability::AvailabilityValidator;
pub use quota::{quota_window, QuotaValidator};
pub use lifecycle::{ReservationAction, ReservationLifecycle};
pub use events::{EventBroadcaster, EventReceiver};
pub use engine::SchedulingEngine;
