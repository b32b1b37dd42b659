use tokio::sync::broadcast;
use tracing::debug;

use crate::models::SchedulingEvent;

pub type EventSender = broadcast::Sender<SchedulingEvent>;
pub type EventReceiver = broadcast::Receiver<SchedulingEvent>;

const DEFAULT_CAPACITY: usize = 1000;

/// Fan-out of scheduling events to any number of live subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe a lag instead of stalling writers.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: EventSender,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SchedulingEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!("Scheduling event delivered to {} subscribers", receivers),
            Err(_) => debug!("Scheduling event dropped, no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
