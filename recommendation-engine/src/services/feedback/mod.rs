/// Feedback Recorder
///
/// Bounded append-only log of consumer reactions, kept for future model
/// retraining. Recording sits outside the scoring path and must never fail
/// it: problems are logged and swallowed.

use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::models::FeedbackEvent;

pub struct FeedbackRecorder {
    events: Mutex<VecDeque<FeedbackEvent>>,
    capacity: usize,
}

impl FeedbackRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entries once the cap is hit.
    /// Infallible by contract.
    pub fn record(&self, event: FeedbackEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Feedback log lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
            debug!(capacity = self.capacity, "Feedback log full, dropped oldest event");
        }
    }

    /// Remove and return up to `limit` events, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<FeedbackEvent> {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let take = events.len().min(limit);
        events.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(item_id: &str, accepted: bool) -> FeedbackEvent {
        FeedbackEvent {
            consumer_id: Some(Uuid::new_v4()),
            item_id: item_id.to_string(),
            accepted,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_drain_fifo() {
        let recorder = FeedbackRecorder::new(10);
        recorder.record(event("a", true));
        recorder.record(event("b", false));
        recorder.record(event("c", true));

        let drained = recorder.drain(2);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].item_id, "a");
        assert_eq!(drained[1].item_id, "b");
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let recorder = FeedbackRecorder::new(3);
        for id in ["a", "b", "c", "d", "e"] {
            recorder.record(event(id, true));
        }

        assert_eq!(recorder.len(), 3);
        let drained = recorder.drain(10);
        let ids: Vec<&str> = drained.iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "e"]);
    }

    #[test]
    fn test_drain_more_than_available() {
        let recorder = FeedbackRecorder::new(10);
        recorder.record(event("a", true));

        let drained = recorder.drain(100);
        assert_eq!(drained.len(), 1);
        assert!(recorder.is_empty());
    }
}
