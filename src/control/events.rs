// src/control/events.rs
//
// Bounded journal of state-machine transitions. The integration layer
// drains it for observability instead of reaching into controller
// internals; draining never touches the state machine itself.

use super::emergency::EmergencyState;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub timestamp: f64,
    pub from: EmergencyState,
    pub to: EmergencyState,
    pub reason: String,
}

pub struct TransitionLog {
    records: VecDeque<TransitionRecord>,
    max_pending: usize,
}

impl TransitionLog {
    pub fn new(max_pending: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, record: TransitionRecord) {
        if self.records.len() >= self.max_pending {
            warn!(
                "Transition journal full ({} records), dropping oldest",
                self.max_pending
            );
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn drain(&mut self) -> Vec<TransitionRecord> {
        self.records.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t: f64) -> TransitionRecord {
        TransitionRecord {
            timestamp: t,
            from: EmergencyState::Normal,
            to: EmergencyState::Detected,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_drain_empties_journal() {
        let mut log = TransitionLog::new(8);
        log.publish(record(0.0));
        log.publish(record(1.0));

        assert_eq!(log.pending_count(), 2);
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(log.pending_count(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut log = TransitionLog::new(2);
        log.publish(record(0.0));
        log.publish(record(1.0));
        log.publish(record(2.0));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp, 1.0);
        assert_eq!(drained[1].timestamp, 2.0);
    }
}
