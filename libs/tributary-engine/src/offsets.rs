use std::collections::HashMap;

use tributary_api::{Offset, Topic};

/// Per-partition commit bookkeeping, one entry per input topic.
///
/// `eligible` is the highest offset that may be committed: fully processed
/// (automatic policy) or marked and flushed (manual policy). `committed`
/// holds the last value handed to the broker, which is `eligible + 1`.
#[derive(Debug, Default)]
pub(crate) struct OffsetTracker {
    eligible: HashMap<Topic, Offset>,
    committed: HashMap<Topic, Offset>,
}

impl OffsetTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare `offset` of `topic` safe to commit. Never moves backwards.
    pub(crate) fn advance(&mut self, topic: &Topic, offset: Offset) {
        match self.eligible.get_mut(topic) {
            Some(current) if *current >= offset => {}
            Some(current) => *current = offset,
            None => {
                self.eligible.insert(topic.clone(), offset);
            }
        }
    }

    /// `(topic, next_offset)` pairs whose eligible offset is ahead of the
    /// last commit.
    pub(crate) fn pending(&self) -> Vec<(Topic, Offset)> {
        let mut pending: Vec<(Topic, Offset)> = self
            .eligible
            .iter()
            .map(|(topic, offset)| (topic.clone(), offset + 1))
            .filter(|(topic, next)| self.committed.get(topic).is_none_or(|c| c < next))
            .collect();
        pending.sort();
        pending
    }

    pub(crate) fn record_commit(&mut self, topic: Topic, next_offset: Offset) {
        self.committed.insert(topic, next_offset);
    }

    /// Last committed next-offset per topic, sorted by topic.
    pub(crate) fn committed(&self) -> Vec<(Topic, Offset)> {
        let mut committed: Vec<(Topic, Offset)> =
            self.committed.iter().map(|(t, o)| (t.clone(), *o)).collect();
        committed.sort();
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_pending_initially() {
        assert!(OffsetTracker::new().pending().is_empty());
    }

    #[test]
    fn pending_is_next_offset() {
        let mut tracker = OffsetTracker::new();
        let topic = Topic::from("hello");
        tracker.advance(&topic, 0);
        tracker.advance(&topic, 4);
        assert_eq!(tracker.pending(), vec![(topic.clone(), 5)]);

        tracker.record_commit(topic.clone(), 5);
        assert!(tracker.pending().is_empty());
        assert_eq!(tracker.committed(), vec![(topic, 5)]);
    }

    #[test]
    fn advance_never_regresses() {
        let mut tracker = OffsetTracker::new();
        let topic = Topic::from("hello");
        tracker.advance(&topic, 9);
        tracker.advance(&topic, 3);
        assert_eq!(tracker.pending(), vec![(topic, 10)]);
    }

    #[test]
    fn topics_are_tracked_independently() {
        let mut tracker = OffsetTracker::new();
        tracker.advance(&Topic::from("a"), 1);
        tracker.advance(&Topic::from("b"), 7);
        tracker.record_commit(Topic::from("a"), 2);
        assert_eq!(tracker.pending(), vec![(Topic::from("b"), 8)]);
    }
}
