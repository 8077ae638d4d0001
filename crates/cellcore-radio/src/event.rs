//! # Event Queue
//!
//! Single-threaded, strictly ordered message queue with delayed entries.
//! Both the capability coordinator and the display state machine funnel
//! every input (collaborator callbacks, timer expirations, config changes)
//! through one of these.
//!
//! Ordering follows the usual handler-looper rules:
//!
//! ```text
//!   push(e)            → due = now
//!   push_delayed(e, d) → due = now + d
//!   pop_ready()        → earliest due entry with due <= now (FIFO on ties)
//! ```
//!
//! Time comes from a [`quanta::Clock`]; tests swap in `Clock::mock()` and
//! advance it explicitly.

use std::collections::BTreeMap;
use std::time::Duration;

use quanta::{Clock, Instant};

/// Ordered event queue with delayed delivery and predicate removal.
pub struct EventQueue<E> {
    clock: Clock,
    seq: u64,
    entries: BTreeMap<(Instant, u64), E>,
}

impl<E> EventQueue<E> {
    pub fn new(clock: Clock) -> Self {
        EventQueue {
            clock,
            seq: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Current time on the queue's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Enqueue an event for immediate delivery.
    pub fn push(&mut self, event: E) {
        let now = self.clock.now();
        self.insert(now, event);
    }

    /// Enqueue an event for delivery after `delay`.
    pub fn push_delayed(&mut self, event: E, delay: Duration) {
        let due = self.clock.now() + delay;
        self.insert(due, event);
    }

    fn insert(&mut self, due: Instant, event: E) {
        self.seq += 1;
        self.entries.insert((due, self.seq), event);
    }

    /// Pop the next event whose due time has passed.
    pub fn pop_ready(&mut self) -> Option<E> {
        let now = self.clock.now();
        let key = *self.entries.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.entries.remove(&key)
    }

    /// Remove every queued event matching `pred`. Returns how many were removed.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&E) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !pred(e));
        before - self.entries.len()
    }

    /// Whether any queued event matches `pred`.
    pub fn contains(&self, mut pred: impl FnMut(&E) -> bool) -> bool {
        self.entries.values().any(|e| pred(e))
    }

    /// Due time of the earliest queued event.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Time until the earliest queued event is due (zero if already due).
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|due| due.saturating_duration_since(self.clock.now()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mock_queue() -> (EventQueue<u32>, std::sync::Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        (EventQueue::new(clock), mock)
    }

    #[test]
    fn immediate_events_are_fifo() {
        let (mut q, _mock) = mock_queue();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop_ready(), Some(1));
        assert_eq!(q.pop_ready(), Some(2));
        assert_eq!(q.pop_ready(), Some(3));
        assert_eq!(q.pop_ready(), None);
    }

    #[test]
    fn delayed_event_waits_for_clock() {
        let (mut q, mock) = mock_queue();
        q.push_delayed(7, Duration::from_secs(10));
        assert_eq!(q.pop_ready(), None);
        assert_eq!(q.time_until_next(), Some(Duration::from_secs(10)));

        mock.increment(Duration::from_secs(9));
        assert_eq!(q.pop_ready(), None);

        mock.increment(Duration::from_secs(1));
        assert_eq!(q.pop_ready(), Some(7));
        assert!(q.is_empty());
    }

    #[test]
    fn delayed_event_runs_after_earlier_immediate_ones() {
        let (mut q, mock) = mock_queue();
        q.push_delayed(1, Duration::from_millis(5));
        q.push(2);
        mock.increment(Duration::from_millis(5));
        q.push(3);
        assert_eq!(q.pop_ready(), Some(2));
        assert_eq!(q.pop_ready(), Some(1));
        assert_eq!(q.pop_ready(), Some(3));
    }

    #[test]
    fn remove_where_cancels_pending_timers() {
        let (mut q, mock) = mock_queue();
        q.push_delayed(10, Duration::from_secs(1));
        q.push_delayed(11, Duration::from_secs(2));
        q.push(20);
        assert_eq!(q.remove_where(|e| *e >= 10 && *e < 20), 2);
        assert!(!q.contains(|e| *e == 10));
        mock.increment(Duration::from_secs(5));
        assert_eq!(q.pop_ready(), Some(20));
        assert_eq!(q.pop_ready(), None);
    }

    proptest! {
        #[test]
        fn pops_in_due_order(delays in proptest::collection::vec(0u64..1_000, 1..50)) {
            let (mut q, mock) = mock_queue();
            for (i, d) in delays.iter().enumerate() {
                q.push_delayed(i as u32, Duration::from_millis(*d));
            }
            mock.increment(Duration::from_millis(1_000));

            let mut popped = Vec::new();
            while let Some(i) = q.pop_ready() {
                popped.push(i);
            }
            prop_assert_eq!(popped.len(), delays.len());

            // Non-decreasing due time, insertion order on ties.
            for pair in popped.windows(2) {
                let (a, b) = (pair[0] as usize, pair[1] as usize);
                prop_assert!(delays[a] < delays[b] || (delays[a] == delays[b] && a < b));
            }
        }
    }
}
