//! Scheduler - time-ordered event queue over fractional years
//!
//! Entries fire in time order; entries with equal time fire in registration
//! order. Recurrence is explicit: an entry registered with an interval is
//! re-armed by [`Scheduler::rearm`] after it fires, and re-arming counts as a
//! fresh registration.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct Entry<A> {
    time: f64,
    seq: u64,
    interval: Option<f64>,
    actor: A,
}

impl<A> PartialEq for Entry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<A> Eq for Entry<A> {}

impl<A> Ord for Entry<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest time, then the earliest registration.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<A> PartialOrd for Entry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An entry popped from the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<A> {
    pub time: f64,
    pub actor: A,
    interval: Option<f64>,
}

impl<A> Fired<A> {
    pub fn interval(&self) -> Option<f64> {
        self.interval
    }
}

#[derive(Debug)]
pub struct Scheduler<A> {
    now: f64,
    next_seq: u64,
    queue: BinaryHeap<Entry<A>>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Time of the entry fired most recently.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|entry| entry.time)
    }

    /// Fire `actor` once at absolute `time`.
    pub fn schedule_once(&mut self, time: f64, actor: A) {
        self.push(time, None, actor);
    }

    /// Fire `actor` once, `delay` years after the current time.
    pub fn schedule_after(&mut self, delay: f64, actor: A) {
        self.push(self.now + delay, None, actor);
    }

    /// Fire `actor` at `first` and every `interval` years after that, for as
    /// long as the dispatcher keeps re-arming it.
    pub fn schedule_repeating(&mut self, first: f64, interval: f64, actor: A) {
        debug_assert!(interval > 0.0, "repeat interval must be positive");
        self.push(first, Some(interval), actor);
    }

    pub fn pop_next(&mut self) -> Option<Fired<A>> {
        let entry = self.queue.pop()?;
        self.now = entry.time;
        Some(Fired {
            time: entry.time,
            actor: entry.actor,
            interval: entry.interval,
        })
    }

    /// Register a fired repeating entry again, one interval after it fired.
    /// Returns false for one-shot entries, which are dropped.
    pub fn rearm(&mut self, fired: Fired<A>) -> bool {
        match fired.interval {
            Some(interval) => {
                self.push(fired.time + interval, Some(interval), fired.actor);
                true
            }
            None => false,
        }
    }

    fn push(&mut self, time: f64, interval: Option<f64>, actor: A) {
        debug_assert!(time.is_finite(), "event time must be finite");
        debug_assert!(time >= self.now, "event time must be >= current time");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            time,
            seq,
            interval,
            actor,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(10.0, "c");
        scheduler.schedule_once(0.5, "a");
        scheduler.schedule_once(2.0, "b");

        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_next())
            .map(|fired| fired.actor)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(scheduler.now(), 10.0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn equal_times_fire_in_registration_order() {
        let mut scheduler = Scheduler::new();
        for actor in 0..50 {
            scheduler.schedule_once(1.0, actor);
        }
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_next())
            .map(|fired| fired.actor)
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn schedule_after_is_relative_to_now() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(3.0, 'x');
        scheduler.pop_next();
        scheduler.schedule_after(0.5, 'y');
        assert_eq!(scheduler.peek_time(), Some(3.5));
    }

    #[test]
    fn one_shot_entries_are_not_rearmed() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(0.0, ());
        let fired = scheduler.pop_next().expect("entry");
        assert!(!scheduler.rearm(fired));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn repeating_entries_rearm_behind_earlier_registrations() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(0.0, 1.0, "route");
        scheduler.schedule_once(1.0, "late");

        let fired = scheduler.pop_next().expect("route fires");
        assert_eq!(fired.interval(), Some(1.0));
        assert!(scheduler.rearm(fired));

        // Both sit at t = 1.0; "late" was registered before the re-arm.
        assert_eq!(scheduler.pop_next().map(|f| f.actor), Some("late"));
        let again = scheduler.pop_next().expect("route again");
        assert_eq!((again.time, again.actor), (1.0, "route"));
    }
}
