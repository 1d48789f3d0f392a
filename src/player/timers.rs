// ==========================================
// DELAYED CALLBACKS
// ==========================================
// A tiny deadline queue polled by the UI loop. The players never sleep or
// spawn timers themselves: they hand back "run this after N ms" and the loop
// fires whatever is due on each tick.
//
// Entries can be dropped early with cancel_where(), which is how a new load
// gets rid of the settle/refresh callbacks queued by the previous one.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<(Instant, T)>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue { entries: Vec::new() }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, after: Duration, timer: T) {
        self.entries.push((now + after, timer));
    }

    // Removes and returns everything due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        let mut pending = Vec::with_capacity(self.entries.len());
        for (deadline, timer) in self.entries.drain(..) {
            if deadline <= now {
                due.push((deadline, timer));
            } else {
                pending.push((deadline, timer));
            }
        }
        self.entries = pending;

        // Stable, so timers with the same deadline keep scheduling order
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, timer)| timer).collect()
    }

    pub fn cancel_where<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.entries.retain(|(_, timer)| !predicate(timer));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(deadline, _)| *deadline).min()
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

    #[test]
    fn only_due_timers_fire_in_deadline_order() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(start, Duration::from_millis(500), "refresh");
        queue.schedule(start, Duration::from_millis(100), "visibility");
        queue.schedule(start, Duration::from_millis(2000), "settle");

        assert!(queue.take_due(start).is_empty());
        assert_eq!(
            queue.take_due(start + Duration::from_millis(600)),
            vec!["visibility", "refresh"]
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(start + Duration::from_millis(2000)));
        assert_eq!(queue.take_due(start + Duration::from_secs(3)), vec!["settle"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(start, Duration::from_millis(10), (1u64, "settle"));
        queue.schedule(start, Duration::from_millis(10), (2u64, "settle"));

        queue.cancel_where(|(generation, _)| *generation < 2);

        assert_eq!(queue.take_due(start + Duration::from_secs(1)), vec![(2, "settle")]);
    }
}
