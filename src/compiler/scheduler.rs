//! Compile queue with a bound on running processes.
//!
//! Plain FIFO with deduplication. The scheduler only counts slots; what a
//! slot runs is decided by the caller. A slot is held from [`Scheduler::next`]
//! until [`Scheduler::finish`], which the caller invokes only after the
//! process has exited (killed processes included).

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::core::OutputPath;

#[derive(Debug)]
pub struct Scheduler {
    queue: VecDeque<OutputPath>,
    /// Keys currently in `queue`
    pending: FxHashSet<OutputPath>,
    running: usize,
    max_parallel: usize,
}

impl Scheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            pending: FxHashSet::default(),
            running: 0,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Queue a target. Returns `false` when it is already queued.
    pub fn enqueue(&mut self, key: OutputPath) -> bool {
        if !self.pending.insert(key.clone()) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    #[cfg(test)]
    pub fn is_queued(&self, key: &OutputPath) -> bool {
        self.pending.contains(key)
    }

    /// Claim a slot for the first queued target that is still ready.
    ///
    /// Entries failing `is_ready` at dequeue time are dropped; whoever makes
    /// them ready again queues them again.
    pub fn next(&mut self, mut is_ready: impl FnMut(&OutputPath) -> bool) -> Option<OutputPath> {
        while self.has_capacity() {
            let key = self.queue.pop_front()?;
            self.pending.remove(&key);
            if is_ready(&key) {
                self.running += 1;
                return Some(key);
            }
            crate::debug!("compile"; "dropping stale queue entry: {}", key);
        }
        None
    }

    /// Release a slot after its process exited.
    pub fn finish(&mut self) {
        self.running = self.running.saturating_sub(1);
    }

    pub fn has_capacity(&self) -> bool {
        self.running < self.max_parallel
    }

    #[cfg(test)]
    pub fn running(&self) -> usize {
        self.running
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Nothing queued, nothing running.
    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> OutputPath {
        OutputPath::new(format!("/out/{name}.js"))
    }

    #[test]
    fn test_fifo_order() {
        let mut s = Scheduler::new(4);
        s.enqueue(key("a"));
        s.enqueue(key("b"));
        s.enqueue(key("c"));
        assert_eq!(s.next(|_| true), Some(key("a")));
        assert_eq!(s.next(|_| true), Some(key("b")));
        assert_eq!(s.next(|_| true), Some(key("c")));
        assert_eq!(s.next(|_| true), None);
    }

    #[test]
    fn test_requeue_of_queued_target_is_ignored() {
        let mut s = Scheduler::new(1);
        assert!(s.enqueue(key("a")));
        assert!(s.enqueue(key("b")));
        assert!(!s.enqueue(key("a")));
        assert_eq!(s.queued(), 2);
    }

    #[test]
    fn test_bound_never_exceeded() {
        let mut s = Scheduler::new(2);
        for name in ["a", "b", "c", "d", "e"] {
            s.enqueue(key(name));
        }

        let mut max_seen = 0;
        let mut started = Vec::new();
        loop {
            while let Some(k) = s.next(|_| true) {
                started.push(k);
                max_seen = max_seen.max(s.running());
            }
            if s.running() == 0 {
                break;
            }
            s.finish();
        }
        assert_eq!(max_seen, 2);
        assert_eq!(started.len(), 5);
        assert!(s.is_idle());
    }

    #[test]
    fn test_stale_entries_dropped_at_dequeue() {
        let mut s = Scheduler::new(1);
        s.enqueue(key("a"));
        s.enqueue(key("b"));
        assert_eq!(s.next(|k| k != &key("a")), Some(key("b")));
        assert!(!s.is_queued(&key("a")));
        assert_eq!(s.running(), 1);
    }

    #[test]
    fn test_slot_held_until_finish() {
        let mut s = Scheduler::new(1);
        s.enqueue(key("a"));
        s.enqueue(key("b"));
        assert!(s.next(|_| true).is_some());
        assert!(!s.has_capacity());
        assert_eq!(s.next(|_| true), None);
        s.finish();
        assert_eq!(s.next(|_| true), Some(key("b")));
    }

    #[test]
    fn test_zero_parallel_is_one() {
        let mut s = Scheduler::new(0);
        s.enqueue(key("a"));
        assert!(s.next(|_| true).is_some());
    }
}
