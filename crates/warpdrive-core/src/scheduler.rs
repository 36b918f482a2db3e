// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Flush scheduling port.
//!
//! The graph asks for a flush at most once per pending batch; the host
//! decides when it runs (microtask, event-loop tick, or an explicit drain in
//! tests) and then calls `flush` on the graph or store.
use std::cell::Cell;
use std::rc::Rc;

/// Host hook invoked when the graph has canonical work pending.
pub trait FlushScheduler {
    /// Requests that `flush` be called soon. Called once per batch.
    fn schedule_flush(&mut self);
}

impl<F: FnMut()> FlushScheduler for F {
    fn schedule_flush(&mut self) {
        self();
    }
}

/// Scheduler for manual draining: counts requests and does nothing else.
///
/// Clones share the counter, so a test can keep one handle and give the
/// other to the graph.
#[derive(Clone, Debug, Default)]
pub struct ManualScheduler {
    requests: Rc<Cell<usize>>,
}

impl ManualScheduler {
    /// Creates a scheduler with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flush requests received.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule_flush(&mut self) {
        self.requests.set(self.requests.get() + 1);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_counter() {
        let handle = ManualScheduler::new();
        let mut given: Box<dyn FlushScheduler> = Box::new(handle.clone());
        given.schedule_flush();
        given.schedule_flush();
        assert_eq!(handle.requests(), 2);
    }

    #[test]
    fn closures_are_schedulers() {
        let mut hits = 0;
        {
            let mut scheduler = || hits += 1;
            scheduler.schedule_flush();
        }
        assert_eq!(hits, 1);
    }
}
