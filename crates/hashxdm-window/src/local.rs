//! Scheduler backed by tokio's local task set.
//!
//! Tasks are `!Send` closures, so every timer is spawned with
//! [`tokio::task::spawn_local`]. The scheduler must only be used from
//! inside a [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::handle::TimerId;
use crate::schedule::{Scheduler, Task};

#[derive(Default)]
struct LocalState {
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

/// [`Scheduler`] running timers as tasks of the current `LocalSet`.
#[derive(Default)]
pub struct LocalScheduler {
    state: RefCell<LocalState>,
}

impl LocalScheduler {
    /// Create a scheduler with no pending timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cleared.
    pub fn pending(&self) -> usize {
        self.state
            .borrow()
            .timers
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl Scheduler for LocalScheduler {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.timers.retain(|_, handle| !handle.is_finished());
        state.next_id += 1;
        let id = TimerId::from_raw(state.next_id);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        state.timers.insert(id, handle);
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        if let Some(handle) = self.state.borrow_mut().timers.remove(&timer) {
            handle.abort();
        }
    }
}
