//! Timers and lifecycle-bound repeating tasks.
//!
//! All work runs on one cooperative event loop. Nothing blocks: a wait is
//! either a one-shot timer or a [`repeat`] task that reschedules itself
//! until it finishes or its [`CancellationToken`] is cancelled.

use std::cell::RefCell;
use std::ops::ControlFlow;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::handle::TimerId;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// One-shot timer source.
pub trait Scheduler {
    /// Run `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a timer that has not fired yet. Unknown ids are ignored.
    fn clear_timeout(&self, timer: TimerId);
}

/// When the first tick of a [`repeat`] task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStart {
    /// Synchronously, inside the `repeat` call.
    Now,
    /// After the given delay.
    After(Duration),
}

type Tick = Box<dyn FnMut() -> ControlFlow<()>>;

struct Repeating {
    scheduler: Weak<dyn Scheduler>,
    period: Duration,
    token: CancellationToken,
    tick: RefCell<Tick>,
}

impl Repeating {
    fn run(self: Rc<Self>) {
        if self.token.is_cancelled() {
            return;
        }
        let flow = {
            let mut tick = self.tick.borrow_mut();
            (*tick)()
        };
        if flow.is_continue() && !self.token.is_cancelled() {
            let period = self.period;
            self.schedule(period);
        }
    }

    fn schedule(self: Rc<Self>, delay: Duration) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            tracing::trace!("scheduler gone, repeating task stops");
            return;
        };
        scheduler.set_timeout(delay, Box::new(move || self.run()));
    }
}

/// Run `tick` every `period` until it returns `Break` or `token` is
/// cancelled.
///
/// The token is checked before every tick and before every reschedule, so
/// cancelling it turns any pending tick into a no-op.
pub fn repeat<F>(
    scheduler: &Rc<dyn Scheduler>,
    period: Duration,
    start: RepeatStart,
    token: CancellationToken,
    tick: F,
) where
    F: FnMut() -> ControlFlow<()> + 'static,
{
    let task = Rc::new(Repeating {
        scheduler: Rc::downgrade(scheduler),
        period,
        token,
        tick: RefCell::new(Box::new(tick)),
    });
    match start {
        RepeatStart::Now => task.run(),
        RepeatStart::After(delay) => task.schedule(delay),
    }
}
