//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides a concrete implementation of the [`Scheduler`]
//! contract defined in `weft-core`. Hosts construct a [`StdScheduler`],
//! pass it to [`weft_core::Root::new`] and pump it from their event loop
//! with [`StdScheduler::run_next_task`] or [`StdScheduler::run_until_idle`].

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use weft_core::collections::map::HashMap;
use weft_core::{CallbackHandle, Priority, Scheduler, SchedulerCallback, TaskStatus};

/// How long a running callback may work before [`Scheduler::should_yield`]
/// starts returning `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBudget {
    /// Wall-clock (or manual-clock) slice measured from the start of each task.
    Time(Duration),
    /// Yield after this many `should_yield` checks per task.
    Units(usize),
}

impl Default for FrameBudget {
    fn default() -> Self {
        FrameBudget::Time(Duration::from_millis(5))
    }
}

/// Delay after which a queued task counts as expired and must run to
/// completion without yielding.
pub fn priority_timeout(priority: Priority) -> Duration {
    match priority {
        Priority::Immediate => Duration::ZERO,
        Priority::UserBlocking => Duration::from_millis(250),
        Priority::Normal => Duration::from_millis(5000),
        Priority::Low => Duration::from_millis(10_000),
        Priority::Idle => Duration::MAX,
    }
}

enum SchedulerClock {
    Real(Instant),
    Manual(Cell<Duration>),
}

impl SchedulerClock {
    fn now(&self) -> Duration {
        match self {
            SchedulerClock::Real(origin) => origin.elapsed(),
            SchedulerClock::Manual(now) => now.get(),
        }
    }
}

/// Heap entry; the callback itself lives in the task table so cancellation
/// only has to forget the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    expiration: Duration,
    seq: u64,
    handle: CallbackHandle,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expiration
            .cmp(&other.expiration)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct ScheduledTask {
    priority: Priority,
    callback: SchedulerCallback,
}

#[derive(Clone, Copy)]
struct Running {
    handle: CallbackHandle,
    cancelled: bool,
}

/// Single-threaded cooperative scheduler.
///
/// Tasks run in expiration order (priority timeout added to the time they
/// were queued, ties broken by insertion). A task that returns
/// [`TaskStatus::Continue`] keeps its handle and its place in the queue.
/// Microtasks are drained before and after every task.
pub struct StdScheduler {
    clock: SchedulerClock,
    budget: FrameBudget,
    next_handle: Cell<u64>,
    next_seq: Cell<u64>,
    queue: RefCell<BinaryHeap<Reverse<QueueEntry>>>,
    tasks: RefCell<HashMap<CallbackHandle, ScheduledTask>>,
    microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    priority: Cell<Priority>,
    running: Cell<Option<Running>>,
    slice_start: Cell<Duration>,
    slice_checks: Cell<usize>,
    frame_requested: Cell<bool>,
    frame_waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self::with_budget(FrameBudget::default())
    }

    /// Scheduler on the wall clock with a custom slice.
    pub fn with_budget(budget: FrameBudget) -> Self {
        Self::build(SchedulerClock::Real(Instant::now()), budget)
    }

    /// Scheduler on a manual clock that only moves through
    /// [`advance_time`](Self::advance_time), yielding after `units` checks
    /// per task. Runs are fully reproducible.
    pub fn deterministic(units: usize) -> Self {
        Self::build(
            SchedulerClock::Manual(Cell::new(Duration::ZERO)),
            FrameBudget::Units(units),
        )
    }

    fn build(clock: SchedulerClock, budget: FrameBudget) -> Self {
        Self {
            clock,
            budget,
            next_handle: Cell::new(1),
            next_seq: Cell::new(0),
            queue: RefCell::new(BinaryHeap::new()),
            tasks: RefCell::new(HashMap::default()),
            microtasks: RefCell::new(VecDeque::new()),
            priority: Cell::new(Priority::Normal),
            running: Cell::new(None),
            slice_start: Cell::new(Duration::ZERO),
            slice_checks: Cell::new(0),
            frame_requested: Cell::new(false),
            frame_waker: RefCell::new(None),
        }
    }

    pub fn budget(&self) -> FrameBudget {
        self.budget
    }

    /// Time since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Moves a manual clock forward. Ignored on the wall clock.
    pub fn advance_time(&self, by: Duration) {
        match &self.clock {
            SchedulerClock::Manual(now) => now.set(now.get().saturating_add(by)),
            SchedulerClock::Real(_) => log::warn!("advance_time ignored on a wall-clock scheduler"),
        }
    }

    /// Number of queued, non-cancelled tasks.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_tasks() > 0 || !self.microtasks.borrow().is_empty()
    }

    /// Returns whether work was queued since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.replace(false)
    }

    /// Registers a waker invoked when work is queued while no frame request
    /// is outstanding.
    pub fn set_frame_waker(&self, waker: impl Fn() + 'static) {
        *self.frame_waker.borrow_mut() = Some(Rc::new(waker));
    }

    pub fn clear_frame_waker(&self) {
        *self.frame_waker.borrow_mut() = None;
    }

    fn request_frame(&self) {
        if self.frame_requested.replace(true) {
            return;
        }
        let waker = self.frame_waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    /// Drains the microtask queue, including microtasks queued while draining.
    pub fn flush_microtasks(&self) {
        loop {
            let task = self.microtasks.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    /// Runs the earliest-expiring task for one slice. Returns `false` when
    /// there was nothing to run.
    pub fn run_next_task(&self) -> bool {
        self.flush_microtasks();
        let Some((entry, mut task)) = self.pop_task() else {
            return false;
        };

        let did_timeout = entry.expiration <= self.now();
        self.slice_start.set(self.now());
        self.slice_checks.set(0);
        self.running.set(Some(Running {
            handle: entry.handle,
            cancelled: false,
        }));
        let previous = self.priority.replace(task.priority);
        log::trace!(
            "run task {} at {:?} (timed out: {did_timeout})",
            entry.handle,
            task.priority
        );

        let status = (task.callback)(did_timeout);

        self.priority.set(previous);
        let cancelled = self
            .running
            .take()
            .is_some_and(|running| running.cancelled);
        if status == TaskStatus::Continue && !cancelled {
            self.tasks.borrow_mut().insert(entry.handle, task);
            self.queue.borrow_mut().push(Reverse(entry));
        }
        self.flush_microtasks();
        true
    }

    /// Runs tasks until the queue is empty. A task that keeps continuing
    /// keeps this loop going.
    pub fn run_until_idle(&self) {
        while self.run_next_task() {}
    }

    fn pop_task(&self) -> Option<(QueueEntry, ScheduledTask)> {
        loop {
            let Reverse(entry) = self.queue.borrow_mut().pop()?;
            if let Some(task) = self.tasks.borrow_mut().remove(&entry.handle) {
                return Some((entry, task));
            }
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("budget", &self.budget)
            .field("now", &self.now())
            .field("pending_tasks", &self.pending_tasks())
            .field("microtasks", &self.microtasks.borrow().len())
            .field("priority", &self.priority.get())
            .finish()
    }
}

impl Scheduler for StdScheduler {
    fn schedule_callback(&self, priority: Priority, callback: SchedulerCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let expiration = self.now().saturating_add(priority_timeout(priority));

        self.tasks
            .borrow_mut()
            .insert(handle, ScheduledTask { priority, callback });
        self.queue.borrow_mut().push(Reverse(QueueEntry {
            expiration,
            seq,
            handle,
        }));
        log::trace!("queued task {handle} at {priority:?}");
        self.request_frame();
        handle
    }

    fn cancel_callback(&self, handle: CallbackHandle) {
        if let Some(running) = self.running.get() {
            if running.handle == handle {
                self.running.set(Some(Running {
                    cancelled: true,
                    ..running
                }));
                return;
            }
        }
        if self.tasks.borrow_mut().remove(&handle).is_some() {
            log::trace!("cancelled task {handle}");
        }
    }

    fn should_yield(&self) -> bool {
        match self.budget {
            FrameBudget::Time(slice) => self.now().saturating_sub(self.slice_start.get()) >= slice,
            FrameBudget::Units(units) => {
                let checks = self.slice_checks.get();
                self.slice_checks.set(checks + 1);
                checks >= units
            }
        }
    }

    fn current_priority(&self) -> Priority {
        self.priority.get()
    }

    fn run_with_priority(&self, priority: Priority, f: &mut dyn FnMut()) {
        let previous = self.priority.replace(priority);
        f();
        self.priority.set(previous);
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.microtasks.borrow_mut().push_back(task);
        self.request_frame();
    }
}

#[cfg(test)]
#[path = "tests/std_scheduler_tests.rs"]
mod tests;
