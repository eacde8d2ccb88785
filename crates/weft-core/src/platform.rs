//! Platform abstraction traits for host scheduling services.
//!
//! The engine never owns an event loop. It hands render-and-commit work to a
//! host [`Scheduler`], asks it whether to yield between units of work, and
//! queues microtasks for synchronous flushes.

use std::fmt;

/// Host scheduler priority levels, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Immediate,
    UserBlocking,
    #[default]
    Normal,
    Low,
    Idle,
}

/// Opaque handle for a callback queued on a host [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(pub u64);

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a scheduled callback asks the host to do after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The callback finished and can be dropped.
    Done,
    /// The callback yielded; invoke it again under the same handle.
    Continue,
}

/// Callback handed to [`Scheduler::schedule_callback`]. The argument reports
/// whether the task's expiration time has already passed.
pub type SchedulerCallback = Box<dyn FnMut(bool) -> TaskStatus>;

/// Cooperative single-threaded host scheduler.
///
/// Implementations keep callbacks ordered by priority, give the running
/// callback a time slice observed through [`should_yield`](Self::should_yield),
/// and drain microtasks after each task.
pub trait Scheduler {
    fn schedule_callback(&self, priority: Priority, callback: SchedulerCallback) -> CallbackHandle;

    /// Cancelling an unknown or already-finished handle is a no-op.
    fn cancel_callback(&self, handle: CallbackHandle);

    fn should_yield(&self) -> bool;

    fn current_priority(&self) -> Priority;

    /// Runs `f` with `priority` as the ambient priority, restoring the previous
    /// one afterwards.
    fn run_with_priority(&self, priority: Priority, f: &mut dyn FnMut());

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>);
}

#[cfg(test)]
pub(crate) use test_support::TestScheduler;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Minimal FIFO scheduler for unit tests: callbacks run in insertion order
    /// per priority and `should_yield` follows a fixed unit budget.
    #[derive(Default)]
    pub struct TestScheduler {
        next_id: Cell<u64>,
        tasks: RefCell<Vec<(CallbackHandle, Priority, Option<SchedulerCallback>)>>,
        microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
        priority: Cell<Priority>,
        budget: Cell<Option<usize>>,
        used: Cell<usize>,
    }

    impl TestScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Yield after `units` calls to `should_yield` per task run.
        pub fn set_budget(&self, units: Option<usize>) {
            self.budget.set(units);
        }

        pub fn pending_tasks(&self) -> usize {
            self.tasks.borrow().len()
        }

        pub fn flush_microtasks(&self) {
            loop {
                let task = self.microtasks.borrow_mut().pop_front();
                match task {
                    Some(task) => task(),
                    None => break,
                }
            }
        }

        /// Runs the most urgent queued callback once. Returns false when idle.
        pub fn run_next(&self) -> bool {
            self.flush_microtasks();
            let next = {
                let tasks = self.tasks.borrow();
                tasks
                    .iter()
                    .enumerate()
                    .min_by_key(|(index, (_, priority, _))| (*priority, *index))
                    .map(|(index, _)| index)
            };
            let Some(index) = next else {
                return false;
            };
            let (handle, priority, callback) = {
                let mut tasks = self.tasks.borrow_mut();
                let entry = &mut tasks[index];
                (entry.0, entry.1, entry.2.take())
            };
            let Some(mut callback) = callback else {
                return true;
            };
            self.used.set(0);
            let previous = self.priority.replace(priority);
            let status = callback(false);
            self.priority.set(previous);
            let mut tasks = self.tasks.borrow_mut();
            if let Some(position) = tasks.iter().position(|(id, _, _)| *id == handle) {
                if status == TaskStatus::Continue {
                    tasks[position].2 = Some(callback);
                } else {
                    tasks.remove(position);
                }
            }
            drop(tasks);
            self.flush_microtasks();
            true
        }

        pub fn run_until_idle(&self) {
            let mut guard = 0;
            while self.run_next() {
                guard += 1;
                assert!(guard < 10_000, "TestScheduler looped too many times");
            }
        }
    }

    impl Scheduler for TestScheduler {
        fn schedule_callback(
            &self,
            priority: Priority,
            callback: SchedulerCallback,
        ) -> CallbackHandle {
            let handle = CallbackHandle(self.next_id.get());
            self.next_id.set(handle.0 + 1);
            self.tasks
                .borrow_mut()
                .push((handle, priority, Some(callback)));
            handle
        }

        fn cancel_callback(&self, handle: CallbackHandle) {
            self.tasks.borrow_mut().retain(|(id, _, _)| *id != handle);
        }

        fn should_yield(&self) -> bool {
            match self.budget.get() {
                Some(units) => {
                    let used = self.used.get();
                    self.used.set(used + 1);
                    used >= units
                }
                None => false,
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
        }
    }
}
