use std::rc::Rc;
use std::time::Duration;

use weft_core::{
    HostOp, MemoryApplier, NodeId, ReconcileError, Root, RootOptions, Scheduler, View,
};
use weft_runtime_std::StdScheduler;

/// Yield checks per slice when no budget is given; large enough that a
/// render never yields unless a test asks for it.
pub const DEFAULT_UNITS: usize = 1 << 20;

const MAX_PUMP_STEPS: usize = 10_000;

/// Headless harness for exercising a root in tests.
///
/// `ReconcileTestRule` owns a [`Root`] rendering into a [`MemoryApplier`]
/// container and a deterministic [`StdScheduler`], so renders, time slices
/// and passive effects are driven explicitly from the test body.
pub struct ReconcileTestRule {
    root: Root<MemoryApplier>,
    scheduler: Rc<StdScheduler>,
    content: Option<Box<dyn Fn() -> View>>, // Stored user content for reuse across renders.
}

impl ReconcileTestRule {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_UNITS)
    }

    /// Rule whose scheduler yields after `units` units of work per slice.
    pub fn with_budget(units: usize) -> Self {
        Self::with_options(RootOptions::default(), units)
    }

    pub fn with_options(options: RootOptions, units: usize) -> Self {
        let scheduler = Rc::new(StdScheduler::deterministic(units));
        let mut applier = MemoryApplier::new();
        let container = applier.create_container();
        let host: Rc<dyn Scheduler> = scheduler.clone();
        Self {
            root: Root::with_options(container, applier, host, options),
            scheduler,
            content: None,
        }
    }

    /// Install `content` as the root view and render it synchronously.
    pub fn set_content(&mut self, content: impl Fn() -> View + 'static) -> Result<(), ReconcileError> {
        self.content = Some(Box::new(content));
        self.rerender()
    }

    /// Render the installed content again.
    pub fn rerender(&mut self) -> Result<(), ReconcileError> {
        match &self.content {
            Some(content) => {
                let view = content();
                self.render(view)
            }
            None => Ok(()),
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Queue `view` as the root's content and flush synchronous work.
    /// Passive effects stay queued until the scheduler runs.
    pub fn render(&self, view: impl Into<View>) -> Result<(), ReconcileError> {
        self.root.render(view)?;
        self.root.flush_sync_work()
    }

    /// Run `f`, then drain every queued task, microtask and passive effect.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReconcileError> {
        let result = f();
        self.pump_until_idle()?;
        Ok(result)
    }

    /// Drive the scheduler until no task or microtask is left.
    pub fn pump_until_idle(&self) -> Result<(), ReconcileError> {
        let mut steps = 0;
        while self.scheduler.run_next_task() {
            steps += 1;
            if steps > MAX_PUMP_STEPS {
                panic!("pump_until_idle looped too many times!");
            }
        }
        self.scheduler.flush_microtasks();
        match self.root.take_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Run one scheduler task for one time slice. Returns whether a task ran.
    pub fn step(&self) -> bool {
        self.scheduler.run_next_task()
    }

    pub fn flush_microtasks(&self) {
        self.scheduler.flush_microtasks();
    }

    pub fn flush_passive_effects(&self) -> bool {
        self.root.flush_passive_effects()
    }

    pub fn advance_time(&self, by: Duration) {
        self.scheduler.advance_time(by);
    }

    /// Host calls recorded so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.root.with_applier(|applier| applier.ops().to_vec())
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.root.with_applier(MemoryApplier::take_ops)
    }

    pub fn clear_ops(&self) {
        self.root.with_applier(MemoryApplier::clear_ops);
    }

    /// Recorded commit-phase mutations, excluding instance creation.
    pub fn mutations(&self) -> Vec<HostOp> {
        self.root.with_applier(|applier| {
            applier
                .ops()
                .iter()
                .filter(|op| op.is_mutation())
                .cloned()
                .collect()
        })
    }

    /// Dump the container's node tree as text for debugging
    pub fn dump_tree(&self) -> String {
        let container = self.root.container();
        self.root.with_applier(|applier| applier.dump_tree(Some(container)))
    }

    /// Visible text below the container, in document order.
    pub fn text_content(&self) -> String {
        let container = self.root.container();
        self.root.with_applier(|applier| applier.text_content(container))
    }

    pub fn container(&self) -> NodeId {
        self.root.container()
    }

    pub fn root(&self) -> &Root<MemoryApplier> {
        &self.root
    }

    pub fn scheduler(&self) -> &Rc<StdScheduler> {
        &self.scheduler
    }

    pub fn with_applier<R>(&self, f: impl FnOnce(&mut MemoryApplier) -> R) -> R {
        self.root.with_applier(f)
    }
}

impl Default for ReconcileTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `ReconcileTestRule`.
pub fn run_test_root<R>(f: impl FnOnce(&mut ReconcileTestRule) -> R) -> R {
    let mut rule = ReconcileTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod reconcile_tests;
