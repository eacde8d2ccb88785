//! Render phase driver: a depth-first begin/complete traversal of the
//! work-in-progress tree that can stop between units of work and resume
//! exactly where it left off.

use std::cell::RefCell;
use std::rc::Weak;

use crate::applier::Applier;
use crate::begin_work::{begin_work, UnitError};
use crate::complete_work::complete_work;
use crate::context::ContextStack;
use crate::error::{ReconcileError, Throw};
use crate::fiber::{create_work_in_progress, FiberArena, FiberId, Props};
use crate::flags::Flags;
use crate::lanes::Lanes;
use crate::platform::Scheduler;
use crate::root::RootOps;
use crate::unwind_work::{throw_suspended, unwind_work};
use crate::update_queue::Update;
use crate::view::View;

/// Where the last render pass of a root ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootExitStatus {
    InProgress,
    /// Yielded to the host; the work-in-progress pointer is kept.
    Incomplete,
    Completed,
    /// Suspended with no boundary to capture it.
    DidNotComplete,
}

/// Render state of one root. Borrowed mutably for the whole of a render
/// slice or a commit.
pub(crate) struct WorkState {
    pub arena: FiberArena,
    pub current: FiberId,
    pub wip_root: Option<FiberId>,
    pub wip: Option<FiberId>,
    pub render_lanes: Lanes,
    pub exit_status: RootExitStatus,
    pub contexts: ContextStack,
    /// Set when fibers may have been orphaned by discarded work.
    pub needs_sweep: bool,
}

impl WorkState {
    pub fn new() -> Self {
        let mut arena = FiberArena::new();
        let current = arena.alloc(crate::fiber::Fiber::host_root());
        Self {
            arena,
            current,
            wip_root: None,
            wip: None,
            render_lanes: Lanes::empty(),
            exit_status: RootExitStatus::InProgress,
            contexts: ContextStack::default(),
            needs_sweep: false,
        }
    }

    /// Drops the work-in-progress tree. Its fibers are reclaimed by the next
    /// sweep.
    pub fn discard_work_in_progress(&mut self) {
        if self.wip_root.take().is_some() {
            self.needs_sweep = true;
        }
        self.wip = None;
        self.render_lanes = Lanes::empty();
        self.exit_status = RootExitStatus::InProgress;
        self.contexts.clear();
    }
}

/// Everything a unit of work can reach besides the fiber tree.
pub(crate) struct RenderCx<'a> {
    pub work: &'a mut WorkState,
    pub sink: &'a Weak<dyn RootOps>,
    pub root_updates: &'a RefCell<Vec<Update<View>>>,
    pub applier: &'a RefCell<dyn Applier>,
    pub scheduler: &'a dyn Scheduler,
}

/// Starts a new pass at `lanes` from a fresh alternate of the current root.
pub(crate) fn prepare_fresh_stack(work: &mut WorkState, lanes: Lanes) {
    if work.wip_root.is_some() {
        log::debug!(
            "discarding work-in-progress at {:?} for {lanes:?}",
            work.render_lanes
        );
        work.needs_sweep = true;
    }
    work.contexts.clear();
    if work.needs_sweep {
        let released = work.arena.sweep(&[work.current]);
        log::trace!("sweep released {released} fibers");
        work.needs_sweep = false;
    }
    let root = create_work_in_progress(&mut work.arena, work.current, Props::None);
    work.arena[root].parent = None;
    work.wip_root = Some(root);
    work.wip = Some(root);
    work.render_lanes = lanes;
    work.exit_status = RootExitStatus::InProgress;
}

/// Performs units of work until the tree is exhausted or, when
/// `interruptible`, the host asks to yield.
pub(crate) fn work_loop(cx: &mut RenderCx<'_>, interruptible: bool) -> Result<(), ReconcileError> {
    while let Some(unit) = cx.work.wip {
        if interruptible && cx.scheduler.should_yield() {
            cx.work.exit_status = RootExitStatus::Incomplete;
            return Ok(());
        }
        perform_unit_of_work(cx, unit)?;
    }
    Ok(())
}

fn perform_unit_of_work(cx: &mut RenderCx<'_>, unit: FiberId) -> Result<(), ReconcileError> {
    match begin_work(cx, unit) {
        Ok(next) => {
            let fiber = &mut cx.work.arena[unit];
            fiber.memoized_props = fiber.pending_props.clone();
            match next {
                Some(next) => cx.work.wip = Some(next),
                None => complete_unit_of_work(cx, unit)?,
            }
            Ok(())
        }
        Err(UnitError::Throw(Throw::Suspended(suspended))) => {
            throw_suspended(cx, unit, suspended);
            complete_unit_of_work(cx, unit)
        }
        Err(UnitError::Throw(Throw::Error(error))) => {
            log::debug!("{unit:?} threw during render: {error}");
            Err(ReconcileError::Render(error))
        }
        Err(UnitError::Fatal(error)) => Err(error),
    }
}

/// Completes `unit` and its ancestors until one has an unvisited sibling.
/// Incomplete fibers are unwound instead; unwinding stops at a boundary that
/// captured, which is then rendered again with its fallback.
fn complete_unit_of_work(cx: &mut RenderCx<'_>, unit: FiberId) -> Result<(), ReconcileError> {
    let mut completed = unit;
    loop {
        let parent = cx.work.arena[completed].parent;

        if cx.work.arena[completed].flags.contains(Flags::INCOMPLETE) {
            if let Some(boundary) = unwind_work(cx, completed) {
                cx.work.arena[boundary].flags &= Flags::HOST_EFFECT_MASK | Flags::DID_CAPTURE;
                cx.work.wip = Some(boundary);
                return Ok(());
            }
            match parent {
                Some(parent) => {
                    let fiber = &mut cx.work.arena[parent];
                    fiber.flags |= Flags::INCOMPLETE;
                    fiber.subtree_flags = Flags::empty();
                    fiber.deletions.clear();
                    completed = parent;
                    continue;
                }
                None => {
                    cx.work.exit_status = RootExitStatus::DidNotComplete;
                    cx.work.wip = None;
                    return Ok(());
                }
            }
        }

        complete_work(cx, completed)?;

        if let Some(sibling) = cx.work.arena[completed].sibling {
            cx.work.wip = Some(sibling);
            return Ok(());
        }
        match parent {
            Some(parent) => completed = parent,
            None => {
                cx.work.exit_status = RootExitStatus::Completed;
                cx.work.wip = None;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/work_loop_tests.rs"]
mod tests;
