//! Ambient update-lane overrides.
//!
//! Updates pick their lane from the innermost active scope: a transition
//! scope tags them with [`Lanes::TRANSITION`], a `flush_sync` scope with
//! [`Lanes::SYNC`]. Outside any scope the root falls back to the host
//! scheduler's current priority.

use std::cell::RefCell;
use std::rc::Weak;

use crate::lanes::Lanes;
use crate::root::RootOps;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LaneScope {
    Transition,
    Lane(Lanes),
}

// Thread-local stack of lane scopes plus the roots with queued sync work.
thread_local! {
    static LANE_STACK: RefCell<Vec<LaneScope>> = const { RefCell::new(Vec::new()) };
    static SYNC_ROOTS: RefCell<Vec<Weak<dyn RootOps>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the lane stack on drop.
#[must_use = "LaneScopeGuard pops the lane stack on drop"]
pub struct LaneScopeGuard;

impl Drop for LaneScopeGuard {
    fn drop(&mut self) {
        LANE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn enter(scope: LaneScope) -> LaneScopeGuard {
    LANE_STACK.with(|stack| stack.borrow_mut().push(scope));
    LaneScopeGuard
}

/// Tags every update dispatched until the guard drops with `lane`.
pub fn enter_lane(lane: Lanes) -> LaneScopeGuard {
    enter(LaneScope::Lane(lane.highest_priority()))
}

/// Lane forced by the innermost active scope, if any.
pub fn current_override() -> Option<Lanes> {
    LANE_STACK.with(|stack| {
        stack.borrow().last().map(|scope| match scope {
            LaneScope::Transition => Lanes::TRANSITION,
            LaneScope::Lane(lane) => *lane,
        })
    })
}

pub fn is_in_transition() -> bool {
    current_override() == Some(Lanes::TRANSITION)
}

/// Runs `f` so that every update it dispatches is a transition: it renders
/// in the time-sliced [`Lanes::TRANSITION`] lane and is interrupted by any
/// more urgent update.
pub fn start_transition<R>(f: impl FnOnce() -> R) -> R {
    let _guard = enter(LaneScope::Transition);
    f()
}

/// Runs `f` with synchronous update priority, then renders and commits every
/// root that received synchronous work before returning.
pub fn flush_sync<R>(f: impl FnOnce() -> R) -> R {
    let result = {
        let _guard = enter(LaneScope::Lane(Lanes::SYNC));
        f()
    };
    flush_sync_roots();
    result
}

/// Registers `root` for the next `flush_sync`, dropping entries of roots
/// that no longer exist.
pub(crate) fn register_sync_root(root: Weak<dyn RootOps>) {
    SYNC_ROOTS.with(|roots| {
        let mut roots = roots.borrow_mut();
        roots.retain(|existing| existing.strong_count() > 0);
        if !roots.iter().any(|existing| Weak::ptr_eq(existing, &root)) {
            roots.push(root);
        }
    });
}

/// Forgets `root` once its sync queue has drained.
pub(crate) fn unregister_sync_root(root: &Weak<dyn RootOps>) {
    SYNC_ROOTS.with(|roots| {
        roots
            .borrow_mut()
            .retain(|existing| existing.strong_count() > 0 && !Weak::ptr_eq(existing, root));
    });
}

#[cfg(test)]
pub(crate) fn registered_sync_roots() -> usize {
    SYNC_ROOTS.with(|roots| roots.borrow().len())
}

/// Flushes the synchronous queue of every registered root.
pub fn flush_sync_roots() {
    let roots = SYNC_ROOTS.with(|roots| std::mem::take(&mut *roots.borrow_mut()));
    for root in roots {
        if let Some(root) = root.upgrade() {
            root.flush_sync_callbacks();
        }
    }
}

#[cfg(test)]
#[path = "tests/lane_context_tests.rs"]
mod tests;
