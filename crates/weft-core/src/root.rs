//! Root container: owns the fiber trees of one mounted view, decides which
//! lane to render next and drives render and commit through the host
//! scheduler.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::applier::{Applier, NodeId};
use crate::collections::map::HashSet;
use crate::commit_work::{commit_root, PendingPassive};
use crate::error::ReconcileError;
use crate::fiber::FiberId;
use crate::lane_context;
use crate::lanes::{Lanes, BLOCKING_LANES};
use crate::platform::{CallbackHandle, Priority, Scheduler, TaskStatus};
use crate::resource::Wakeable;
use crate::update_queue::Update;
use crate::view::View;
use crate::work_loop::{prepare_fresh_stack, work_loop, RenderCx, RootExitStatus, WorkState};

/// Engine-facing side of a root, reached through weak handles held by hook
/// dispatchers, ping listeners and the lane context.
pub(crate) trait RootOps {
    fn request_update_lane(&self) -> Lanes;

    /// `Some(true)` when neither copy of `fiber` has pending lanes. `None`
    /// when that cannot be determined right now.
    fn fiber_is_idle(&self, fiber: FiberId) -> Option<bool>;

    fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lanes);

    fn attach_ping(&self, wakeable: Rc<dyn Wakeable>, lanes: Lanes, boundary: Option<FiberId>);

    fn flush_sync_callbacks(&self);

    fn enqueue_render(&self, view: Rc<View>) -> Result<(), ReconcileError>;
}

/// How updates pick their lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootMode {
    /// Lanes follow the ambient scheduler priority and transition scopes;
    /// non-blocking lanes render in interruptible time slices.
    #[default]
    Concurrent,
    /// Every update is synchronous.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootOptions {
    pub mode: RootMode,
    /// Back-to-back synchronous commits caused by updates scheduled during
    /// commit, after which the root gives up with
    /// [`ReconcileError::NestedUpdateLimit`].
    pub nested_update_limit: usize,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            mode: RootMode::Concurrent,
            nested_update_limit: 50,
        }
    }
}

impl RootOptions {
    pub fn legacy() -> Self {
        Self {
            mode: RootMode::Legacy,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledCallback {
    handle: Option<CallbackHandle>,
    token: u64,
    lane: Lanes,
}

/// Tokens of synchronous render tasks, flushed from a microtask or from
/// [`lane_context::flush_sync`].
#[derive(Default)]
struct SyncQueue {
    tokens: RefCell<VecDeque<u64>>,
    flushing: Cell<bool>,
    microtask_scheduled: Cell<bool>,
}

/// Work that arrived while the render state was borrowed.
enum Deferred {
    Update { fiber: FiberId, lane: Lanes },
    RootUpdate { lane: Lanes },
    Ping { lanes: Lanes, boundary: Option<FiberId> },
}

enum WorkOutcome {
    Busy,
    Yielded,
    Committed,
    Suspended,
    Failed,
}

struct RootInner<A: Applier> {
    this: Weak<RootInner<A>>,
    sink: Weak<dyn RootOps>,
    options: RootOptions,
    container: NodeId,
    applier: RefCell<A>,
    scheduler: Rc<dyn Scheduler>,
    work: RefCell<WorkState>,
    root_updates: RefCell<Vec<Update<View>>>,

    pending_lanes: Cell<Lanes>,
    suspended_lanes: Cell<Lanes>,
    pinged_lanes: Cell<Lanes>,

    callback: Cell<Option<ScheduledCallback>>,
    next_token: Cell<u64>,
    sync_queue: SyncQueue,

    pending_passive: RefCell<PendingPassive>,
    passive_scheduled: Cell<bool>,

    deferred: RefCell<Vec<Deferred>>,
    ping_cache: RefCell<HashSet<(u64, u32, Option<FiberId>)>>,

    last_error: RefCell<Option<ReconcileError>>,
    poisoned: Cell<bool>,
    unmounted: Cell<bool>,
    nested_updates: Cell<usize>,
    commit_count: Cell<usize>,
}

impl<A: Applier> RootInner<A> {
    fn is_busy(&self) -> bool {
        self.work.try_borrow_mut().is_err()
    }

    fn is_current_token(&self, token: u64) -> bool {
        self.callback.get().map(|cb| cb.token) == Some(token)
    }

    /// Most urgent lane that is not blocked on a suspended resource, falling
    /// back to pinged lanes once everything pending is suspended.
    fn next_lanes(&self) -> Lanes {
        let pending = self.pending_lanes.get();
        let unblocked = pending - self.suspended_lanes.get();
        if !unblocked.is_empty() {
            return unblocked.highest_priority();
        }
        (pending & self.pinged_lanes.get()).highest_priority()
    }

    fn mark_root_updated(&self, lane: Lanes) {
        self.pending_lanes.set(self.pending_lanes.get() | lane);
        if lane != Lanes::IDLE {
            self.suspended_lanes.set(Lanes::empty());
            self.pinged_lanes.set(Lanes::empty());
        }
    }

    fn mark_root_suspended(&self, lanes: Lanes) {
        self.suspended_lanes.set(self.suspended_lanes.get() | lanes);
        self.pinged_lanes.set(self.pinged_lanes.get() - lanes);
    }

    fn mark_root_finished(&self, remaining: Lanes) {
        self.pending_lanes.set(remaining);
        self.suspended_lanes.set(self.suspended_lanes.get() & remaining);
        self.pinged_lanes.set(self.pinged_lanes.get() & remaining);
    }

    fn cancel_callback(&self) {
        if let Some(callback) = self.callback.take() {
            if let Some(handle) = callback.handle {
                log::debug!("cancel render callback {handle} for {:?}", callback.lane);
                self.scheduler.cancel_callback(handle);
            }
        }
    }

    /// Makes sure exactly one render task is queued for the most urgent
    /// pending lane. Idempotent per lane.
    fn ensure_root_scheduled(&self) {
        if self.poisoned.get() {
            self.cancel_callback();
            return;
        }
        let next = self.next_lanes();
        if next.is_empty() {
            self.cancel_callback();
            return;
        }
        if let Some(existing) = self.callback.get() {
            if existing.lane == next {
                return;
            }
        }
        self.cancel_callback();

        let token = self.next_token.get();
        self.next_token.set(token + 1);
        if next == Lanes::SYNC {
            log::debug!("schedule sync render (token {token})");
            self.sync_queue.tokens.borrow_mut().push_back(token);
            self.callback.set(Some(ScheduledCallback {
                handle: None,
                token,
                lane: next,
            }));
            lane_context::register_sync_root(self.sink.clone());
            self.schedule_sync_microtask();
        } else {
            let weak = self.this.clone();
            let priority = next.to_priority();
            let handle = self.scheduler.schedule_callback(
                priority,
                Box::new(move |did_timeout| match weak.upgrade() {
                    Some(root) => root.perform_concurrent_work_on_root(token, did_timeout),
                    None => TaskStatus::Done,
                }),
            );
            log::debug!("schedule {next:?} render as {handle} at {priority:?}");
            self.callback.set(Some(ScheduledCallback {
                handle: Some(handle),
                token,
                lane: next,
            }));
        }
    }

    fn schedule_sync_microtask(&self) {
        if self.sync_queue.microtask_scheduled.replace(true) {
            return;
        }
        let weak = self.this.clone();
        self.scheduler.schedule_microtask(Box::new(move || {
            if let Some(root) = weak.upgrade() {
                root.sync_queue.microtask_scheduled.set(false);
                root.flush_sync_queue();
            }
        }));
    }

    fn flush_sync_queue(&self) {
        if self.sync_queue.flushing.replace(true) {
            return;
        }
        loop {
            if self.is_busy() {
                self.schedule_sync_microtask();
                break;
            }
            let token = self.sync_queue.tokens.borrow_mut().pop_front();
            let Some(token) = token else {
                break;
            };
            self.perform_sync_work_on_root(token);
        }
        if self.sync_queue.tokens.borrow().is_empty() {
            lane_context::unregister_sync_root(&self.sink);
        }
        self.sync_queue.flushing.set(false);
    }

    fn perform_sync_work_on_root(&self, token: u64) {
        if !self.is_current_token(token) || self.poisoned.get() {
            return;
        }
        if self.flush_passive_effects() && !self.is_current_token(token) {
            return;
        }
        let lanes = self.next_lanes();
        if !lanes.contains(Lanes::SYNC) {
            self.callback.set(None);
            self.ensure_root_scheduled();
            return;
        }
        match self.perform_work(lanes, false) {
            WorkOutcome::Busy => {
                self.sync_queue.tokens.borrow_mut().push_front(token);
                self.schedule_sync_microtask();
            }
            WorkOutcome::Committed => self.check_nested_updates(),
            _ => self.nested_updates.set(0),
        }
    }

    fn check_nested_updates(&self) {
        if !self.pending_lanes.get().contains(Lanes::SYNC) {
            self.nested_updates.set(0);
            return;
        }
        let nested = self.nested_updates.get() + 1;
        let limit = self.options.nested_update_limit;
        if nested <= limit {
            self.nested_updates.set(nested);
            return;
        }
        let error = ReconcileError::NestedUpdateLimit { limit };
        log::error!("{error}");
        self.nested_updates.set(0);
        self.pending_lanes.set(self.pending_lanes.get() - Lanes::SYNC);
        *self.last_error.borrow_mut() = Some(error);
        self.ensure_root_scheduled();
    }

    fn perform_concurrent_work_on_root(&self, token: u64, did_timeout: bool) -> TaskStatus {
        if !self.is_current_token(token) || self.poisoned.get() {
            return TaskStatus::Done;
        }
        if self.flush_passive_effects() && !self.is_current_token(token) {
            return TaskStatus::Done;
        }
        let lanes = self.next_lanes();
        if lanes.is_empty() {
            self.callback.set(None);
            return TaskStatus::Done;
        }
        let interruptible = !lanes.includes_some(BLOCKING_LANES) && !did_timeout;
        match self.perform_work(lanes, interruptible) {
            WorkOutcome::Busy | WorkOutcome::Yielded if self.is_current_token(token) => {
                TaskStatus::Continue
            }
            _ => TaskStatus::Done,
        }
    }

    /// Renders `lanes` and commits when the pass finishes.
    fn perform_work(&self, lanes: Lanes, interruptible: bool) -> WorkOutcome {
        let result = {
            let Ok(mut work) = self.work.try_borrow_mut() else {
                return WorkOutcome::Busy;
            };
            self.render_root(&mut work, lanes, interruptible)
                .and_then(|status| match status {
                    RootExitStatus::Completed => self.commit(&mut work).map(|()| status),
                    other => Ok(other),
                })
                .inspect_err(|_| work.discard_work_in_progress())
        };

        let outcome = match result {
            Ok(RootExitStatus::InProgress | RootExitStatus::Incomplete) => WorkOutcome::Yielded,
            Ok(RootExitStatus::Completed) => WorkOutcome::Committed,
            Ok(RootExitStatus::DidNotComplete) => {
                log::debug!("render at {lanes:?} suspended outside any boundary");
                self.mark_root_suspended(lanes);
                self.callback.set(None);
                WorkOutcome::Suspended
            }
            Err(error) => {
                self.record_error(error, lanes);
                self.callback.set(None);
                WorkOutcome::Failed
            }
        };

        if matches!(outcome, WorkOutcome::Committed) {
            self.schedule_passive_flush();
        }
        self.drain_deferred();
        self.ensure_root_scheduled();
        outcome
    }

    fn render_root(
        &self,
        work: &mut WorkState,
        lanes: Lanes,
        interruptible: bool,
    ) -> Result<RootExitStatus, ReconcileError> {
        if work.wip_root.is_none() || work.render_lanes != lanes {
            prepare_fresh_stack(work, lanes);
        }
        log::trace!("render {lanes:?} (interruptible: {interruptible})");
        let mut cx = RenderCx {
            work: &mut *work,
            sink: &self.sink,
            root_updates: &self.root_updates,
            applier: &self.applier,
            scheduler: &*self.scheduler,
        };
        work_loop(&mut cx, interruptible)?;
        let status = match work.wip {
            Some(_) => RootExitStatus::Incomplete,
            None => work.exit_status,
        };
        log::debug!("render {lanes:?} exited {status:?}");
        if status == RootExitStatus::DidNotComplete {
            work.discard_work_in_progress();
        }
        Ok(status)
    }

    fn commit(&self, work: &mut WorkState) -> Result<(), ReconcileError> {
        let outcome = commit_root(work, &self.applier, self.container)?;
        self.callback.set(None);
        self.mark_root_finished(outcome.remaining_lanes);
        self.commit_count.set(self.commit_count.get() + 1);
        log::debug!(
            "committed {} host mutations; remaining {:?}",
            outcome.mutations,
            outcome.remaining_lanes
        );
        if !outcome.passive.is_empty() {
            self.pending_passive.borrow_mut().append(outcome.passive);
        }
        Ok(())
    }

    fn record_error(&self, error: ReconcileError, lanes: Lanes) {
        if error.is_fatal() {
            log::error!("root poisoned: {error}");
            self.poisoned.set(true);
            self.cancel_callback();
        } else {
            log::error!("render at {lanes:?} failed: {error}");
            self.pending_lanes.set(self.pending_lanes.get() - lanes);
        }
        *self.last_error.borrow_mut() = Some(error);
    }

    fn schedule_passive_flush(&self) {
        if self.pending_passive.borrow().is_empty() || self.passive_scheduled.replace(true) {
            return;
        }
        let weak = self.this.clone();
        self.scheduler.schedule_callback(
            Priority::Normal,
            Box::new(move |_| {
                if let Some(root) = weak.upgrade() {
                    root.passive_scheduled.set(false);
                    root.flush_passive_effects();
                }
                TaskStatus::Done
            }),
        );
    }

    /// Runs queued passive effects: every cleanup first, then every create.
    /// Returns whether anything ran.
    fn flush_passive_effects(&self) -> bool {
        let pending = std::mem::take(&mut *self.pending_passive.borrow_mut());
        if pending.is_empty() {
            return false;
        }
        log::trace!(
            "flush passive effects: {} unmounted, {} updated",
            pending.unmount.len(),
            pending.update.len()
        );
        for effect in &pending.unmount {
            effect.run_destroy();
        }
        for effect in &pending.update {
            effect.run_destroy();
        }
        for effect in &pending.update {
            effect.run_create();
        }
        self.flush_sync_queue();
        true
    }

    fn drain_deferred(&self) {
        loop {
            let batch = std::mem::take(&mut *self.deferred.borrow_mut());
            if batch.is_empty() {
                return;
            }
            for item in batch {
                match item {
                    Deferred::Update { fiber, lane } => self.schedule_update_on_fiber(fiber, lane),
                    Deferred::RootUpdate { lane } => self.schedule_root_update(lane),
                    Deferred::Ping { lanes, boundary } => self.ping(lanes, boundary),
                }
            }
        }
    }

    fn schedule_root_update(&self, lane: Lanes) {
        let Ok(mut work) = self.work.try_borrow_mut() else {
            self.deferred.borrow_mut().push(Deferred::RootUpdate { lane });
            return;
        };
        let current = work.current;
        work.arena.mark_update_lane_to_root(current, lane);
        drop(work);
        self.mark_root_updated(lane);
        self.ensure_root_scheduled();
    }

    fn ping(&self, lanes: Lanes, boundary: Option<FiberId>) {
        let Ok(mut work) = self.work.try_borrow_mut() else {
            self.deferred.borrow_mut().push(Deferred::Ping { lanes, boundary });
            return;
        };
        let retried = boundary.and_then(|boundary| work.arena.mark_update_lane_to_root(boundary, lanes));
        drop(work);
        log::debug!("ping {lanes:?} (boundary {boundary:?})");
        self.pinged_lanes
            .set(self.pinged_lanes.get() | (self.suspended_lanes.get() & lanes));
        if retried.is_some() {
            self.mark_root_updated(lanes);
        }
        self.ensure_root_scheduled();
    }
}

impl<A: Applier> RootOps for RootInner<A> {
    fn request_update_lane(&self) -> Lanes {
        match self.options.mode {
            RootMode::Legacy => Lanes::SYNC,
            RootMode::Concurrent => lane_context::current_override()
                .unwrap_or_else(|| Lanes::from_priority(self.scheduler.current_priority())),
        }
    }

    fn fiber_is_idle(&self, fiber: FiberId) -> Option<bool> {
        let work = self.work.try_borrow().ok()?;
        let node = work.arena.get(fiber)?;
        let alternate_idle = node
            .alternate
            .and_then(|alternate| work.arena.get(alternate))
            .map_or(true, |alternate| alternate.lanes.is_empty());
        Some(node.lanes.is_empty() && alternate_idle)
    }

    fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lanes) {
        if self.poisoned.get() {
            log::warn!("update on {fiber:?} ignored: root is poisoned");
            return;
        }
        let Ok(mut work) = self.work.try_borrow_mut() else {
            self.deferred.borrow_mut().push(Deferred::Update { fiber, lane });
            return;
        };
        let root = work.arena.mark_update_lane_to_root(fiber, lane);
        drop(work);
        if root.is_none() {
            log::warn!("update on unmounted component {fiber:?} ignored");
            return;
        }
        log::trace!("update {lane:?} on {fiber:?}");
        self.mark_root_updated(lane);
        self.ensure_root_scheduled();
    }

    fn attach_ping(&self, wakeable: Rc<dyn Wakeable>, lanes: Lanes, boundary: Option<FiberId>) {
        let key = (wakeable.wakeable_id(), lanes.bits(), boundary);
        if !self.ping_cache.borrow_mut().insert(key) {
            return;
        }
        let weak = self.this.clone();
        wakeable.on_settle(Box::new(move || match weak.upgrade() {
            Some(root) => {
                root.ping_cache.borrow_mut().remove(&key);
                root.ping(lanes, boundary);
            }
            None => log::warn!("ping for a dropped root ignored"),
        }));
    }

    fn flush_sync_callbacks(&self) {
        self.flush_sync_queue();
    }

    fn enqueue_render(&self, view: Rc<View>) -> Result<(), ReconcileError> {
        if self.poisoned.get() {
            return Err(ReconcileError::RootPoisoned);
        }
        if self.unmounted.get() {
            return Err(ReconcileError::RootUnmounted);
        }
        let lane = match self.options.mode {
            RootMode::Legacy => Lanes::SYNC,
            RootMode::Concurrent => lane_context::current_override().unwrap_or(Lanes::SYNC),
        };
        self.root_updates.borrow_mut().push(Update {
            lane,
            action: view,
        });
        self.schedule_root_update(lane);
        Ok(())
    }
}

/// A mounted view tree rendering into one host container.
///
/// `Root` is a cheap handle; clones share the same trees.
pub struct Root<A: Applier> {
    inner: Rc<RootInner<A>>,
}

impl<A: Applier> Clone for Root<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Applier> Root<A> {
    /// Creates a root that renders into `container`, a node owned by
    /// `applier`.
    pub fn new(container: NodeId, applier: A, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_options(container, applier, scheduler, RootOptions::default())
    }

    pub fn with_options(
        container: NodeId,
        applier: A,
        scheduler: Rc<dyn Scheduler>,
        options: RootOptions,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<RootInner<A>>| {
            let sink: Weak<dyn RootOps> = this.clone();
            RootInner {
                this: this.clone(),
                sink,
                options,
                container,
                applier: RefCell::new(applier),
                scheduler,
                work: RefCell::new(WorkState::new()),
                root_updates: RefCell::new(Vec::new()),
                pending_lanes: Cell::new(Lanes::empty()),
                suspended_lanes: Cell::new(Lanes::empty()),
                pinged_lanes: Cell::new(Lanes::empty()),
                callback: Cell::new(None),
                next_token: Cell::new(1),
                sync_queue: SyncQueue::default(),
                pending_passive: RefCell::new(PendingPassive::default()),
                passive_scheduled: Cell::new(false),
                deferred: RefCell::new(Vec::new()),
                ping_cache: RefCell::new(HashSet::default()),
                last_error: RefCell::new(None),
                poisoned: Cell::new(false),
                unmounted: Cell::new(false),
                nested_updates: Cell::new(0),
                commit_count: Cell::new(0),
            }
        });
        Self { inner }
    }

    /// Queues `view` as the new content of the root. The update is
    /// synchronous unless issued inside a transition and is rendered from a
    /// microtask or the next [`flush_sync_work`](Self::flush_sync_work).
    pub fn render(&self, view: impl Into<View>) -> Result<(), ReconcileError> {
        self.inner.enqueue_render(Rc::new(view.into()))
    }

    /// Tears the whole tree down through the deletion path, runs every
    /// remaining cleanup and refuses further renders.
    pub fn unmount(&self) -> Result<(), ReconcileError> {
        self.inner.enqueue_render(Rc::new(View::Empty))?;
        self.inner.unmounted.set(true);
        if !self.inner.is_busy() {
            self.inner.flush_sync_queue();
            self.inner.flush_passive_effects();
        }
        match self.inner.last_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Renders and commits every queued synchronous update now.
    pub fn flush_sync_work(&self) -> Result<(), ReconcileError> {
        self.inner.flush_sync_queue();
        match self.take_error() {
            Some(error) => Err(error),
            None if self.inner.poisoned.get() => Err(ReconcileError::RootPoisoned),
            None => Ok(()),
        }
    }

    /// Runs pending passive effects without waiting for their scheduled
    /// task. Returns whether any ran.
    pub fn flush_passive_effects(&self) -> bool {
        self.inner.flush_passive_effects()
    }

    /// Error produced by the last scheduler-driven render or commit.
    pub fn take_error(&self) -> Option<ReconcileError> {
        self.inner.last_error.borrow_mut().take()
    }

    pub fn with_applier<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.applier.borrow_mut())
    }

    pub fn handle(&self) -> RootHandle {
        RootHandle {
            inner: self.inner.sink.clone(),
        }
    }

    pub fn container(&self) -> NodeId {
        self.inner.container
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.inner.pending_lanes.get()
    }

    pub fn is_poisoned(&self) -> bool {
        self.inner.poisoned.get()
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.unmounted.get()
    }

    /// Number of commits so far.
    pub fn commit_count(&self) -> usize {
        self.inner.commit_count.get()
    }

    /// Live fiber slots, both trees included.
    pub fn fiber_count(&self) -> usize {
        self.inner.work.borrow().arena.live()
    }
}

/// Weak handle to a root, safe to hold from callbacks that may outlive it.
#[derive(Clone)]
pub struct RootHandle {
    inner: Weak<dyn RootOps>,
}

impl RootHandle {
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// See [`Root::render`]. Fails with [`ReconcileError::RootUnmounted`]
    /// once the root has been dropped.
    pub fn render(&self, view: impl Into<View>) -> Result<(), ReconcileError> {
        match self.inner.upgrade() {
            Some(root) => root.enqueue_render(Rc::new(view.into())),
            None => Err(ReconcileError::RootUnmounted),
        }
    }

    pub fn flush_sync(&self) {
        if let Some(root) = self.inner.upgrade() {
            root.flush_sync_callbacks();
        }
    }
}

#[cfg(test)]
#[path = "tests/root_tests.rs"]
mod tests;
