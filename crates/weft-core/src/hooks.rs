//! Hook state machine.
//!
//! Each render of a function component walks its hook records in call order.
//! Records from the committed fiber are read, and a fresh list is written for
//! the work-in-progress fiber, so a discarded render never disturbs committed
//! hook state. The one exception is the update mailbox: pending updates are
//! moved into the base queue of *both* copies so an interrupted render cannot
//! lose them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::context::{Context, ContextId, ContextStack};
use crate::error::{ConsistencyError, Throw};
use crate::fiber::FiberId;
use crate::flags::{Flags, HookFlags};
use crate::hook_ref::HookRef;
use crate::lane_context;
use crate::lanes::Lanes;
use crate::resource::Resource;
use crate::root::RootOps;
use crate::update_queue::{QueueState, Update};

type Reducer<S, A> = Rc<dyn Fn(&S, &A) -> S>;

/// One persisted hook slot.
#[derive(Clone)]
pub(crate) enum HookRecord {
    State(Rc<dyn Any>),
    Effect(Rc<Effect>),
    Memo {
        value: Rc<dyn Any>,
        deps: Rc<dyn Any>,
    },
    Ref(Rc<dyn Any>),
}

impl HookRecord {
    fn kind(&self) -> &'static str {
        match self {
            HookRecord::State(_) => "state",
            HookRecord::Effect(_) => "effect",
            HookRecord::Memo { .. } => "memo",
            HookRecord::Ref(_) => "ref",
        }
    }
}

impl fmt::Debug for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Hook records of a committed or in-progress function component fiber.
#[derive(Clone, Default)]
pub(crate) struct ComponentState {
    pub hooks: Vec<HookRecord>,
}

impl ComponentState {
    pub fn effects(&self) -> impl Iterator<Item = &Rc<Effect>> + '_ {
        self.hooks.iter().filter_map(|record| match record {
            HookRecord::Effect(effect) => Some(effect),
            _ => None,
        })
    }
}

/// Cleanup slot shared by every render's record of one effect call site.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Box<dyn FnOnce()>>>,
}

type EffectCreate = Box<dyn FnOnce(EffectScope) -> EffectResult>;

pub(crate) struct Effect {
    pub tag: HookFlags,
    create: RefCell<Option<EffectCreate>>,
    inst: Rc<EffectInstance>,
    deps: Option<Rc<dyn Any>>,
}

impl Effect {
    pub fn has_effect(&self) -> bool {
        self.tag.contains(HookFlags::HAS_EFFECT)
    }

    pub fn is_layout(&self) -> bool {
        self.tag.contains(HookFlags::LAYOUT)
    }

    pub fn is_passive(&self) -> bool {
        self.tag.contains(HookFlags::PASSIVE)
    }

    pub fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let cleanup = create(EffectScope).into_cleanup();
            *self.inst.destroy.borrow_mut() = cleanup;
        }
    }

    pub fn run_destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
}

/// Handed to effect callbacks to register a cleanup.
#[derive(Clone, Copy, Debug, Default)]
pub struct EffectScope;

impl EffectScope {
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> EffectResult {
        EffectResult::new(cleanup)
    }
}

/// What an effect callback leaves behind: an optional cleanup run before the
/// next create of the same effect and when the component unmounts.
#[derive(Default)]
pub struct EffectResult {
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl EffectResult {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    fn into_cleanup(self) -> Option<Box<dyn FnOnce()>> {
        self.cleanup
    }
}

/// Update mailbox shared by both copies of a state hook.
pub(crate) struct HookQueue<S, A> {
    pending: RefCell<Vec<Update<A>>>,
    fiber: Cell<FiberId>,
    sink: Weak<dyn RootOps>,
    /// Reducer and state of the last render, used to drop no-op updates
    /// without scheduling. Only set for `use_state`.
    eager: RefCell<Option<(Reducer<S, A>, S)>>,
}

impl<S, A> HookQueue<S, A> {
    fn new(fiber: FiberId, sink: Weak<dyn RootOps>) -> Self {
        Self {
            pending: RefCell::new(Vec::new()),
            fiber: Cell::new(fiber),
            sink,
            eager: RefCell::new(None),
        }
    }

    fn take_pending(&self) -> Vec<Update<A>> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }
}

pub(crate) trait DispatchQueue<A> {
    fn enqueue(&self, action: A);
}

impl<S, A> DispatchQueue<A> for HookQueue<S, A>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    fn enqueue(&self, action: A) {
        let Some(sink) = self.sink.upgrade() else {
            log::warn!("update dispatched after its root was dropped");
            return;
        };
        let fiber = self.fiber.get();
        let lane = sink.request_update_lane();

        if self.pending.borrow().is_empty() && sink.fiber_is_idle(fiber) == Some(true) {
            let eager = self.eager.borrow().clone();
            if let Some((reducer, last)) = eager {
                if reducer(&last, &action) == last {
                    log::trace!("eager bailout on {fiber:?}");
                    return;
                }
            }
        }

        self.pending.borrow_mut().push(Update {
            lane,
            action: Rc::new(action),
        });
        sink.schedule_update_on_fiber(fiber, lane);
    }
}

/// Dispatcher returned by [`Hooks::use_reducer`]. Stable across renders.
pub struct Dispatch<A> {
    queue: Rc<dyn DispatchQueue<A>>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<A> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        self.queue.enqueue(action);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch")
    }
}

/// Action of the basic state reducer.
pub enum StateAction<S> {
    Set(S),
    Update(Box<dyn Fn(&S) -> S>),
}

fn basic_state_reducer<S: Clone>(state: &S, action: &StateAction<S>) -> S {
    match action {
        StateAction::Set(value) => value.clone(),
        StateAction::Update(f) => f(state),
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct SetState<S> {
    dispatch: Dispatch<StateAction<S>>,
}

impl<S> Clone for SetState<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<S: 'static> SetState<S> {
    pub fn set(&self, value: S) {
        self.dispatch.dispatch(StateAction::Set(value));
    }

    /// Queues `f` to compute the next state from the previous one. The
    /// function may run more than once when updates are rebased.
    pub fn update(&self, f: impl Fn(&S) -> S + 'static) {
        self.dispatch.dispatch(StateAction::Update(Box::new(f)));
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.dispatch.ptr_eq(&other.dispatch)
    }
}

impl<S> fmt::Debug for SetState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetState")
    }
}

/// Starts a transition and tracks whether it is still pending.
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
}

impl StartTransition {
    /// Marks the transition pending at the current priority, then runs `f`
    /// inside a transition scope.
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        lane_context::start_transition(|| {
            self.set_pending.set(false);
            f();
        });
    }
}

struct StateHook<S, A> {
    state: QueueState<S, A>,
    queue: Rc<HookQueue<S, A>>,
}

pub(crate) struct HookInput<'a> {
    pub fiber: FiberId,
    pub component: &'static str,
    pub render_lanes: Lanes,
    pub sink: Weak<dyn RootOps>,
    pub contexts: &'a ContextStack,
    pub previous: Option<Vec<HookRecord>>,
}

/// Everything a render recorded, applied to the fibers by the begin phase.
pub(crate) struct RenderedHooks {
    pub hooks: Vec<HookRecord>,
    pub fiber_flags: Flags,
    pub skipped_lanes: Lanes,
    pub did_receive_update: bool,
    pub contexts: SmallVec<[ContextId; 2]>,
    pub current_rewrites: Vec<(usize, HookRecord)>,
    pub error: Option<ConsistencyError>,
}

/// Render context handed to every function component.
pub struct Hooks<'a> {
    fiber: FiberId,
    component: &'static str,
    render_lanes: Lanes,
    sink: Weak<dyn RootOps>,
    contexts: &'a ContextStack,
    previous: Option<Vec<HookRecord>>,
    hooks: Vec<HookRecord>,
    cursor: usize,
    fiber_flags: Flags,
    skipped_lanes: Lanes,
    did_receive_update: bool,
    dependencies: SmallVec<[ContextId; 2]>,
    current_rewrites: Vec<(usize, HookRecord)>,
    error: Option<ConsistencyError>,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(input: HookInput<'a>) -> Self {
        let capacity = input.previous.as_ref().map_or(0, Vec::len);
        Self {
            fiber: input.fiber,
            component: input.component,
            render_lanes: input.render_lanes,
            sink: input.sink,
            contexts: input.contexts,
            previous: input.previous,
            hooks: Vec::with_capacity(capacity),
            cursor: 0,
            fiber_flags: Flags::empty(),
            skipped_lanes: Lanes::empty(),
            did_receive_update: false,
            dependencies: SmallVec::new(),
            current_rewrites: Vec::new(),
            error: None,
        }
    }

    /// True on the first render of this component instance.
    pub fn is_mount(&self) -> bool {
        self.previous.is_none()
    }

    /// Lanes being rendered.
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    pub(crate) fn finish(mut self, completed: bool) -> RenderedHooks {
        if completed && self.error.is_none() {
            if let Some(previous) = &self.previous {
                if previous.len() != self.cursor {
                    self.error = Some(ConsistencyError::HookCountMismatch {
                        component: self.component,
                        expected: previous.len(),
                        rendered: self.cursor,
                    });
                }
            }
        }
        RenderedHooks {
            hooks: self.hooks,
            fiber_flags: self.fiber_flags,
            skipped_lanes: self.skipped_lanes,
            did_receive_update: self.did_receive_update,
            contexts: self.dependencies,
            current_rewrites: self.current_rewrites,
            error: self.error,
        }
    }

    fn next_index(&mut self) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        index
    }

    fn previous_at(&self, index: usize) -> Option<&HookRecord> {
        self.previous.as_ref().and_then(|records| records.get(index))
    }

    fn kind_mismatch(&mut self, index: usize) {
        log::error!("{} changed the kind of hook #{index}", self.component);
        if self.error.is_none() {
            self.error = Some(ConsistencyError::HookKindMismatch {
                component: self.component,
                index,
            });
        }
    }

    fn state_hook<S, A>(
        &mut self,
        reducer: Reducer<S, A>,
        init: impl FnOnce() -> S,
        eager: bool,
    ) -> (S, Rc<HookQueue<S, A>>)
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        let index = self.next_index();
        let previous = match self.previous_at(index) {
            Some(HookRecord::State(record)) => Rc::clone(record).downcast::<StateHook<S, A>>().ok(),
            _ => None,
        };
        if previous.is_none() && self.previous_at(index).is_some() {
            self.kind_mismatch(index);
        }

        let hook = match previous {
            Some(previous) => {
                let queue = Rc::clone(&previous.queue);
                queue.fiber.set(self.fiber);
                let pending = queue.take_pending();
                let merged = if pending.is_empty() {
                    previous.state.clone()
                } else {
                    let merged = previous.state.with_pending(&pending);
                    self.current_rewrites.push((
                        index,
                        HookRecord::State(Rc::new(StateHook {
                            state: merged.clone(),
                            queue: Rc::clone(&queue),
                        })),
                    ));
                    merged
                };
                let processed =
                    merged.process(self.render_lanes, |state, action| reducer(state, &**action));
                if processed.state.memoized != previous.state.memoized {
                    self.did_receive_update = true;
                }
                self.skipped_lanes |= processed.skipped_lanes;
                StateHook {
                    state: processed.state,
                    queue,
                }
            }
            None => StateHook {
                state: QueueState::new(init()),
                queue: Rc::new(HookQueue::new(self.fiber, self.sink.clone())),
            },
        };

        let value = hook.state.memoized.clone();
        let eager_state = (eager && hook.state.base_queue.is_empty())
            .then(|| (Rc::clone(&reducer), value.clone()));
        *hook.queue.eager.borrow_mut() = eager_state;
        let queue = Rc::clone(&hook.queue);
        self.hooks.push(HookRecord::State(Rc::new(hook)));
        (value, queue)
    }

    /// State driven by `reducer`. Dispatched actions are queued on the
    /// hook's mailbox and applied, in order, on the next render at their lane.
    pub fn use_reducer<S, A>(
        &mut self,
        reducer: impl Fn(&S, &A) -> S + 'static,
        init: impl FnOnce() -> S,
    ) -> (S, Dispatch<A>)
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        let (value, queue) = self.state_hook(Rc::new(reducer), init, false);
        (value, Dispatch { queue })
    }

    pub fn use_state<S>(&mut self, init: impl FnOnce() -> S) -> (S, SetState<S>)
    where
        S: Clone + PartialEq + 'static,
    {
        let reducer: Reducer<S, StateAction<S>> = Rc::new(basic_state_reducer::<S>);
        let (value, queue) = self.state_hook(reducer, init, true);
        (
            value,
            SetState {
                dispatch: Dispatch { queue },
            },
        )
    }

    fn effect_hook<D>(
        &mut self,
        kind: HookFlags,
        deps: Option<D>,
        create: impl FnOnce(EffectScope) -> EffectResult + 'static,
    ) where
        D: PartialEq + 'static,
    {
        let index = self.next_index();
        let deps: Option<Rc<dyn Any>> = deps.map(|deps| Rc::new(deps) as Rc<dyn Any>);
        let previous = match self.previous_at(index) {
            Some(HookRecord::Effect(effect)) if effect.tag.contains(kind) => Some(Rc::clone(effect)),
            Some(_) => {
                self.kind_mismatch(index);
                None
            }
            None => None,
        };

        let (inst, has_effect) = match previous {
            Some(previous) => (
                Rc::clone(&previous.inst),
                !deps_equal::<D>(previous.deps.as_ref(), deps.as_ref()),
            ),
            None => (Rc::new(EffectInstance::default()), true),
        };

        let mut tag = kind;
        if has_effect {
            tag |= HookFlags::HAS_EFFECT;
            self.fiber_flags |= if kind == HookFlags::LAYOUT {
                Flags::UPDATE
            } else {
                Flags::PASSIVE
            };
        }
        self.hooks.push(HookRecord::Effect(Rc::new(Effect {
            tag,
            create: RefCell::new(Some(Box::new(create))),
            inst,
            deps,
        })));
    }

    /// Runs `create` after the commit that rendered it, asynchronously.
    ///
    /// `deps: None` re-runs on every commit; `Some(deps)` re-runs only when
    /// the value changes (`Some(())` runs once per mount).
    pub fn use_effect<D>(
        &mut self,
        deps: Option<D>,
        create: impl FnOnce(EffectScope) -> EffectResult + 'static,
    ) where
        D: PartialEq + 'static,
    {
        self.effect_hook(HookFlags::PASSIVE, deps, create);
    }

    /// Like [`use_effect`](Self::use_effect) but runs synchronously during
    /// the commit, after host mutations and before the commit returns.
    pub fn use_layout_effect<D>(
        &mut self,
        deps: Option<D>,
        create: impl FnOnce(EffectScope) -> EffectResult + 'static,
    ) where
        D: PartialEq + 'static,
    {
        self.effect_hook(HookFlags::LAYOUT, deps, create);
    }

    pub fn use_memo<T, D>(&mut self, deps: D, compute: impl FnOnce(&D) -> T) -> Rc<T>
    where
        T: 'static,
        D: PartialEq + 'static,
    {
        let index = self.next_index();
        match self.previous_at(index) {
            Some(HookRecord::Memo { value, deps: prev }) => {
                let value = Rc::clone(value).downcast::<T>();
                let same = (**prev).downcast_ref::<D>().map(|prev| *prev == deps);
                match (value, same) {
                    (Ok(value), Some(true)) => {
                        self.hooks.push(HookRecord::Memo {
                            value: value.clone(),
                            deps: Rc::new(deps),
                        });
                        return value;
                    }
                    (Ok(_), Some(false)) => {}
                    _ => self.kind_mismatch(index),
                }
            }
            Some(_) => self.kind_mismatch(index),
            None => {}
        }
        let value = Rc::new(compute(&deps));
        self.hooks.push(HookRecord::Memo {
            value: value.clone(),
            deps: Rc::new(deps),
        });
        value
    }

    pub fn use_callback<F, D>(&mut self, deps: D, callback: F) -> Rc<F>
    where
        F: 'static,
        D: PartialEq + 'static,
    {
        self.use_memo(deps, move |_| callback)
    }

    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> HookRef<T> {
        let index = self.next_index();
        let existing = match self.previous_at(index) {
            Some(HookRecord::Ref(cell)) => Rc::clone(cell).downcast::<HookRef<T>>().ok(),
            _ => None,
        };
        if existing.is_none() && self.previous_at(index).is_some() {
            self.kind_mismatch(index);
        }
        let cell = existing.unwrap_or_else(|| Rc::new(HookRef::new(init())));
        let handle = (*cell).clone();
        self.hooks.push(HookRecord::Ref(cell));
        handle
    }

    /// Reads the nearest provided value of `context` and subscribes this
    /// component to its changes. Does not occupy a hook slot.
    pub fn use_context<T: PartialEq + 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        let id = context.id();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        match self.contexts.read(id) {
            Some(value) => Rc::clone(value)
                .downcast::<T>()
                .unwrap_or_else(|_| context.default_value()),
            None => context.default_value(),
        }
    }

    pub fn use_transition(&mut self) -> (bool, StartTransition) {
        let (pending, set_pending) = self.use_state(|| false);
        (pending, StartTransition { set_pending })
    }

    /// Reads `resource`, suspending the render while it is pending.
    pub fn use_resource<T: Clone + 'static>(&mut self, resource: &Resource<T>) -> Result<T, Throw> {
        resource.read()
    }
}

fn deps_equal<D: PartialEq + 'static>(a: Option<&Rc<dyn Any>>, b: Option<&Rc<dyn Any>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match ((**a).downcast_ref::<D>(), (**b).downcast_ref::<D>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
