use super::*;
use crate::context::create_context;
use crate::error::ReconcileError;
use crate::fiber::{ElementType, Fiber, FiberArena, Props, WorkTag};
use crate::resource::Wakeable;
use crate::view::View;

/// Root stand-in that records scheduled updates.
struct RecordingRoot {
    lane: Cell<Lanes>,
    idle: Cell<bool>,
    scheduled: RefCell<Vec<(FiberId, Lanes)>>,
}

impl RecordingRoot {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            lane: Cell::new(Lanes::DEFAULT),
            idle: Cell::new(true),
            scheduled: RefCell::new(Vec::new()),
        })
    }

    fn sink(self: &Rc<Self>) -> Weak<dyn RootOps> {
        Rc::downgrade(self) as Weak<dyn RootOps>
    }
}

impl RootOps for RecordingRoot {
    fn request_update_lane(&self) -> Lanes {
        lane_context::current_override().unwrap_or(self.lane.get())
    }

    fn fiber_is_idle(&self, _fiber: FiberId) -> Option<bool> {
        Some(self.idle.get())
    }

    fn schedule_update_on_fiber(&self, fiber: FiberId, lane: Lanes) {
        self.scheduled.borrow_mut().push((fiber, lane));
    }

    fn attach_ping(&self, _wakeable: Rc<dyn Wakeable>, _lanes: Lanes, _boundary: Option<FiberId>) {
    }

    fn flush_sync_callbacks(&self) {}

    fn enqueue_render(&self, _view: Rc<View>) -> Result<(), ReconcileError> {
        Ok(())
    }
}

struct Harness {
    root: Rc<RecordingRoot>,
    fiber: FiberId,
    contexts: ContextStack,
    committed: Option<Vec<HookRecord>>,
    _arena: FiberArena,
}

impl Harness {
    fn new() -> Self {
        let mut arena = FiberArena::new();
        let fiber = arena.alloc(Fiber::new(
            WorkTag::FunctionComponent,
            None,
            ElementType::Fragment,
            Props::None,
        ));
        Self {
            root: RecordingRoot::new(),
            fiber,
            contexts: ContextStack::default(),
            committed: None,
            _arena: arena,
        }
    }

    /// Renders once at `lanes` and commits the produced hook list.
    fn render<R>(&mut self, lanes: Lanes, body: impl FnOnce(&mut Hooks<'_>) -> R) -> (R, RenderedHooks) {
        let mut hooks = Hooks::new(HookInput {
            fiber: self.fiber,
            component: "Test",
            render_lanes: lanes,
            sink: self.root.sink(),
            contexts: &self.contexts,
            previous: self.committed.clone(),
        });
        let output = body(&mut hooks);
        let rendered = hooks.finish(true);
        self.committed = Some(rendered.hooks.clone());
        (output, rendered)
    }
}

#[test]
fn state_initializes_once_and_applies_dispatches() {
    let mut harness = Harness::new();
    let inits = Rc::new(Cell::new(0));

    let counter = inits.clone();
    let ((value, set), _) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_state(|| {
            counter.set(counter.get() + 1);
            1
        })
    });
    assert_eq!(value, 1);

    set.set(5);
    assert_eq!(
        harness.root.scheduled.borrow().as_slice(),
        &[(harness.fiber, Lanes::DEFAULT)]
    );

    let counter = inits.clone();
    let ((value, again), rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_state(|| {
            counter.set(counter.get() + 1);
            1
        })
    });
    assert_eq!(value, 5);
    assert!(rendered.did_receive_update);
    assert!(set.ptr_eq(&again));
    assert_eq!(inits.get(), 1);
}

#[test]
fn setting_the_same_state_on_an_idle_fiber_is_dropped() {
    let mut harness = Harness::new();
    let ((_, set), _) = harness.render(Lanes::DEFAULT, |hooks| hooks.use_state(|| 3));

    set.set(3);
    assert!(harness.root.scheduled.borrow().is_empty());

    harness.root.idle.set(false);
    set.set(3);
    assert_eq!(harness.root.scheduled.borrow().len(), 1);
}

#[test]
fn reducer_never_bails_out_eagerly() {
    let mut harness = Harness::new();
    let ((_, dispatch), _) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_reducer(|state: &i32, delta: &i32| state + delta, || 0)
    });
    dispatch.dispatch(0);
    assert_eq!(harness.root.scheduled.borrow().len(), 1);
}

#[test]
fn lower_priority_updates_are_skipped_and_rebased() {
    let mut harness = Harness::new();
    let ((_, dispatch), _) = harness.render(Lanes::SYNC, |hooks| {
        hooks.use_reducer(|state: &String, part: &&'static str| format!("{state}{part}"), String::new)
    });

    harness.root.lane.set(Lanes::DEFAULT);
    dispatch.dispatch("A");
    harness.root.lane.set(Lanes::SYNC);
    dispatch.dispatch("B");

    let ((urgent, _), rendered) = harness.render(Lanes::SYNC, |hooks| {
        hooks.use_reducer(|state: &String, part: &&'static str| format!("{state}{part}"), String::new)
    });
    assert_eq!(urgent, "B");
    assert_eq!(rendered.skipped_lanes, Lanes::DEFAULT);

    let ((full, _), rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_reducer(|state: &String, part: &&'static str| format!("{state}{part}"), String::new)
    });
    assert_eq!(full, "AB");
    assert!(rendered.skipped_lanes.is_empty());
}

#[test]
fn pending_updates_are_written_back_to_the_committed_copy() {
    let mut harness = Harness::new();
    let ((_, set), _) = harness.render(Lanes::SYNC, |hooks| hooks.use_state(|| 0));
    set.set(9);

    let (_, rendered) = harness.render(Lanes::SYNC, |hooks| hooks.use_state(|| 0));
    assert_eq!(rendered.current_rewrites.len(), 1);
    assert_eq!(rendered.current_rewrites[0].0, 0);
}

#[test]
fn effect_runs_only_when_deps_change() {
    let mut harness = Harness::new();
    let (_, mount) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_effect(Some(1), |_| EffectResult::none());
        hooks.use_layout_effect(Some(1), |_| EffectResult::none());
    });
    assert_eq!(mount.fiber_flags, Flags::PASSIVE | Flags::UPDATE);

    let (_, same) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_effect(Some(1), |_| EffectResult::none());
        hooks.use_layout_effect(Some(1), |_| EffectResult::none());
    });
    assert!(same.fiber_flags.is_empty());

    let (_, changed) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_effect(Some(2), |_| EffectResult::none());
        hooks.use_layout_effect(Some(1), |_| EffectResult::none());
    });
    assert_eq!(changed.fiber_flags, Flags::PASSIVE);
}

#[test]
fn effect_without_deps_runs_every_render() {
    let mut harness = Harness::new();
    harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_effect(None::<()>, |_| EffectResult::none())
    });
    let (_, rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_effect(None::<()>, |_| EffectResult::none())
    });
    assert_eq!(rendered.fiber_flags, Flags::PASSIVE);
}

#[test]
fn effect_cleanup_runs_before_next_create() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut harness = Harness::new();
    let sink = log.clone();
    let (_, first) = harness.render(Lanes::DEFAULT, move |hooks| {
        hooks.use_effect(Some(1), move |scope| {
            sink.borrow_mut().push("create 1");
            let sink = sink.clone();
            scope.on_cleanup(move || sink.borrow_mut().push("cleanup 1"))
        })
    });
    let effects: Vec<_> = ComponentState { hooks: first.hooks }.effects().cloned().collect();
    effects.iter().for_each(|effect| effect.run_create());

    let sink = log.clone();
    let (_, second) = harness.render(Lanes::DEFAULT, move |hooks| {
        hooks.use_effect(Some(2), move |_| {
            sink.borrow_mut().push("create 2");
            EffectResult::none()
        })
    });
    let effects: Vec<_> = ComponentState { hooks: second.hooks }.effects().cloned().collect();
    effects.iter().for_each(|effect| effect.run_destroy());
    effects.iter().for_each(|effect| effect.run_create());

    assert_eq!(*log.borrow(), vec!["create 1", "cleanup 1", "create 2"]);
}

#[test]
fn memo_recomputes_on_deps_change() {
    let mut harness = Harness::new();
    let computed = Rc::new(Cell::new(0));

    for (deps, expected) in [(1, 1), (1, 1), (2, 2)] {
        let counter = computed.clone();
        let (value, _) = harness.render(Lanes::DEFAULT, |hooks| {
            hooks.use_memo(deps, |deps| {
                counter.set(counter.get() + 1);
                deps * 10
            })
        });
        assert_eq!(*value, deps * 10);
        assert_eq!(computed.get(), expected);
    }
}

#[test]
fn ref_cell_survives_renders() {
    let mut harness = Harness::new();
    let (first, _) = harness.render(Lanes::DEFAULT, |hooks| hooks.use_ref(|| 0u32));
    first.set(4);
    let (second, _) = harness.render(Lanes::DEFAULT, |hooks| hooks.use_ref(|| 0u32));
    assert!(first.ptr_eq(&second));
    assert_eq!(second.get(), 4);
}

#[test]
fn context_reads_default_and_takes_no_slot() {
    let theme = create_context("light");
    let mut harness = Harness::new();
    let (value, rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        let value = hooks.use_context(&theme);
        hooks.use_context(&theme);
        value
    });
    assert_eq!(*value, "light");
    assert!(rendered.hooks.is_empty());
    assert_eq!(rendered.contexts.as_slice(), &[theme.id()]);

    harness.contexts.push(theme.id(), Rc::new("dark"));
    let (value, _) = harness.render(Lanes::DEFAULT, |hooks| hooks.use_context(&theme));
    assert_eq!(*value, "dark");
}

#[test]
fn changing_hook_count_is_reported() {
    let mut harness = Harness::new();
    harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_state(|| 0);
        hooks.use_state(|| 0);
    });
    let (_, rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_state(|| 0);
    });
    assert_eq!(
        rendered.error,
        Some(ConsistencyError::HookCountMismatch {
            component: "Test",
            expected: 2,
            rendered: 1,
        })
    );
}

#[test]
fn changing_hook_kind_is_reported() {
    let mut harness = Harness::new();
    harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_state(|| 0);
    });
    let (_, rendered) = harness.render(Lanes::DEFAULT, |hooks| {
        hooks.use_ref(|| 0);
    });
    assert_eq!(
        rendered.error,
        Some(ConsistencyError::HookKindMismatch {
            component: "Test",
            index: 0,
        })
    );
}

#[test]
fn transition_marks_pending_then_dispatches_in_transition_lane() {
    let mut harness = Harness::new();
    let ((pending, start), _) = harness.render(Lanes::DEFAULT, |hooks| hooks.use_transition());
    assert!(!pending);

    harness.root.idle.set(false);
    start.start(|| {});
    let lanes: Vec<Lanes> = harness
        .root
        .scheduled
        .borrow()
        .iter()
        .map(|(_, lane)| *lane)
        .collect();
    assert_eq!(lanes, vec![Lanes::DEFAULT, Lanes::TRANSITION]);
}
