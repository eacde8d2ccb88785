//! Begin phase: renders one fiber and reconciles its children.

use std::rc::Rc;

use crate::child_fibers::reconcile_child_fibers;
use crate::context::propagate_context_change;
use crate::error::{ConsistencyError, ReconcileError, Throw};
use crate::fiber::{
    create_fiber_from_fragment, create_fiber_from_offscreen, create_work_in_progress, ElementType,
    FiberArena, FiberId, FiberState, OffscreenMode, OffscreenProps, Props, SuspenseState, WorkTag,
};
use crate::flags::Flags;
use crate::hooks::{ComponentState, HookInput, HookRecord, Hooks};
use crate::lanes::Lanes;
use crate::view::{same_ref, SuspenseProps, View};
use crate::work_loop::RenderCx;

/// Why a unit of work stopped early.
pub(crate) enum UnitError {
    /// The render function threw; the work loop routes it to a boundary.
    Throw(Throw),
    Fatal(ReconcileError),
}

impl From<ConsistencyError> for UnitError {
    fn from(error: ConsistencyError) -> Self {
        UnitError::Fatal(ReconcileError::Consistency(error))
    }
}

type BeginResult = Result<Option<FiberId>, UnitError>;

/// Renders `wip` and returns the next fiber to begin, or `None` when the
/// fiber has no child work and should complete.
pub(crate) fn begin_work(cx: &mut RenderCx<'_>, wip: FiberId) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    let arena = &mut cx.work.arena;
    let current = arena[wip].alternate.filter(|id| arena.contains(*id));
    let mut did_receive_update = false;

    if let Some(current) = current {
        if !arena[current].memoized_props.same(&arena[wip].pending_props) {
            did_receive_update = true;
        } else if !arena[current].lanes.includes_some(render_lanes)
            && !arena[wip].flags.contains(Flags::DID_CAPTURE)
        {
            return attempt_early_bailout(cx, current, wip);
        }
    }

    cx.work.arena[wip].lanes = Lanes::empty();
    log::trace!("begin {wip:?} {}", cx.work.arena[wip].element_type.name());

    match cx.work.arena[wip].tag {
        WorkTag::HostRoot => update_host_root(cx, current, wip),
        WorkTag::FunctionComponent => {
            update_function_component(cx, current, wip, did_receive_update)
        }
        WorkTag::MemoComponent => update_memo_component(cx, current, wip, did_receive_update),
        WorkTag::HostComponent => update_host_component(cx, current, wip),
        WorkTag::HostText => Ok(None),
        WorkTag::Fragment => {
            let children = match &cx.work.arena[wip].pending_props {
                Props::Children(children) => Rc::clone(children),
                _ => Rc::new(View::Empty),
            };
            Ok(reconcile_children(cx, current, wip, &children))
        }
        WorkTag::ContextProvider => update_context_provider(cx, current, wip),
        WorkTag::Suspense => update_suspense_component(cx, current, wip),
        WorkTag::Offscreen => update_offscreen_component(cx, current, wip),
    }
}

fn reconcile_children(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
    children: &View,
) -> Option<FiberId> {
    let lanes = cx.work.render_lanes;
    let arena = &mut cx.work.arena;
    let current_first = current.and_then(|current| arena[current].child);
    let child = reconcile_child_fibers(arena, wip, current_first, children, lanes, current.is_some());
    arena[wip].child = child;
    child
}

fn attempt_early_bailout(cx: &mut RenderCx<'_>, current: FiberId, wip: FiberId) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    match cx.work.arena[wip].tag {
        WorkTag::ContextProvider => {
            if let Props::Provider(props) = &cx.work.arena[wip].pending_props {
                cx.work.contexts.push(props.context, Rc::clone(&props.value));
            }
        }
        WorkTag::Suspense if cx.work.arena[current].state.showing_fallback() => {
            let primary_has_work = cx.work.arena[wip]
                .child
                .map(|primary| {
                    let primary = &cx.work.arena[primary];
                    (primary.lanes | primary.child_lanes).includes_some(render_lanes)
                })
                .unwrap_or(false);
            if primary_has_work {
                return update_suspense_component(cx, Some(current), wip);
            }
        }
        _ => {}
    }
    Ok(bailout_on_already_finished_work(
        &mut cx.work.arena,
        current,
        wip,
        render_lanes,
    ))
}

/// Skips `wip`. Its children are cloned only when some descendant has work
/// in `render_lanes`; otherwise the whole subtree is reused as committed.
pub(crate) fn bailout_on_already_finished_work(
    arena: &mut FiberArena,
    current: FiberId,
    wip: FiberId,
    render_lanes: Lanes,
) -> Option<FiberId> {
    log::trace!("bailout {wip:?}");
    if !arena[wip].child_lanes.includes_some(render_lanes) {
        return None;
    }
    debug_assert_eq!(arena[current].child, arena[wip].child);
    clone_child_fibers(arena, wip);
    arena[wip].child
}

fn clone_child_fibers(arena: &mut FiberArena, wip: FiberId) {
    let Some(mut current_child) = arena[wip].child else {
        return;
    };
    let props = arena[current_child].pending_props.clone();
    let mut new_child = create_work_in_progress(arena, current_child, props);
    arena[wip].child = Some(new_child);
    arena[new_child].parent = Some(wip);
    while let Some(next) = arena[current_child].sibling {
        current_child = next;
        let props = arena[current_child].pending_props.clone();
        let sibling = create_work_in_progress(arena, current_child, props);
        arena[new_child].sibling = Some(sibling);
        arena[sibling].parent = Some(wip);
        new_child = sibling;
    }
    arena[new_child].sibling = None;
}

fn update_host_root(cx: &mut RenderCx<'_>, current: Option<FiberId>, wip: FiberId) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    let pending = std::mem::take(&mut *cx.root_updates.borrow_mut());
    let arena = &mut cx.work.arena;
    if !pending.is_empty() {
        for fiber in current.into_iter().chain(Some(wip)) {
            if let FiberState::Root(queue) = &mut arena[fiber].state {
                *queue = queue.with_pending(&pending);
            }
        }
    }

    let FiberState::Root(queue) = &arena[wip].state else {
        return Err(ConsistencyError::StaleFiber.into());
    };
    let previous = Rc::clone(&queue.memoized);
    let processed = queue.process(render_lanes, |_, next| Rc::clone(next));
    let next = Rc::clone(&processed.state.memoized);
    arena[wip].lanes = processed.skipped_lanes;
    arena[wip].state = FiberState::Root(processed.state);

    if let Some(current) = current {
        if Rc::ptr_eq(&previous, &next) {
            return Ok(bailout_on_already_finished_work(
                arena,
                current,
                wip,
                render_lanes,
            ));
        }
    }
    Ok(reconcile_children(cx, current, wip, &next))
}

fn update_function_component(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
    mut did_receive_update: bool,
) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    let (component, props) = {
        let fiber = &cx.work.arena[wip];
        let Some(component) = fiber.element_type.component().cloned() else {
            return Err(ConsistencyError::StaleFiber.into());
        };
        let Props::Component(props) = &fiber.pending_props else {
            return Err(ConsistencyError::StaleFiber.into());
        };
        (component, Rc::clone(props))
    };
    if cx.work.arena[wip]
        .dependencies
        .lanes
        .includes_some(render_lanes)
    {
        did_receive_update = true;
    }

    let previous = current.and_then(|current| {
        cx.work.arena[current]
            .component_state()
            .map(|state| state.hooks.clone())
    });
    let mut hooks = Hooks::new(HookInput {
        fiber: wip,
        component: component.name(),
        render_lanes,
        sink: cx.sink.clone(),
        contexts: &cx.work.contexts,
        previous,
    });
    let result = component.render(&mut hooks, &*props);
    let rendered = hooks.finish(result.is_ok());

    let arena = &mut cx.work.arena;
    if let Some(current) = current {
        if let Some(state) = arena[current].component_state_mut() {
            for (index, record) in rendered.current_rewrites {
                if let Some(slot) = state.hooks.get_mut(index) {
                    *slot = record;
                }
            }
        }
    }
    if let Some(error) = rendered.error {
        return Err(error.into());
    }
    let view = result.map_err(UnitError::Throw)?;

    let fiber = &mut arena[wip];
    fiber.state = FiberState::Component(ComponentState {
        hooks: rendered.hooks,
    });
    fiber.flags |= rendered.fiber_flags;
    fiber.lanes = rendered.skipped_lanes;
    fiber.dependencies.lanes = Lanes::empty();
    fiber.dependencies.contexts = rendered.contexts;
    did_receive_update |= rendered.did_receive_update;

    if let Some(current) = current {
        if !did_receive_update {
            bailout_hooks(arena, current, wip, render_lanes);
            return Ok(bailout_on_already_finished_work(
                arena,
                current,
                wip,
                render_lanes,
            ));
        }
    }
    Ok(reconcile_children(cx, current, wip, &view))
}

/// The render produced nothing new: keep the committed effects and drop the
/// rendered lanes from the committed copy.
fn bailout_hooks(arena: &mut FiberArena, current: FiberId, wip: FiberId, lanes: Lanes) {
    let committed: Vec<Option<HookRecord>> = match arena[current].component_state() {
        Some(state) => state
            .hooks
            .iter()
            .map(|record| matches!(record, HookRecord::Effect(_)).then(|| record.clone()))
            .collect(),
        None => Vec::new(),
    };
    if let Some(state) = arena[wip].component_state_mut() {
        for (slot, committed) in state.hooks.iter_mut().zip(committed) {
            if let Some(committed) = committed.filter(|_| matches!(slot, HookRecord::Effect(_))) {
                *slot = committed;
            }
        }
    }
    arena[wip].flags.remove(Flags::PASSIVE | Flags::UPDATE);
    arena[current].lanes.remove(lanes);
}

fn update_memo_component(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
    did_receive_update: bool,
) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    if let Some(current) = current {
        let arena = &mut cx.work.arena;
        if !arena[current].lanes.includes_some(render_lanes) {
            let same = match (
                &arena[wip].element_type,
                &arena[current].memoized_props,
                &arena[wip].pending_props,
            ) {
                (ElementType::Memo { compare, .. }, Props::Component(prev), Props::Component(next)) => {
                    compare(&**prev, &**next)
                }
                _ => false,
            };
            if same {
                arena[wip].pending_props = arena[current].memoized_props.clone();
                return Ok(bailout_on_already_finished_work(
                    arena,
                    current,
                    wip,
                    render_lanes,
                ));
            }
        }
    }
    update_function_component(cx, current, wip, did_receive_update)
}

fn update_host_component(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
) -> BeginResult {
    let arena = &mut cx.work.arena;
    let Props::Host(host) = &arena[wip].pending_props else {
        return Err(ConsistencyError::StaleFiber.into());
    };
    let host = Rc::clone(host);
    let ref_changed = match current {
        Some(current) => !same_ref(&arena[current].node_ref, &arena[wip].node_ref),
        None => arena[wip].node_ref.is_some(),
    };
    if ref_changed {
        arena[wip].flags |= Flags::REF;
    }
    Ok(reconcile_children(cx, current, wip, &host.children))
}

fn update_context_provider(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
) -> BeginResult {
    let render_lanes = cx.work.render_lanes;
    let Props::Provider(props) = &cx.work.arena[wip].pending_props else {
        return Err(ConsistencyError::StaleFiber.into());
    };
    let props = Rc::clone(props);
    cx.work.contexts.push(props.context, Rc::clone(&props.value));

    if let Some(current) = current {
        if let Props::Provider(old) = &cx.work.arena[current].memoized_props {
            if !(old.same_value)(&*old.value, &*props.value) {
                log::debug!("context {:?} changed at {wip:?}", props.context);
                propagate_context_change(&mut cx.work.arena, wip, props.context, render_lanes);
            }
        }
    }
    Ok(reconcile_children(cx, current, wip, &props.children))
}

fn update_offscreen_component(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
) -> BeginResult {
    let Props::Offscreen(props) = &cx.work.arena[wip].pending_props else {
        return Err(ConsistencyError::StaleFiber.into());
    };
    let props = Rc::clone(props);
    match props.mode {
        OffscreenMode::Visible => Ok(reconcile_children(cx, current, wip, &props.source.children)),
        OffscreenMode::Hidden => {
            let arena = &mut cx.work.arena;
            arena[wip].lanes = Lanes::empty();
            arena[wip].child_lanes = Lanes::empty();
            Ok(None)
        }
    }
}

fn offscreen_props(mode: OffscreenMode, source: &Rc<SuspenseProps>) -> Props {
    Props::Offscreen(Rc::new(OffscreenProps {
        mode,
        source: Rc::clone(source),
    }))
}

/// A suspense boundary renders an offscreen wrapper around its primary
/// children and, while showing the fallback, a fragment sibling holding the
/// fallback. The wrapper is hidden rather than deleted so the primary
/// subtree keeps its state.
fn update_suspense_component(
    cx: &mut RenderCx<'_>,
    current: Option<FiberId>,
    wip: FiberId,
) -> BeginResult {
    let lanes = cx.work.render_lanes;
    let arena = &mut cx.work.arena;
    let Props::Suspense(props) = &arena[wip].pending_props else {
        return Err(ConsistencyError::StaleFiber.into());
    };
    let props = Rc::clone(props);
    let show_fallback = arena[wip].flags.contains(Flags::DID_CAPTURE);
    if show_fallback {
        arena[wip].flags.remove(Flags::DID_CAPTURE);
        cx.work.needs_sweep = true;
    }
    arena[wip].state = FiberState::Suspense(SuspenseState {
        showing_fallback: show_fallback,
    });

    let current_primary = current.and_then(|current| arena[current].child);
    let fiber = match (current_primary, show_fallback) {
        (None, false) => {
            let primary = create_fiber_from_offscreen(
                arena,
                Rc::new(OffscreenProps {
                    mode: OffscreenMode::Visible,
                    source: Rc::clone(&props),
                }),
                lanes,
            );
            arena[primary].parent = Some(wip);
            arena[wip].child = Some(primary);
            primary
        }
        (None, true) => {
            let primary = create_fiber_from_offscreen(
                arena,
                Rc::new(OffscreenProps {
                    mode: OffscreenMode::Hidden,
                    source: Rc::clone(&props),
                }),
                Lanes::empty(),
            );
            arena[primary].memoized_props = arena[primary].pending_props.clone();
            let fallback = create_fiber_from_fragment(
                arena,
                Rc::new(props.fallback.clone()),
                None,
                lanes,
            );
            link_boundary_children(arena, wip, primary, fallback);
            fallback
        }
        (Some(current_primary), false) => {
            let primary = create_work_in_progress(
                arena,
                current_primary,
                offscreen_props(OffscreenMode::Visible, &props),
            );
            arena[primary].parent = Some(wip);
            arena[primary].sibling = None;
            if let Some(current_fallback) = arena[current_primary].sibling {
                let boundary = &mut arena[wip];
                boundary.deletions.push(current_fallback);
                boundary.flags |= Flags::CHILD_DELETION;
            }
            arena[wip].child = Some(primary);
            primary
        }
        (Some(current_primary), true) => {
            {
                let boundary = &mut arena[wip];
                boundary.deletions.clear();
                boundary.flags.remove(Flags::CHILD_DELETION);
            }
            let primary = create_work_in_progress(
                arena,
                current_primary,
                offscreen_props(OffscreenMode::Hidden, &props),
            );
            {
                let hidden = &mut arena[primary];
                hidden.memoized_props = hidden.pending_props.clone();
                hidden.lanes = Lanes::empty();
                hidden.child_lanes = Lanes::empty();
            }
            let fallback_children = Props::Children(Rc::new(props.fallback.clone()));
            let fallback = match arena[current_primary].sibling {
                Some(current_fallback) => {
                    create_work_in_progress(arena, current_fallback, fallback_children)
                }
                None => {
                    let created = create_fiber_from_fragment(
                        arena,
                        Rc::new(props.fallback.clone()),
                        None,
                        lanes,
                    );
                    arena[created].flags |= Flags::PLACEMENT;
                    created
                }
            };
            link_boundary_children(arena, wip, primary, fallback);
            fallback
        }
    };
    Ok(Some(fiber))
}

fn link_boundary_children(arena: &mut FiberArena, wip: FiberId, primary: FiberId, fallback: FiberId) {
    arena[primary].parent = Some(wip);
    arena[primary].sibling = Some(fallback);
    arena[primary].index = 0;
    arena[fallback].parent = Some(wip);
    arena[fallback].sibling = None;
    arena[fallback].index = 1;
    arena[wip].child = Some(primary);
}
