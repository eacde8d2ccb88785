//! Commit phases: mutation, root swap, layout. Passive effects are collected
//! here and run later by the root.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::applier::{Applier, NodeId};
use crate::error::{ConsistencyError, ReconcileError};
use crate::fiber::{FiberArena, FiberId, OffscreenMode, Props, WorkTag};
use crate::flags::Flags;
use crate::hooks::Effect;
use crate::lane_context;
use crate::lanes::Lanes;
use crate::work_loop::WorkState;

/// Passive effects waiting for the asynchronous flush, in commit order.
#[derive(Default)]
pub(crate) struct PendingPassive {
    /// Effects of deleted components; only their cleanups run.
    pub unmount: Vec<Rc<Effect>>,
    /// Effects whose deps changed; cleanup then create.
    pub update: Vec<Rc<Effect>>,
}

impl PendingPassive {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }

    pub fn append(&mut self, other: PendingPassive) {
        self.unmount.extend(other.unmount);
        self.update.extend(other.update);
    }
}

pub(crate) struct CommitOutcome {
    pub passive: PendingPassive,
    /// Lanes still pending somewhere in the committed tree.
    pub remaining_lanes: Lanes,
    pub mutations: usize,
}

struct CommitCx<'a> {
    arena: &'a mut FiberArena,
    applier: &'a RefCell<dyn Applier>,
    container: NodeId,
    passive: PendingPassive,
    deleted: Vec<FiberId>,
    mutations: usize,
}

/// Applies the finished work-in-progress tree to the host and makes it the
/// current tree.
pub(crate) fn commit_root(
    work: &mut WorkState,
    applier: &RefCell<dyn Applier>,
    container: NodeId,
) -> Result<CommitOutcome, ReconcileError> {
    let lanes = work.render_lanes;
    let Some(finished) = work.wip_root.take() else {
        return Err(ConsistencyError::CommitWithoutLane.into());
    };
    if lanes.is_empty() {
        return Err(ConsistencyError::CommitWithoutLane.into());
    }
    work.wip = None;
    work.render_lanes = Lanes::empty();
    log::debug!("commit {lanes:?}");

    let _sync_updates = lane_context::enter_lane(Lanes::SYNC);
    let mut cx = CommitCx {
        arena: &mut work.arena,
        applier,
        container,
        passive: PendingPassive::default(),
        deleted: Vec::new(),
        mutations: 0,
    };

    log::trace!("commit mutation phase");
    commit_mutation_effects(&mut cx, finished)?;

    work.current = finished;
    log::trace!("current tree is now {finished:?}");

    log::trace!("commit layout phase");
    commit_layout_effects(&mut cx, finished);

    let deleted = std::mem::take(&mut cx.deleted);
    let mut released = 0;
    for fiber in deleted {
        released += cx.arena.release_subtree(fiber);
    }
    if released > 0 {
        log::trace!("released {released} deleted fibers");
    }

    let root = &cx.arena[finished];
    let remaining_lanes = root.lanes | root.child_lanes;
    let outcome = CommitOutcome {
        passive: cx.passive,
        remaining_lanes,
        mutations: cx.mutations,
    };
    Ok(outcome)
}

fn children(arena: &FiberArena, fiber: FiberId) -> SmallVec<[FiberId; 8]> {
    let mut out = SmallVec::new();
    let mut child = arena[fiber].child;
    while let Some(id) = child {
        out.push(id);
        child = arena[id].sibling;
    }
    out
}

fn commit_mutation_effects(cx: &mut CommitCx<'_>, fiber: FiberId) -> Result<(), ReconcileError> {
    let flags = cx.arena[fiber].flags;
    if flags.contains(Flags::CHILD_DELETION) {
        let deletions = cx.arena[fiber].deletions.clone();
        for deleted in deletions {
            commit_deletion(cx, fiber, deleted)?;
        }
    }

    if cx.arena[fiber]
        .subtree_flags
        .intersects(Flags::MUTATION_MASK | Flags::PASSIVE)
    {
        for child in children(cx.arena, fiber) {
            commit_mutation_effects(cx, child)?;
        }
    }

    if flags.contains(Flags::PLACEMENT) {
        commit_placement(cx, fiber)?;
        cx.arena[fiber].flags.remove(Flags::PLACEMENT);
    }

    let current = cx.arena[fiber].alternate.filter(|id| cx.arena.contains(*id));
    match cx.arena[fiber].tag {
        WorkTag::HostComponent => {
            if flags.contains(Flags::REF) {
                if let Some(node_ref) = current.and_then(|id| cx.arena[id].node_ref.clone()) {
                    node_ref.set(None);
                }
            }
            if flags.contains(Flags::UPDATE) {
                commit_host_update(cx, fiber, current)?;
            }
        }
        WorkTag::HostText => {
            if flags.contains(Flags::UPDATE) {
                commit_text_update(cx, fiber, current)?;
            }
        }
        WorkTag::FunctionComponent | WorkTag::MemoComponent => {
            if let Some(state) = cx.arena[fiber].component_state() {
                if flags.contains(Flags::UPDATE) {
                    for effect in state.effects().filter(|e| e.is_layout() && e.has_effect()) {
                        effect.run_destroy();
                    }
                }
                if flags.contains(Flags::PASSIVE) {
                    let effects = state.effects().filter(|e| e.is_passive() && e.has_effect());
                    cx.passive.update.extend(effects.cloned());
                }
            }
        }
        WorkTag::Offscreen => {
            if flags.contains(Flags::VISIBILITY) {
                let hidden = cx.arena[fiber].pending_props.offscreen_mode()
                    == Some(OffscreenMode::Hidden);
                hide_or_unhide_children(cx, fiber, hidden)?;
            }
        }
        WorkTag::HostRoot | WorkTag::Fragment | WorkTag::ContextProvider | WorkTag::Suspense => {}
    }
    Ok(())
}

fn commit_host_update(
    cx: &mut CommitCx<'_>,
    fiber: FiberId,
    current: Option<FiberId>,
) -> Result<(), ReconcileError> {
    let state_node = cx.arena[fiber].state_node;
    let memoized_props = &cx.arena[fiber].memoized_props;
    let (Some(node), Props::Host(next)) = (state_node, memoized_props) else {
        return Ok(());
    };
    let previous = current.and_then(|id| match &cx.arena[id].memoized_props {
        Props::Host(previous) => Some(Rc::clone(previous)),
        _ => None,
    });
    let Some(previous) = previous else {
        return Ok(());
    };
    cx.applier
        .borrow_mut()
        .commit_update(node, &previous.props, &next.props)?;
    cx.mutations += 1;
    Ok(())
}

fn commit_text_update(
    cx: &mut CommitCx<'_>,
    fiber: FiberId,
    current: Option<FiberId>,
) -> Result<(), ReconcileError> {
    let state_node = cx.arena[fiber].state_node;
    let memoized_props = &cx.arena[fiber].memoized_props;
    let (Some(node), Props::Text(next)) = (state_node, memoized_props) else {
        return Ok(());
    };
    let previous = current
        .and_then(|id| match &cx.arena[id].memoized_props {
            Props::Text(previous) => Some(Rc::clone(previous)),
            _ => None,
        })
        .unwrap_or_else(|| Rc::from(""));
    cx.applier
        .borrow_mut()
        .commit_text_update(node, &previous, next)?;
    cx.mutations += 1;
    Ok(())
}

/// Nearest ancestor that owns a host node, with that node.
fn host_parent(cx: &CommitCx<'_>, fiber: FiberId) -> Result<NodeId, ReconcileError> {
    let mut node = cx.arena[fiber].parent;
    while let Some(id) = node {
        let parent = &cx.arena[id];
        match parent.tag {
            WorkTag::HostRoot => return Ok(cx.container),
            WorkTag::HostComponent => {
                return parent
                    .state_node
                    .ok_or_else(|| ConsistencyError::MissingHostParent.into())
            }
            _ => node = parent.parent,
        }
    }
    Err(ConsistencyError::MissingHostParent.into())
}

/// First host node after `fiber` in tree order that is already attached to
/// the host, skipping fibers that are themselves about to be placed.
fn host_sibling(arena: &FiberArena, fiber: FiberId) -> Option<NodeId> {
    let mut node = fiber;
    'siblings: loop {
        while arena[node].sibling.is_none() {
            match arena[node].parent {
                Some(parent) if !arena[parent].tag.is_host_parent() => node = parent,
                _ => return None,
            }
        }
        node = arena[node].sibling?;
        while !arena[node].tag.is_host() {
            if arena[node].flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            match arena[node].child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }
        if !arena[node].flags.contains(Flags::PLACEMENT) {
            if let Some(state_node) = arena[node].state_node {
                return Some(state_node);
            }
        }
    }
}

/// Host nodes at the top of the subtree rooted at `fiber`.
fn top_host_nodes(arena: &FiberArena, fiber: FiberId) -> Vec<(FiberId, NodeId)> {
    let mut out = Vec::new();
    let mut stack = vec![fiber];
    while let Some(id) = stack.pop() {
        let node = &arena[id];
        if node.tag.is_host() {
            if let Some(state_node) = node.state_node {
                out.push((id, state_node));
            }
            continue;
        }
        let mut kids: SmallVec<[FiberId; 8]> = SmallVec::new();
        let mut child = node.child;
        while let Some(c) = child {
            kids.push(c);
            child = arena[c].sibling;
        }
        stack.extend(kids.into_iter().rev());
    }
    out
}

fn commit_placement(cx: &mut CommitCx<'_>, fiber: FiberId) -> Result<(), ReconcileError> {
    let parent = host_parent(cx, fiber)?;
    let before = host_sibling(cx.arena, fiber);
    for (_, node) in top_host_nodes(cx.arena, fiber) {
        let mut applier = cx.applier.borrow_mut();
        match before {
            Some(before) => applier.insert_before(parent, node, before)?,
            None => applier.append_child(parent, node)?,
        }
        cx.mutations += 1;
    }
    Ok(())
}

fn commit_deletion(
    cx: &mut CommitCx<'_>,
    parent: FiberId,
    deleted: FiberId,
) -> Result<(), ReconcileError> {
    let host_parent = if cx.arena[parent].tag.is_host_parent() {
        match cx.arena[parent].tag {
            WorkTag::HostRoot => cx.container,
            _ => cx.arena[parent]
                .state_node
                .ok_or(ConsistencyError::MissingHostParent)?,
        }
    } else {
        host_parent(cx, parent)?
    };
    log::trace!("delete {deleted:?}");
    delete_subtree(cx, deleted, Some(host_parent))?;
    cx.deleted.push(deleted);
    Ok(())
}

/// Runs unmount work for every fiber below `fiber`. Only the topmost host
/// nodes are removed from `host_parent`; nested ones go with them.
fn delete_subtree(
    cx: &mut CommitCx<'_>,
    fiber: FiberId,
    host_parent: Option<NodeId>,
) -> Result<(), ReconcileError> {
    let tag = cx.arena[fiber].tag;
    match tag {
        WorkTag::HostComponent | WorkTag::HostText => {
            if let Some(node_ref) = &cx.arena[fiber].node_ref {
                node_ref.set(None);
            }
            for child in children(cx.arena, fiber) {
                delete_subtree(cx, child, None)?;
            }
            if let (Some(parent), Some(node)) = (host_parent, cx.arena[fiber].state_node) {
                cx.applier.borrow_mut().remove_child(parent, node)?;
                cx.mutations += 1;
            }
        }
        WorkTag::FunctionComponent | WorkTag::MemoComponent => {
            if let Some(state) = cx.arena[fiber].component_state() {
                for effect in state.effects() {
                    if effect.is_layout() {
                        effect.run_destroy();
                    } else if effect.is_passive() {
                        cx.passive.unmount.push(Rc::clone(effect));
                    }
                }
            }
            for child in children(cx.arena, fiber) {
                delete_subtree(cx, child, host_parent)?;
            }
        }
        _ => {
            for child in children(cx.arena, fiber) {
                delete_subtree(cx, child, host_parent)?;
            }
        }
    }
    Ok(())
}

fn hide_or_unhide_children(
    cx: &mut CommitCx<'_>,
    offscreen: FiberId,
    hidden: bool,
) -> Result<(), ReconcileError> {
    let Some(child) = cx.arena[offscreen].child else {
        return Ok(());
    };
    let mut roots = Vec::new();
    let mut next = Some(child);
    while let Some(id) = next {
        roots.extend(top_host_nodes(cx.arena, id));
        next = cx.arena[id].sibling;
    }
    let mut applier = cx.applier.borrow_mut();
    for (fiber, node) in roots {
        match (cx.arena[fiber].tag, hidden) {
            (WorkTag::HostText, true) => applier.hide_text_instance(node)?,
            (WorkTag::HostText, false) => applier.unhide_text_instance(node)?,
            (_, true) => applier.hide_instance(node)?,
            (_, false) => applier.unhide_instance(node)?,
        }
        cx.mutations += 1;
    }
    Ok(())
}

fn commit_layout_effects(cx: &mut CommitCx<'_>, fiber: FiberId) {
    if cx.arena[fiber].subtree_flags.intersects(Flags::LAYOUT_MASK) {
        for child in children(cx.arena, fiber) {
            commit_layout_effects(cx, child);
        }
    }

    let flags = cx.arena[fiber].flags;
    match cx.arena[fiber].tag {
        WorkTag::FunctionComponent | WorkTag::MemoComponent if flags.contains(Flags::UPDATE) => {
            if let Some(state) = cx.arena[fiber].component_state() {
                for effect in state.effects().filter(|e| e.is_layout() && e.has_effect()) {
                    effect.run_create();
                }
            }
        }
        WorkTag::HostComponent if flags.contains(Flags::REF) => {
            let fiber = &cx.arena[fiber];
            if let (Some(node_ref), Some(node)) = (&fiber.node_ref, fiber.state_node) {
                node_ref.set(Some(node));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "tests/commit_work_tests.rs"]
mod tests;
