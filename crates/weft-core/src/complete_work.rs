//! Complete phase: creates host instances for mounted fibers, diffs host
//! props of updated ones and bubbles lanes and flags to the parent.

use std::cell::RefCell;

use crate::applier::{Applier, NodeId};
use crate::error::{ConsistencyError, ReconcileError};
use crate::fiber::{FiberArena, FiberId, Props, WorkTag};
use crate::flags::Flags;
use crate::lanes::Lanes;
use crate::work_loop::RenderCx;

pub(crate) fn complete_work(cx: &mut RenderCx<'_>, wip: FiberId) -> Result<(), ReconcileError> {
    let arena = &mut cx.work.arena;
    let current = arena[wip].alternate.filter(|id| arena.contains(*id));
    log::trace!("complete {wip:?} {}", arena[wip].element_type.name());

    match arena[wip].tag {
        WorkTag::HostComponent => {
            let Props::Host(host) = arena[wip].pending_props.clone() else {
                return Err(ConsistencyError::StaleFiber.into());
            };
            match (current, arena[wip].state_node) {
                (Some(current), Some(_)) => {
                    if let Props::Host(old) = &arena[current].memoized_props {
                        if old.props != host.props {
                            arena[wip].flags |= Flags::UPDATE;
                        }
                    }
                }
                _ => {
                    let node = cx.applier.borrow_mut().create_instance(&host.tag, &host.props)?;
                    append_all_children(arena, cx.applier, node, wip)?;
                    arena[wip].state_node = Some(node);
                }
            }
        }
        WorkTag::HostText => {
            let Props::Text(text) = arena[wip].pending_props.clone() else {
                return Err(ConsistencyError::StaleFiber.into());
            };
            match (current, arena[wip].state_node) {
                (Some(current), Some(_)) => {
                    if let Props::Text(old) = &arena[current].memoized_props {
                        if **old != *text {
                            arena[wip].flags |= Flags::UPDATE;
                        }
                    }
                }
                _ => {
                    let node = cx.applier.borrow_mut().create_text_instance(&text)?;
                    arena[wip].state_node = Some(node);
                }
            }
        }
        WorkTag::ContextProvider => {
            if let Props::Provider(props) = &arena[wip].pending_props {
                cx.work.contexts.pop(props.context);
            }
        }
        WorkTag::Suspense => {
            if let Some(current) = current {
                let showing = arena[wip].state.showing_fallback();
                let was_showing = arena[current].state.showing_fallback();
                if showing != was_showing {
                    if let Some(offscreen) = arena[wip].child {
                        arena[offscreen].flags |= Flags::VISIBILITY;
                    }
                }
            }
        }
        WorkTag::HostRoot
        | WorkTag::FunctionComponent
        | WorkTag::MemoComponent
        | WorkTag::Fragment
        | WorkTag::Offscreen => {}
    }

    bubble_properties(&mut cx.work.arena, wip);
    Ok(())
}

/// Appends the top-level host nodes below `wip` to the freshly created
/// `parent` node.
fn append_all_children(
    arena: &FiberArena,
    applier: &RefCell<dyn Applier>,
    parent: NodeId,
    wip: FiberId,
) -> Result<(), ReconcileError> {
    let Some(mut node) = arena[wip].child else {
        return Ok(());
    };
    loop {
        let fiber = &arena[node];
        if fiber.tag.is_host() {
            if let Some(child) = fiber.state_node {
                applier.borrow_mut().append_child(parent, child)?;
            }
        } else if let Some(child) = fiber.child {
            node = child;
            continue;
        }
        loop {
            if let Some(sibling) = arena[node].sibling {
                node = sibling;
                break;
            }
            match arena[node].parent {
                Some(parent_fiber) if parent_fiber != wip => node = parent_fiber,
                _ => return Ok(()),
            }
        }
    }
}

/// Collects child lanes and, unless the children were reused as committed,
/// their effect flags. Reused children are re-parented to `wip` either way.
pub(crate) fn bubble_properties(arena: &mut FiberArena, wip: FiberId) {
    let current_child = arena[wip]
        .alternate
        .and_then(|current| arena.get(current))
        .map(|current| current.child);
    let did_bailout = current_child.is_some() && current_child == Some(arena[wip].child);

    let mut child_lanes = Lanes::empty();
    let mut subtree_flags = Flags::empty();
    let mut child = arena[wip].child;
    while let Some(id) = child {
        let fiber = &mut arena[id];
        child_lanes |= fiber.lanes | fiber.child_lanes;
        if !did_bailout {
            subtree_flags |= fiber.subtree_flags | fiber.flags;
        }
        fiber.parent = Some(wip);
        child = fiber.sibling;
    }

    let fiber = &mut arena[wip];
    fiber.child_lanes = child_lanes;
    fiber.subtree_flags |= subtree_flags;
}
