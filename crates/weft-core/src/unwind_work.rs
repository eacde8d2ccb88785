//! Suspension: routing a suspended render to the nearest boundary and
//! unwinding the incomplete fibers above it.

use crate::fiber::{FiberArena, FiberId, Props, WorkTag};
use crate::flags::Flags;
use crate::resource::Suspended;
use crate::work_loop::RenderCx;

/// Marks `source` incomplete, asks the nearest suspense boundary whose
/// primary children contain `source` to capture, and registers a ping for
/// the wakeable.
pub(crate) fn throw_suspended(cx: &mut RenderCx<'_>, source: FiberId, suspended: Suspended) {
    let lanes = cx.work.render_lanes;
    let arena = &mut cx.work.arena;
    arena[source].flags |= Flags::INCOMPLETE;

    let boundary = nearest_capturing_boundary(arena, source);
    match boundary {
        Some(boundary) => {
            log::debug!(
                "{source:?} suspended on wakeable {}; boundary {boundary:?} captures",
                suspended.wakeable().wakeable_id()
            );
            arena[boundary].flags |= Flags::SHOULD_CAPTURE;
        }
        None => log::debug!(
            "{source:?} suspended on wakeable {} with no boundary; root suspends",
            suspended.wakeable().wakeable_id()
        ),
    }

    if let Some(root) = cx.sink.upgrade() {
        root.attach_ping(suspended.wakeable().clone(), lanes, boundary);
    }
}

/// A boundary only captures throws from its primary (offscreen) child. A
/// throw from inside its fallback passes on to the boundaries above it.
fn nearest_capturing_boundary(arena: &FiberArena, source: FiberId) -> Option<FiberId> {
    let mut child = source;
    let mut node = arena[source].parent;
    while let Some(id) = node {
        let fiber = &arena[id];
        if fiber.tag == WorkTag::Suspense
            && arena[child].tag == WorkTag::Offscreen
            && !fiber.flags.contains(Flags::DID_CAPTURE)
        {
            return Some(id);
        }
        child = id;
        node = fiber.parent;
    }
    None
}

/// Undoes the begin-phase side effects of an incomplete fiber. Returns the
/// fiber itself when it is a boundary that captured, so its fallback can be
/// rendered.
pub(crate) fn unwind_work(cx: &mut RenderCx<'_>, wip: FiberId) -> Option<FiberId> {
    let arena = &mut cx.work.arena;
    match arena[wip].tag {
        WorkTag::Suspense => {
            let flags = arena[wip].flags;
            if flags.contains(Flags::SHOULD_CAPTURE) {
                arena[wip].flags = (flags - Flags::SHOULD_CAPTURE) | Flags::DID_CAPTURE;
                return Some(wip);
            }
            None
        }
        WorkTag::ContextProvider => {
            if let Props::Provider(props) = &arena[wip].pending_props {
                cx.work.contexts.pop(props.context);
            }
            None
        }
        WorkTag::HostRoot => {
            cx.work.contexts.clear();
            None
        }
        _ => None,
    }
}
