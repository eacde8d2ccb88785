//! Context values: providers push onto a per-render stack, readers record a
//! dependency so a changed value only re-renders the components that read it.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fiber::{FiberArena, FiberId, WorkTag};
use crate::lanes::Lanes;
use crate::view::{provider_element, Element, ProviderProps, View};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// A context created with [`create_context`].
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id).finish()
    }
}

pub fn create_context<T: PartialEq + 'static>(default: T) -> Context<T> {
    Context {
        id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
        default: Rc::new(default),
    }
}

fn same_value<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl<T: PartialEq + 'static> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Provides `value` to every reader below `children`.
    pub fn provider(&self, value: T, children: impl Into<View>) -> Element {
        provider_element(ProviderProps {
            context: self.id,
            value: Rc::new(value),
            same_value: same_value::<T>,
            children: children.into(),
        })
    }

    pub(crate) fn default_value(&self) -> Rc<T> {
        Rc::clone(&self.default)
    }
}

/// Values pushed by providers on the path from the root to the fiber being
/// rendered.
#[derive(Default)]
pub(crate) struct ContextStack {
    entries: Vec<(ContextId, Rc<dyn Any>)>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, context: ContextId, value: Rc<dyn Any>) {
        self.entries.push((context, value));
    }

    pub(crate) fn pop(&mut self, context: ContextId) {
        let popped = self.entries.pop();
        debug_assert!(
            matches!(popped, Some((id, _)) if id == context),
            "context stack popped out of order"
        );
    }

    pub(crate) fn read(&self, context: ContextId) -> Option<&Rc<dyn Any>> {
        self.entries
            .iter()
            .rev()
            .find(|(id, _)| *id == context)
            .map(|(_, value)| value)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Marks every fiber below `provider` that read `context` with
/// `render_lanes`, and the path above it up to the provider. Stops at nested
/// providers of the same context.
pub(crate) fn propagate_context_change(
    arena: &mut FiberArena,
    provider: FiberId,
    context: ContextId,
    render_lanes: Lanes,
) {
    let mut fiber = arena[provider].child;
    if let Some(child) = fiber {
        arena[child].parent = Some(provider);
    }
    while let Some(id) = fiber {
        let reads_context = arena[id].dependencies.contexts.contains(&context);
        let next = if reads_context {
            arena.mark_lanes(id, render_lanes);
            arena[id].dependencies.lanes |= render_lanes;
            if let Some(alternate) = arena[id].alternate {
                arena[alternate].dependencies.lanes |= render_lanes;
            }
            let parent = arena[id].parent;
            schedule_work_on_parent_path(arena, parent, render_lanes, provider);
            arena[id].child
        } else if arena[id].tag == WorkTag::ContextProvider
            && arena[id].element_type.provided_context() == Some(context)
        {
            None
        } else {
            arena[id].child
        };

        fiber = match next {
            Some(child) => {
                arena[child].parent = Some(id);
                Some(child)
            }
            None => {
                let mut node = id;
                loop {
                    if node == provider {
                        break None;
                    }
                    if let Some(sibling) = arena[node].sibling {
                        arena[sibling].parent = arena[node].parent;
                        break Some(sibling);
                    }
                    match arena[node].parent {
                        Some(parent) => node = parent,
                        None => break None,
                    }
                }
            }
        };
    }
}

fn schedule_work_on_parent_path(
    arena: &mut FiberArena,
    mut parent: Option<FiberId>,
    lanes: Lanes,
    until: FiberId,
) {
    while let Some(id) = parent {
        arena[id].child_lanes |= lanes;
        if let Some(alternate) = arena[id].alternate {
            arena[alternate].child_lanes |= lanes;
        }
        if id == until {
            break;
        }
        parent = arena[id].parent;
    }
}
