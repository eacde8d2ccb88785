//! Child reconciliation: matches a new child description against the
//! previous child fibers of a work-in-progress fiber, reusing fibers whose
//! key and type match and recording placements and deletions.

use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::fiber::{
    create_fiber_from_element, create_fiber_from_fragment, create_fiber_from_text,
    create_work_in_progress, element_parts, FiberArena, FiberId, Props, WorkTag,
};
use crate::flags::Flags;
use crate::hash::Key;
use crate::lanes::Lanes;
use crate::view::{Element, ElementKind, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MapKey {
    Explicit(Key),
    Index(usize),
}

/// Reconciles `children` under `parent` and returns its new first child.
///
/// With `track_side_effects` off (a parent mounting for the first time)
/// nothing is flagged: the whole subtree is inserted by its topmost
/// placement.
pub(crate) fn reconcile_child_fibers(
    arena: &mut FiberArena,
    parent: FiberId,
    current_first: Option<FiberId>,
    children: &View,
    lanes: Lanes,
    track_side_effects: bool,
) -> Option<FiberId> {
    let mut reconciler = ChildReconciler {
        arena,
        parent,
        lanes,
        track: track_side_effects,
    };
    reconciler.reconcile(current_first, unwrap_top_level_fragment(children))
}

fn unwrap_top_level_fragment(children: &View) -> &View {
    match children {
        View::Element(Element {
            key: None,
            kind: ElementKind::Fragment(inner),
            ..
        }) => inner,
        other => other,
    }
}

struct ChildReconciler<'a> {
    arena: &'a mut FiberArena,
    parent: FiberId,
    lanes: Lanes,
    track: bool,
}

impl ChildReconciler<'_> {
    fn reconcile(&mut self, current_first: Option<FiberId>, children: &View) -> Option<FiberId> {
        match children {
            View::Element(element) => {
                let fiber = self.reconcile_single_element(current_first, element);
                Some(self.place_single_child(fiber))
            }
            View::Text(text) => {
                let fiber = self.reconcile_single_text(current_first, text);
                Some(self.place_single_child(fiber))
            }
            View::List(items) => self.reconcile_children_array(current_first, items),
            View::Empty => {
                self.delete_remaining_children(current_first);
                None
            }
        }
    }

    fn delete_child(&mut self, child: FiberId) {
        if !self.track {
            return;
        }
        let parent = &mut self.arena[self.parent];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, mut child: Option<FiberId>) {
        if !self.track {
            return;
        }
        while let Some(id) = child {
            self.delete_child(id);
            child = self.arena[id].sibling;
        }
    }

    /// Work-in-progress copy of `fiber` for reuse at a new position.
    fn use_fiber(&mut self, fiber: FiberId, props: Props) -> FiberId {
        let clone = create_work_in_progress(self.arena, fiber, props);
        let node = &mut self.arena[clone];
        node.index = 0;
        node.sibling = None;
        node.parent = Some(self.parent);
        clone
    }

    fn adopt(&mut self, fiber: FiberId) -> FiberId {
        self.arena[fiber].parent = Some(self.parent);
        fiber
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        if self.track && self.arena[fiber].alternate.is_none() {
            self.arena[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    /// Records the final index of `fiber` and decides whether the host node
    /// has to move. A reused fiber whose old index is behind the last kept
    /// one is moved; everything else stays in place.
    fn place_child(&mut self, fiber: FiberId, last_placed_index: usize, new_index: usize) -> usize {
        self.arena[fiber].index = new_index;
        if !self.track {
            return last_placed_index;
        }
        let old_index = self.arena[fiber]
            .alternate
            .and_then(|current| self.arena.get(current))
            .map(|current| current.index);
        match old_index {
            Some(old_index) if old_index >= last_placed_index => old_index,
            _ => {
                self.arena[fiber].flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let (_, element_type, props) = element_parts(element);
        let mut child = current_first;
        while let Some(id) = child {
            let next = self.arena[id].sibling;
            if self.arena[id].key == element.key {
                if self.arena[id].element_type.matches(&element_type) {
                    self.delete_remaining_children(next);
                    let existing = self.use_fiber(id, props);
                    let node = &mut self.arena[existing];
                    node.element_type = element_type;
                    node.node_ref = element.node_ref.clone();
                    return existing;
                }
                self.delete_remaining_children(Some(id));
                break;
            }
            self.delete_child(id);
            child = next;
        }
        let created = create_fiber_from_element(self.arena, element, self.lanes);
        self.adopt(created)
    }

    fn reconcile_single_text(&mut self, current_first: Option<FiberId>, text: &Rc<str>) -> FiberId {
        if let Some(first) = current_first {
            if self.arena[first].tag == WorkTag::HostText {
                let next = self.arena[first].sibling;
                self.delete_remaining_children(next);
                return self.use_fiber(first, Props::Text(text.clone()));
            }
        }
        self.delete_remaining_children(current_first);
        let created = create_fiber_from_text(self.arena, text, self.lanes);
        self.adopt(created)
    }

    fn item_key(item: &View, index: usize) -> Option<MapKey> {
        match item {
            View::Empty => None,
            View::Element(element) => Some(
                element
                    .key
                    .map(MapKey::Explicit)
                    .unwrap_or(MapKey::Index(index)),
            ),
            View::Text(_) | View::List(_) => Some(MapKey::Index(index)),
        }
    }

    /// Fiber for one list item, reusing `existing` when it has the same type.
    fn update_slot(&mut self, existing: Option<FiberId>, item: &View) -> Option<FiberId> {
        let fiber = match item {
            View::Empty => return None,
            View::Text(text) => match existing {
                Some(id) if self.arena[id].tag == WorkTag::HostText => {
                    self.use_fiber(id, Props::Text(text.clone()))
                }
                _ => {
                    let created = create_fiber_from_text(self.arena, text, self.lanes);
                    self.adopt(created)
                }
            },
            View::Element(element) => {
                let (_, element_type, props) = element_parts(element);
                match existing {
                    Some(id) if self.arena[id].element_type.matches(&element_type) => {
                        let reused = self.use_fiber(id, props);
                        let node = &mut self.arena[reused];
                        node.element_type = element_type;
                        node.node_ref = element.node_ref.clone();
                        reused
                    }
                    _ => {
                        let created = create_fiber_from_element(self.arena, element, self.lanes);
                        self.adopt(created)
                    }
                }
            }
            View::List(items) => {
                let children = Rc::new(View::List(items.clone()));
                match existing {
                    Some(id)
                        if self.arena[id].tag == WorkTag::Fragment && self.arena[id].key.is_none() =>
                    {
                        self.use_fiber(id, Props::Children(children))
                    }
                    _ => {
                        let created =
                            create_fiber_from_fragment(self.arena, children, None, self.lanes);
                        self.adopt(created)
                    }
                }
            }
        };
        Some(fiber)
    }

    fn reconcile_children_array(
        &mut self,
        current_first: Option<FiberId>,
        items: &[View],
    ) -> Option<FiberId> {
        let mut existing: HashMap<MapKey, FiberId> = HashMap::default();
        let mut old_order: Vec<FiberId> = Vec::new();
        let mut child = current_first;
        while let Some(id) = child {
            let fiber = &self.arena[id];
            let key = fiber
                .key
                .map(MapKey::Explicit)
                .unwrap_or(MapKey::Index(fiber.index));
            existing.insert(key, id);
            old_order.push(id);
            child = fiber.sibling;
        }

        let mut seen: HashSet<Key> = HashSet::default();
        let mut first: Option<FiberId> = None;
        let mut previous: Option<FiberId> = None;
        let mut last_placed_index = 0;

        for (index, item) in items.iter().enumerate() {
            let Some(key) = Self::item_key(item, index) else {
                continue;
            };
            if let MapKey::Explicit(key) = key {
                if !seen.insert(key) {
                    log::warn!("duplicate child key {key:#x}; later siblings are remounted");
                }
            }
            let matched = existing.get(&key).copied();
            let Some(fiber) = self.update_slot(matched, item) else {
                continue;
            };
            if self.track && matched.is_some() && self.arena[fiber].alternate == matched {
                existing.remove(&key);
            }
            last_placed_index = self.place_child(fiber, last_placed_index, index);
            match previous {
                Some(previous) => self.arena[previous].sibling = Some(fiber),
                None => first = Some(fiber),
            }
            previous = Some(fiber);
        }

        if self.track {
            let leftovers: HashSet<FiberId> = existing.into_values().collect();
            for id in old_order {
                if leftovers.contains(&id) {
                    self.delete_child(id);
                }
            }
        }
        first
    }
}

#[cfg(test)]
#[path = "tests/child_fibers_tests.rs"]
mod tests;
