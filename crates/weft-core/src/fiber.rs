//! Fiber nodes and the generational arena that owns them.
//!
//! Every tree position owns at most two slots: the committed (current) fiber
//! and its work-in-progress alternate. Swapping trees is a change of the
//! root's current id; nothing is copied.

use std::any::Any;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::applier::NodeId;
use crate::component::AnyComponent;
use crate::context::ContextId;
use crate::flags::Flags;
use crate::hash::Key;
use crate::hooks::ComponentState;
use crate::lanes::Lanes;
use crate::update_queue::QueueState;
use crate::view::{
    Element, ElementKind, HostElement, NodeRef, PropsCompare, ProviderProps, SuspenseProps, View,
};

/// Generational handle to a fiber slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fiber({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    MemoComponent,
    Fragment,
    ContextProvider,
    Suspense,
    Offscreen,
}

impl WorkTag {
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }

    pub fn is_host_parent(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostRoot)
    }
}

/// What produced a fiber. Used to decide whether an existing fiber can be
/// reused for a new element at the same position.
#[derive(Clone)]
pub(crate) enum ElementType {
    Root,
    Host(Rc<str>),
    Text,
    Component(Rc<dyn AnyComponent>),
    Memo {
        component: Rc<dyn AnyComponent>,
        compare: PropsCompare,
    },
    Fragment,
    Provider(ContextId),
    Suspense,
    Offscreen,
}

impl ElementType {
    pub fn matches(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::Root, ElementType::Root)
            | (ElementType::Text, ElementType::Text)
            | (ElementType::Fragment, ElementType::Fragment)
            | (ElementType::Suspense, ElementType::Suspense)
            | (ElementType::Offscreen, ElementType::Offscreen) => true,
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => {
                a.component_type() == b.component_type()
            }
            (ElementType::Memo { component: a, .. }, ElementType::Memo { component: b, .. }) => {
                a.component_type() == b.component_type()
            }
            (ElementType::Provider(a), ElementType::Provider(b)) => a == b,
            _ => false,
        }
    }

    pub fn provided_context(&self) -> Option<ContextId> {
        match self {
            ElementType::Provider(context) => Some(*context),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<&Rc<dyn AnyComponent>> {
        match self {
            ElementType::Component(component) | ElementType::Memo { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Root => "#root",
            ElementType::Host(_) => "#host",
            ElementType::Text => "#text",
            ElementType::Component(component) | ElementType::Memo { component, .. } => {
                component.name()
            }
            ElementType::Fragment => "#fragment",
            ElementType::Provider(_) => "#provider",
            ElementType::Suspense => "#suspense",
            ElementType::Offscreen => "#offscreen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OffscreenMode {
    Visible,
    Hidden,
}

/// Props of the offscreen wrapper a suspense boundary puts around its
/// primary children.
pub(crate) struct OffscreenProps {
    pub mode: OffscreenMode,
    pub source: Rc<SuspenseProps>,
}

/// Props of a fiber. Identity (pointer equality) is what the begin phase
/// compares; a re-rendered parent always produces new props.
#[derive(Clone, Default)]
pub(crate) enum Props {
    #[default]
    None,
    Host(Rc<HostElement>),
    Text(Rc<str>),
    Component(Rc<dyn Any>),
    Children(Rc<View>),
    Provider(Rc<ProviderProps>),
    Suspense(Rc<SuspenseProps>),
    Offscreen(Rc<OffscreenProps>),
}

impl Props {
    pub fn same(&self, other: &Props) -> bool {
        match (self, other) {
            (Props::None, Props::None) => true,
            (Props::Host(a), Props::Host(b)) => Rc::ptr_eq(a, b),
            (Props::Text(a), Props::Text(b)) => Rc::ptr_eq(a, b),
            (Props::Component(a), Props::Component(b)) => Rc::ptr_eq(a, b),
            (Props::Children(a), Props::Children(b)) => Rc::ptr_eq(a, b),
            (Props::Provider(a), Props::Provider(b)) => Rc::ptr_eq(a, b),
            (Props::Suspense(a), Props::Suspense(b)) => Rc::ptr_eq(a, b),
            (Props::Offscreen(a), Props::Offscreen(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn offscreen_mode(&self) -> Option<OffscreenMode> {
        match self {
            Props::Offscreen(props) => Some(props.mode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SuspenseState {
    pub showing_fallback: bool,
}

/// Per-tag persisted state of a fiber.
#[derive(Clone, Default)]
pub(crate) enum FiberState {
    #[default]
    None,
    Root(QueueState<Rc<View>, View>),
    Component(ComponentState),
    Suspense(SuspenseState),
}

impl FiberState {
    pub fn showing_fallback(&self) -> bool {
        matches!(self, FiberState::Suspense(state) if state.showing_fallback)
    }
}

/// Contexts read by the last render of a fiber.
#[derive(Clone, Default)]
pub(crate) struct Dependencies {
    pub lanes: Lanes,
    pub contexts: SmallVec<[ContextId; 2]>,
}

pub(crate) struct Fiber {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: ElementType,

    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,

    pub pending_props: Props,
    pub memoized_props: Props,
    pub state: FiberState,
    pub state_node: Option<NodeId>,
    pub node_ref: Option<NodeRef>,

    pub alternate: Option<FiberId>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: SmallVec<[FiberId; 2]>,

    pub lanes: Lanes,
    pub child_lanes: Lanes,
    pub dependencies: Dependencies,
}

impl Fiber {
    pub fn new(tag: WorkTag, key: Option<Key>, element_type: ElementType, props: Props) -> Self {
        Self {
            tag,
            key,
            element_type,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props: props,
            memoized_props: Props::None,
            state: FiberState::None,
            state_node: None,
            node_ref: None,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: SmallVec::new(),
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            dependencies: Dependencies::default(),
        }
    }

    pub fn host_root() -> Self {
        let mut fiber = Fiber::new(WorkTag::HostRoot, None, ElementType::Root, Props::None);
        fiber.state = FiberState::Root(QueueState::new(Rc::new(View::Empty)));
        fiber
    }

    pub fn component_state(&self) -> Option<&ComponentState> {
        match &self.state {
            FiberState::Component(state) => Some(state),
            _ => None,
        }
    }

    pub fn component_state_mut(&mut self) -> Option<&mut ComponentState> {
        match &mut self.state {
            FiberState::Component(state) => Some(state),
            _ => None,
        }
    }
}

struct Slot {
    generation: u32,
    fiber: Option<Fiber>,
}

/// Slot storage for fibers. Released slots bump their generation so stale
/// handles held by dispatchers or ping listeners are detected.
#[derive(Default)]
pub(crate) struct FiberArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, fiber: Fiber) -> FiberId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.fiber = Some(fiber);
            FiberId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                fiber: Some(fiber),
            });
            FiberId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_ref())
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_mut())
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn release(&mut self, id: FiberId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.fiber.is_none() {
            return false;
        }
        slot.fiber = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        true
    }

    /// Releases a deleted subtree together with the alternates of its fibers.
    pub fn release_subtree(&mut self, root: FiberId) -> usize {
        let mut released = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.get(id) else {
                continue;
            };
            let mut child = fiber.child;
            let alternate = fiber.alternate;
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).and_then(|f| f.sibling);
            }
            if self.release(id) {
                released += 1;
            }
            if let Some(alternate) = alternate {
                if self.get(alternate).and_then(|f| f.alternate) == Some(id) && self.release(alternate)
                {
                    released += 1;
                }
            }
        }
        released
    }

    /// Keeps fibers reachable from `roots` (and their alternates); releases
    /// everything else. Returns the number of released slots.
    pub fn sweep(&mut self, roots: &[FiberId]) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut stack: Vec<FiberId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.get(id) else {
                continue;
            };
            if marked[id.index as usize] {
                continue;
            }
            marked[id.index as usize] = true;
            if let Some(alternate) = fiber.alternate {
                if self.contains(alternate) {
                    marked[alternate.index as usize] = true;
                }
            }
            if let Some(child) = fiber.child {
                stack.push(child);
            }
            if let Some(sibling) = fiber.sibling {
                stack.push(sibling);
            }
        }

        let mut released = 0;
        for index in 0..self.slots.len() {
            if marked[index] || self.slots[index].fiber.is_none() {
                continue;
            }
            let id = FiberId {
                index: index as u32,
                generation: self.slots[index].generation,
            };
            if self.release(id) {
                released += 1;
            }
        }
        released
    }

    /// Adds `lanes` to the pending lanes of a fiber and its alternate.
    pub fn mark_lanes(&mut self, id: FiberId, lanes: Lanes) {
        self[id].lanes |= lanes;
        if let Some(alternate) = self[id].alternate {
            if let Some(fiber) = self.get_mut(alternate) {
                fiber.lanes |= lanes;
            }
        }
    }

    /// Marks `lane` on `id` and every ancestor's child lanes, on both copies
    /// of each fiber. Returns the host root reached, or `None` when the fiber
    /// is no longer part of a mounted tree.
    pub fn mark_update_lane_to_root(&mut self, id: FiberId, lane: Lanes) -> Option<FiberId> {
        let fiber = self.get_mut(id)?;
        fiber.lanes |= lane;
        let mut parent = fiber.parent;
        if let Some(alternate) = fiber.alternate {
            if let Some(alternate) = self.get_mut(alternate) {
                alternate.lanes |= lane;
            }
        }
        let mut node = id;
        while let Some(parent_id) = parent {
            let fiber = self.get_mut(parent_id)?;
            fiber.child_lanes |= lane;
            parent = fiber.parent;
            if let Some(alternate) = fiber.alternate {
                if let Some(alternate) = self.get_mut(alternate) {
                    alternate.child_lanes |= lane;
                }
            }
            node = parent_id;
        }
        (self.get(node)?.tag == WorkTag::HostRoot).then_some(node)
    }

    /// Fibers whose slot is still allocated, in slot order. Test helper.
    #[cfg(test)]
    pub fn live_ids(&self) -> Vec<FiberId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.fiber.is_some())
            .map(|(index, slot)| FiberId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

impl Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        match self.get(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber handle {id:?}"),
        }
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        match self.get_mut(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber handle {id:?}"),
        }
    }
}

/// Returns the alternate of `current`, creating or resetting it for a new
/// render with `pending_props`.
pub(crate) fn create_work_in_progress(
    arena: &mut FiberArena,
    current: FiberId,
    pending_props: Props,
) -> FiberId {
    let existing = arena[current].alternate.filter(|id| arena.contains(*id));
    let wip = match existing {
        Some(wip) => {
            let element_type = arena[current].element_type.clone();
            let fiber = &mut arena[wip];
            fiber.pending_props = pending_props;
            fiber.element_type = element_type;
            fiber.flags = Flags::empty();
            fiber.subtree_flags = Flags::empty();
            fiber.deletions.clear();
            wip
        }
        None => {
            let source = &arena[current];
            let mut fiber = Fiber::new(
                source.tag,
                source.key,
                source.element_type.clone(),
                pending_props,
            );
            fiber.state_node = source.state_node;
            fiber.alternate = Some(current);
            let wip = arena.alloc(fiber);
            arena[current].alternate = Some(wip);
            wip
        }
    };

    let source = &arena[current];
    let lanes = source.lanes;
    let child_lanes = source.child_lanes;
    let child = source.child;
    let sibling = source.sibling;
    let index = source.index;
    let memoized_props = source.memoized_props.clone();
    let state = source.state.clone();
    let dependencies = source.dependencies.clone();
    let node_ref = source.node_ref.clone();
    let state_node = source.state_node;

    let fiber = &mut arena[wip];
    fiber.lanes = lanes;
    fiber.child_lanes = child_lanes;
    fiber.child = child;
    fiber.sibling = sibling;
    fiber.index = index;
    fiber.memoized_props = memoized_props;
    fiber.state = state;
    fiber.dependencies = dependencies;
    fiber.node_ref = node_ref;
    fiber.state_node = state_node;
    wip
}

/// Splits an element into the fiber tag, element type and props it produces.
pub(crate) fn element_parts(element: &Element) -> (WorkTag, ElementType, Props) {
    match &element.kind {
        ElementKind::Host(host) => (
            WorkTag::HostComponent,
            ElementType::Host(host.tag.clone()),
            Props::Host(host.clone()),
        ),
        ElementKind::Component { component, props } => (
            WorkTag::FunctionComponent,
            ElementType::Component(component.clone()),
            Props::Component(props.clone()),
        ),
        ElementKind::Memo {
            component,
            props,
            compare,
        } => (
            WorkTag::MemoComponent,
            ElementType::Memo {
                component: component.clone(),
                compare: compare.clone(),
            },
            Props::Component(props.clone()),
        ),
        ElementKind::Fragment(children) => (
            WorkTag::Fragment,
            ElementType::Fragment,
            Props::Children(children.clone()),
        ),
        ElementKind::Provider(provider) => (
            WorkTag::ContextProvider,
            ElementType::Provider(provider.context),
            Props::Provider(provider.clone()),
        ),
        ElementKind::Suspense(suspense) => (
            WorkTag::Suspense,
            ElementType::Suspense,
            Props::Suspense(suspense.clone()),
        ),
    }
}

pub(crate) fn create_fiber_from_element(
    arena: &mut FiberArena,
    element: &Element,
    lanes: Lanes,
) -> FiberId {
    let (tag, element_type, props) = element_parts(element);
    let mut fiber = Fiber::new(tag, element.key, element_type, props);
    fiber.lanes = lanes;
    fiber.node_ref = element.node_ref.clone();
    arena.alloc(fiber)
}

pub(crate) fn create_fiber_from_text(
    arena: &mut FiberArena,
    text: &Rc<str>,
    lanes: Lanes,
) -> FiberId {
    let mut fiber = Fiber::new(
        WorkTag::HostText,
        None,
        ElementType::Text,
        Props::Text(text.clone()),
    );
    fiber.lanes = lanes;
    arena.alloc(fiber)
}

pub(crate) fn create_fiber_from_fragment(
    arena: &mut FiberArena,
    children: Rc<View>,
    key: Option<Key>,
    lanes: Lanes,
) -> FiberId {
    let mut fiber = Fiber::new(
        WorkTag::Fragment,
        key,
        ElementType::Fragment,
        Props::Children(children),
    );
    fiber.lanes = lanes;
    arena.alloc(fiber)
}

pub(crate) fn create_fiber_from_offscreen(
    arena: &mut FiberArena,
    props: Rc<OffscreenProps>,
    lanes: Lanes,
) -> FiberId {
    let mut fiber = Fiber::new(
        WorkTag::Offscreen,
        None,
        ElementType::Offscreen,
        Props::Offscreen(props),
    );
    fiber.lanes = lanes;
    arena.alloc(fiber)
}

#[cfg(test)]
#[path = "tests/fiber_tests.rs"]
mod tests;
