//! View descriptions: the immutable trees components return.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::applier::{HostProps, NodeId, PropValue};
use crate::component::{AnyComponent, ComponentFn, Render};
use crate::context::ContextId;
use crate::hash::{hash_key, Key};
use crate::hooks::Hooks;

/// A description of the children at one tree position.
#[derive(Clone, Default)]
pub enum View {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Vec<View>),
}

impl View {
    pub fn is_empty(&self) -> bool {
        matches!(self, View::Empty)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Empty => f.write_str("Empty"),
            View::Text(text) => f.debug_tuple("Text").field(text).finish(),
            View::Element(element) => element.fmt(f),
            View::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<Element> for View {
    fn from(element: Element) -> Self {
        View::Element(element)
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(Rc::from(text))
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(Rc::from(text))
    }
}

impl From<Vec<View>> for View {
    fn from(items: Vec<View>) -> Self {
        View::List(items)
    }
}

impl<V: Into<View>> From<Option<V>> for View {
    fn from(view: Option<V>) -> Self {
        view.map_or(View::Empty, Into::into)
    }
}

impl FromIterator<View> for View {
    fn from_iter<I: IntoIterator<Item = View>>(iter: I) -> Self {
        View::List(iter.into_iter().collect())
    }
}

/// Handle that receives the host node of the element it is attached to.
///
/// Attached during the layout phase of the commit that mounts the node and
/// cleared during the mutation phase of the commit that removes it.
#[derive(Clone, Default)]
pub struct NodeRef {
    inner: Rc<Cell<Option<NodeId>>>,
}

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NodeId> {
        self.inner.get()
    }

    pub(crate) fn set(&self, node: Option<NodeId>) {
        self.inner.set(node);
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.inner.get()).finish()
    }
}

pub(crate) fn same_ref(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

pub(crate) type PropsCompare = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Props of a host element together with its children.
pub struct HostElement {
    pub(crate) tag: Rc<str>,
    pub(crate) props: HostProps,
    pub(crate) children: View,
}

pub struct ProviderProps {
    pub(crate) context: ContextId,
    pub(crate) value: Rc<dyn Any>,
    pub(crate) same_value: fn(&dyn Any, &dyn Any) -> bool,
    pub(crate) children: View,
}

pub struct SuspenseProps {
    pub(crate) children: View,
    pub(crate) fallback: View,
}

#[derive(Clone)]
pub(crate) enum ElementKind {
    Host(Rc<HostElement>),
    Component {
        component: Rc<dyn AnyComponent>,
        props: Rc<dyn Any>,
    },
    Memo {
        component: Rc<dyn AnyComponent>,
        props: Rc<dyn Any>,
        compare: PropsCompare,
    },
    Fragment(Rc<View>),
    Provider(Rc<ProviderProps>),
    Suspense(Rc<SuspenseProps>),
}

/// One element of a view description.
#[derive(Clone)]
pub struct Element {
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<NodeRef>,
    pub(crate) kind: ElementKind,
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            key: None,
            node_ref: None,
            kind,
        }
    }

    /// Gives the element an identity among its siblings.
    pub fn with_key<K: Hash + ?Sized>(mut self, key: &K) -> Self {
        self.key = Some(hash_key(key));
        self
    }

    pub fn key(&self) -> Option<Key> {
        self.key
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Element");
        out.field("key", &self.key);
        match &self.kind {
            ElementKind::Host(host) => out.field("host", &host.tag).field("children", &host.children),
            ElementKind::Component { component, .. } => out.field("component", &component.name()),
            ElementKind::Memo { component, .. } => out.field("memo", &component.name()),
            ElementKind::Fragment(children) => out.field("fragment", children),
            ElementKind::Provider(provider) => out
                .field("provider", &provider.context)
                .field("children", &provider.children),
            ElementKind::Suspense(suspense) => out
                .field("suspense", &suspense.children)
                .field("fallback", &suspense.fallback),
        };
        out.finish()
    }
}

/// Builder for a host element; see [`host`].
pub struct HostBuilder {
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    tag: Rc<str>,
    props: HostProps,
    children: Vec<View>,
}

impl HostBuilder {
    pub fn key<K: Hash + ?Sized>(mut self, key: &K) -> Self {
        self.key = Some(hash_key(key));
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(Rc::from(name), value.into());
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Adds every item of `children` as one list child, reconciled by key.
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        self.children
            .push(View::List(children.into_iter().map(Into::into).collect()));
        self
    }

    pub fn build(self) -> Element {
        let mut children = self.children;
        let children = if children.len() == 1 {
            children.pop().unwrap_or_default()
        } else if children.is_empty() {
            View::Empty
        } else {
            View::List(children)
        };
        Element {
            key: self.key,
            node_ref: self.node_ref,
            kind: ElementKind::Host(Rc::new(HostElement {
                tag: self.tag,
                props: self.props,
                children,
            })),
        }
    }
}

impl From<HostBuilder> for Element {
    fn from(builder: HostBuilder) -> Self {
        builder.build()
    }
}

impl From<HostBuilder> for View {
    fn from(builder: HostBuilder) -> Self {
        View::Element(builder.build())
    }
}

/// Starts a host element with the given host type tag.
pub fn host(tag: &str) -> HostBuilder {
    HostBuilder {
        key: None,
        node_ref: None,
        tag: Rc::from(tag),
        props: HostProps::new(),
        children: Vec::new(),
    }
}

pub fn text(value: impl Into<Rc<str>>) -> View {
    View::Text(value.into())
}

/// Element for a stateful render function.
pub fn component<P, F>(render: F, props: P) -> Element
where
    P: 'static,
    F: Fn(&mut Hooks<'_>, &P) -> Render + 'static,
{
    Element::new(ElementKind::Component {
        component: Rc::new(ComponentFn::<P, F>::new(render)),
        props: Rc::new(props),
    })
}

/// Like [`component`], but the render is skipped while the new props compare
/// equal to the committed ones and the component has no pending update.
pub fn memo<P, F>(render: F, props: P) -> Element
where
    P: PartialEq + 'static,
    F: Fn(&mut Hooks<'_>, &P) -> Render + 'static,
{
    memo_with(render, props, |a: &P, b: &P| a == b)
}

pub fn memo_with<P, F, C>(render: F, props: P, compare: C) -> Element
where
    P: 'static,
    F: Fn(&mut Hooks<'_>, &P) -> Render + 'static,
    C: Fn(&P, &P) -> bool + 'static,
{
    let compare: PropsCompare = Rc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<P>(), b.downcast_ref::<P>()) {
            (Some(a), Some(b)) => compare(a, b),
            _ => false,
        }
    });
    Element::new(ElementKind::Memo {
        component: Rc::new(ComponentFn::<P, F>::new(render)),
        props: Rc::new(props),
        compare,
    })
}

/// Groups children without a host node. Unkeyed fragments returned directly
/// by a component are spliced into the parent's child list.
pub fn fragment<I>(children: I) -> Element
where
    I: IntoIterator,
    I::Item: Into<View>,
{
    let children = View::List(children.into_iter().map(Into::into).collect());
    Element::new(ElementKind::Fragment(Rc::new(children)))
}

/// Boundary that shows `fallback` while anything in `children` is suspended.
pub fn suspense(fallback: impl Into<View>, children: impl Into<View>) -> Element {
    Element::new(ElementKind::Suspense(Rc::new(SuspenseProps {
        children: children.into(),
        fallback: fallback.into(),
    })))
}

pub(crate) fn provider_element(props: ProviderProps) -> Element {
    Element::new(ElementKind::Provider(Rc::new(props)))
}
