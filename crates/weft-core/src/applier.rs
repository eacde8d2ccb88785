//! Host mutation contract and an in-memory host used by tests and tools.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::NodeError;

/// Handle to a host resource. Owned by the host; the engine only stores it.
pub type NodeId = usize;

/// A single host property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Host element properties, ordered by name so dumps are stable.
pub type HostProps = BTreeMap<Rc<str>, PropValue>;

/// Host mutation backend.
///
/// Every call maps one-to-one onto a mutation the commit phase decided on;
/// the engine never retries a failed call.
pub trait Applier: Any {
    fn create_instance(&mut self, tag: &str, props: &HostProps) -> Result<NodeId, NodeError>;
    fn create_text_instance(&mut self, text: &str) -> Result<NodeId, NodeError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError>;
    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), NodeError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError>;
    fn commit_update(
        &mut self,
        id: NodeId,
        old_props: &HostProps,
        new_props: &HostProps,
    ) -> Result<(), NodeError>;
    fn commit_text_update(&mut self, id: NodeId, old: &str, new: &str) -> Result<(), NodeError>;

    fn hide_instance(&mut self, _id: NodeId) -> Result<(), NodeError> {
        Ok(())
    }

    fn unhide_instance(&mut self, _id: NodeId) -> Result<(), NodeError> {
        Ok(())
    }

    fn hide_text_instance(&mut self, _id: NodeId) -> Result<(), NodeError> {
        Ok(())
    }

    fn unhide_text_instance(&mut self, _id: NodeId) -> Result<(), NodeError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any
    where
        Self: Sized,
    {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any
    where
        Self: Sized,
    {
        self
    }
}

/// One recorded host call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateInstance { id: NodeId, tag: Rc<str> },
    CreateText { id: NodeId, text: String },
    AppendChild { parent: NodeId, child: NodeId },
    InsertBefore { parent: NodeId, child: NodeId, before: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    CommitUpdate { id: NodeId },
    CommitTextUpdate { id: NodeId, text: String },
    Hide { id: NodeId },
    Unhide { id: NodeId },
}

impl HostOp {
    /// True for calls issued by the commit phase, as opposed to instance
    /// creation during render.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, HostOp::CreateInstance { .. } | HostOp::CreateText { .. })
    }
}

#[derive(Debug, Clone)]
enum MemoryNodeKind {
    Container,
    Element { tag: Rc<str>, props: HostProps },
    Text(String),
}

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: MemoryNodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            hidden: false,
        }
    }
}

/// In-memory host that keeps a node table and a log of every call.
#[derive(Default)]
pub struct MemoryApplier {
    nodes: Vec<Option<MemoryNode>>,
    ops: Vec<HostOp>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached container node to mount a root into.
    pub fn create_container(&mut self) -> NodeId {
        self.insert(MemoryNode::new(MemoryNodeKind::Container))
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], NodeError> {
        Ok(&self.node(id)?.children)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, NodeError> {
        Ok(self.node(id)?.parent)
    }

    pub fn tag(&self, id: NodeId) -> Result<&str, NodeError> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Element { tag, .. } => Ok(tag),
            _ => Err(NodeError::TypeMismatch {
                id,
                expected: "element",
            }),
        }
    }

    pub fn props(&self, id: NodeId) -> Result<&HostProps, NodeError> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Element { props, .. } => Ok(props),
            _ => Err(NodeError::TypeMismatch {
                id,
                expected: "element",
            }),
        }
    }

    pub fn text(&self, id: NodeId) -> Result<&str, NodeError> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Text(text) => Ok(text),
            _ => Err(NodeError::TypeMismatch { id, expected: "text" }),
        }
    }

    pub fn is_hidden(&self, id: NodeId) -> Result<bool, NodeError> {
        Ok(self.node(id)?.hidden)
    }

    /// Concatenated text of every visible text node below `id`, in order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        let Some(Some(node)) = self.nodes.get(id) else {
            return;
        };
        if node.hidden {
            return;
        }
        if let MemoryNodeKind::Text(text) = &node.kind {
            output.push_str(text);
        }
        for &child in &node.children {
            self.collect_text(child, output);
        }
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(Some(node)) = self.nodes.get(id) else {
            output.push_str(&format!("{indent}[{id}] (missing)\n"));
            return;
        };
        let hidden = if node.hidden { " hidden" } else { "" };
        match &node.kind {
            MemoryNodeKind::Container => output.push_str(&format!("{indent}[{id}] #root\n")),
            MemoryNodeKind::Element { tag, props } => {
                let props = props
                    .iter()
                    .map(|(name, value)| format!(" {name}={value}"))
                    .collect::<String>();
                output.push_str(&format!("{indent}[{id}] <{tag}{props}>{hidden}\n"));
            }
            MemoryNodeKind::Text(text) => {
                output.push_str(&format!("{indent}[{id}] {text:?}{hidden}\n"))
            }
        }
        for &child in &node.children {
            self.dump_node(output, child, depth + 1);
        }
    }

    fn insert(&mut self, node: MemoryNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, NodeError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(NodeError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, NodeError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(NodeError::Missing { id })
    }

    fn detach(&mut self, child: NodeId) -> Result<(), NodeError> {
        if let Some(parent) = self.node(child)?.parent {
            self.node_mut(parent)?.children.retain(|&c| c != child);
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.release(child);
        }
    }

    fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<(), NodeError> {
        self.node_mut(id)?.hidden = hidden;
        let op = if hidden {
            HostOp::Hide { id }
        } else {
            HostOp::Unhide { id }
        };
        self.ops.push(op);
        Ok(())
    }
}

impl Applier for MemoryApplier {
    fn create_instance(&mut self, tag: &str, props: &HostProps) -> Result<NodeId, NodeError> {
        let tag: Rc<str> = Rc::from(tag);
        let id = self.insert(MemoryNode::new(MemoryNodeKind::Element {
            tag: tag.clone(),
            props: props.clone(),
        }));
        self.ops.push(HostOp::CreateInstance { id, tag });
        Ok(id)
    }

    fn create_text_instance(&mut self, text: &str) -> Result<NodeId, NodeError> {
        let id = self.insert(MemoryNode::new(MemoryNodeKind::Text(text.to_owned())));
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        Ok(id)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        self.node(parent)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), NodeError> {
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings
            .iter()
            .position(|&c| c == before)
            .ok_or(NodeError::MissingContext {
                id: before,
                reason: "insert_before reference is not a child of the parent",
            })?;
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings
            .iter()
            .position(|&c| c == child)
            .ok_or(NodeError::MissingContext {
                id: child,
                reason: "remove_child target is not a child of the parent",
            })?;
        siblings.remove(index);
        self.release(child);
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn commit_update(
        &mut self,
        id: NodeId,
        _old_props: &HostProps,
        new_props: &HostProps,
    ) -> Result<(), NodeError> {
        match &mut self.node_mut(id)?.kind {
            MemoryNodeKind::Element { props, .. } => *props = new_props.clone(),
            _ => {
                return Err(NodeError::TypeMismatch {
                    id,
                    expected: "element",
                })
            }
        }
        self.ops.push(HostOp::CommitUpdate { id });
        Ok(())
    }

    fn commit_text_update(&mut self, id: NodeId, _old: &str, new: &str) -> Result<(), NodeError> {
        match &mut self.node_mut(id)?.kind {
            MemoryNodeKind::Text(text) => *text = new.to_owned(),
            _ => return Err(NodeError::TypeMismatch { id, expected: "text" }),
        }
        self.ops.push(HostOp::CommitTextUpdate {
            id,
            text: new.to_owned(),
        });
        Ok(())
    }

    fn hide_instance(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.set_hidden(id, true)
    }

    fn unhide_instance(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.set_hidden(id, false)
    }

    fn hide_text_instance(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.set_hidden(id, true)
    }

    fn unhide_text_instance(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.set_hidden(id, false)
    }
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
