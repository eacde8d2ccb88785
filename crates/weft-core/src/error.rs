use std::fmt;

use crate::applier::NodeId;
use crate::resource::Suspended;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Missing { id: NodeId },
    TypeMismatch { id: NodeId, expected: &'static str },
    MissingContext { id: NodeId, reason: &'static str },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Missing { id } => write!(f, "node {id} missing"),
            NodeError::TypeMismatch { id, expected } => {
                write!(f, "node {id} type mismatch; expected {expected}")
            }
            NodeError::MissingContext { id, reason } => {
                write!(f, "missing context for node {id}: {reason}")
            }
        }
    }
}

impl std::error::Error for NodeError {}

/// A broken engine invariant. The root that produced it is poisoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    HookCountMismatch {
        component: &'static str,
        expected: usize,
        rendered: usize,
    },
    HookKindMismatch {
        component: &'static str,
        index: usize,
    },
    MissingHostParent,
    CommitWithoutLane,
    StaleFiber,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyError::HookCountMismatch {
                component,
                expected,
                rendered,
            } => write!(
                f,
                "{component} rendered {rendered} hooks, previous render had {expected}"
            ),
            ConsistencyError::HookKindMismatch { component, index } => {
                write!(f, "{component} changed the kind of hook #{index} between renders")
            }
            ConsistencyError::MissingHostParent => {
                f.write_str("placement found no host parent above the fiber")
            }
            ConsistencyError::CommitWithoutLane => {
                f.write_str("commit requested without a render lane")
            }
            ConsistencyError::StaleFiber => f.write_str("fiber handle refers to a released slot"),
        }
    }
}

impl std::error::Error for ConsistencyError {}

/// Failure raised by a component's render function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentError {
    message: String,
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ComponentError {}

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Non-local exit from a component render.
#[derive(Clone)]
pub enum Throw {
    /// A resource the render depends on is still pending.
    Suspended(Suspended),
    Error(ComponentError),
}

impl fmt::Debug for Throw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throw::Suspended(suspended) => f.debug_tuple("Suspended").field(suspended).finish(),
            Throw::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

impl From<ComponentError> for Throw {
    fn from(error: ComponentError) -> Self {
        Throw::Error(error)
    }
}

impl From<Suspended> for Throw {
    fn from(suspended: Suspended) -> Self {
        Throw::Suspended(suspended)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    Consistency(ConsistencyError),
    Render(ComponentError),
    Host(NodeError),
    RootUnmounted,
    RootPoisoned,
    NestedUpdateLimit { limit: usize },
}

impl ReconcileError {
    /// Errors after which the committed tree can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconcileError::Consistency(_) | ReconcileError::Host(_))
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Consistency(error) => write!(f, "consistency violation: {error}"),
            ReconcileError::Render(error) => write!(f, "render failed: {error}"),
            ReconcileError::Host(error) => write!(f, "host mutation failed: {error}"),
            ReconcileError::RootUnmounted => f.write_str("root has been unmounted"),
            ReconcileError::RootPoisoned => {
                f.write_str("root is poisoned by an earlier fatal error")
            }
            ReconcileError::NestedUpdateLimit { limit } => write!(
                f,
                "more than {limit} nested synchronous updates scheduled from commit"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Consistency(error) => Some(error),
            ReconcileError::Render(error) => Some(error),
            ReconcileError::Host(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ConsistencyError> for ReconcileError {
    fn from(error: ConsistencyError) -> Self {
        ReconcileError::Consistency(error)
    }
}

impl From<NodeError> for ReconcileError {
    fn from(error: NodeError) -> Self {
        ReconcileError::Host(error)
    }
}
