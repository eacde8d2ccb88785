//! Single-threaded wakeables that let a render suspend until data arrives.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ComponentError, Throw};

static NEXT_WAKEABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_wakeable_id() -> u64 {
    NEXT_WAKEABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Something a suspended render can wait on.
pub trait Wakeable {
    /// Stable identity used to deduplicate ping listeners.
    fn wakeable_id(&self) -> u64;

    fn is_settled(&self) -> bool;

    /// Registers `listener` to run once the wakeable settles. Runs it
    /// immediately when already settled.
    fn on_settle(&self, listener: Box<dyn FnOnce()>);
}

/// Payload of [`Throw::Suspended`].
#[derive(Clone)]
pub struct Suspended {
    wakeable: Rc<dyn Wakeable>,
}

impl Suspended {
    pub fn new(wakeable: Rc<dyn Wakeable>) -> Self {
        Self { wakeable }
    }

    pub fn wakeable(&self) -> &Rc<dyn Wakeable> {
        &self.wakeable
    }
}

impl fmt::Debug for Suspended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspended")
            .field("wakeable", &self.wakeable.wakeable_id())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ResourceState<T> {
    Pending,
    Ready(T),
    Failed(ComponentError),
}

struct ResourceInner<T> {
    id: u64,
    state: RefCell<ResourceState<T>>,
    listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<T> ResourceInner<T> {
    fn settle(&self, state: ResourceState<T>) {
        {
            let mut current = self.state.borrow_mut();
            if !matches!(*current, ResourceState::Pending) {
                log::warn!("resource {} settled twice; keeping the first value", self.id);
                return;
            }
            *current = state;
        }
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }
}

impl<T> Wakeable for ResourceInner<T> {
    fn wakeable_id(&self) -> u64 {
        self.id
    }

    fn is_settled(&self) -> bool {
        !matches!(*self.state.borrow(), ResourceState::Pending)
    }

    fn on_settle(&self, listener: Box<dyn FnOnce()>) {
        if self.is_settled() {
            listener();
        } else {
            self.listeners.borrow_mut().push(listener);
        }
    }
}

/// A value that becomes available later.
///
/// Reading a pending resource from a render returns [`Throw::Suspended`], so
/// the nearest suspense boundary shows its fallback until the resource
/// settles and the root retries.
pub struct Resource<T> {
    inner: Rc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Resource<T> {
    pub fn pending() -> Self {
        Self::with_state(ResourceState::Pending)
    }

    pub fn ready(value: T) -> Self {
        Self::with_state(ResourceState::Ready(value))
    }

    fn with_state(state: ResourceState<T>) -> Self {
        Self {
            inner: Rc::new(ResourceInner {
                id: next_wakeable_id(),
                state: RefCell::new(state),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn resolve(&self, value: T) {
        self.inner.settle(ResourceState::Ready(value));
    }

    pub fn reject(&self, error: impl Into<ComponentError>) {
        self.inner.settle(ResourceState::Failed(error.into()));
    }

    pub fn is_pending(&self) -> bool {
        !self.inner.is_settled()
    }

    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// Reads the value or produces the throw a render should propagate.
    pub fn read(&self) -> Result<T, Throw> {
        match &*self.inner.state.borrow() {
            ResourceState::Ready(value) => Ok(value.clone()),
            ResourceState::Failed(error) => Err(Throw::Error(error.clone())),
            ResourceState::Pending => {
                let wakeable: Rc<dyn Wakeable> = self.inner.clone();
                Err(Throw::Suspended(Suspended::new(wakeable)))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/resource_tests.rs"]
mod tests;
