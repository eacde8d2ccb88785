use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Mutable cell returned by `use_ref`.
///
/// The same cell comes back on every render of the owning component, and
/// writing to it never schedules a render.
pub struct HookRef<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for HookRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> HookRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> HookRef<T> {
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for HookRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HookRef").field(&*self.inner.borrow()).finish()
    }
}
