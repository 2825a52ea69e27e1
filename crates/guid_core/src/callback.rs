//! Callback handles stored in registry entries.
//!
//! Callbacks are reference-counted closures compared by identity: the same
//! handle (or a clone of it) passed to
//! [`GuidRegistry::resolve`](crate::GuidRegistry::resolve) is what
//! [`GuidRegistry::unsubscribe`](crate::GuidRegistry::unsubscribe) later
//! removes. Two handles wrapping identical closures are still distinct.

use std::fmt;
use std::rc::Rc;

/// Invoked with the entity when one is bound to the watched identifier.
pub struct OnAdd<E>(Rc<dyn Fn(&Rc<E>)>);

impl<E> OnAdd<E> {
    /// Wrap a closure in a new callback handle.
    pub fn new(f: impl Fn(&Rc<E>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, entity: &Rc<E>) {
        (self.0)(entity);
    }
}

impl<E> Clone for OnAdd<E> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<E> PartialEq for OnAdd<E> {
    fn eq(&self, other: &Self) -> bool {
        same_allocation(&self.0, &other.0)
    }
}

impl<E> Eq for OnAdd<E> {}

impl<E> fmt::Debug for OnAdd<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OnAdd")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Invoked when the entity bound to the watched identifier goes away.
#[derive(Clone)]
pub struct OnRemove(Rc<dyn Fn()>);

impl OnRemove {
    /// Wrap a closure in a new callback handle.
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self) {
        (self.0)();
    }
}

impl PartialEq for OnRemove {
    fn eq(&self, other: &Self) -> bool {
        same_allocation(&self.0, &other.0)
    }
}

impl Eq for OnRemove {}

impl fmt::Debug for OnRemove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OnRemove")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// Compares data addresses only; vtable pointers are not unique per type.
fn same_allocation<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>())
}
