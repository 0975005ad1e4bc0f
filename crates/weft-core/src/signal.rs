//! Reactive value primitive consumed by the reconcilers.
//!
//! Writes notify observers synchronously and in registration order. The value
//! borrow is released before observers run, so an observer may read or write
//! the signal it is attached to. Such a nested write notifies every observer
//! with the newer value and ends the outer pass, so no observer is handed a
//! value the signal no longer holds.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type ObserverId = u64;

struct Observer<T> {
    id: ObserverId,
    callback: Rc<dyn Fn(&T)>,
}

struct SignalInner<T> {
    value: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
    next_observer: Cell<ObserverId>,
    version: Cell<u64>,
    upstream: RefCell<Vec<Subscription>>,
}

trait ObserverRegistry {
    fn remove_observer(&self, id: ObserverId);
}

impl<T> ObserverRegistry for SignalInner<T> {
    fn remove_observer(&self, id: ObserverId) {
        self.observers.borrow_mut().retain(|observer| observer.id != id);
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        for subscription in self.upstream.get_mut().drain(..) {
            subscription.unsubscribe();
        }
    }
}

pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Signal<T> {}

impl<T: Clone + 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                observers: RefCell::new(Vec::new()),
                next_observer: Cell::new(1),
                version: Cell::new(0),
                upstream: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.bump();
        self.notify();
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.bump();
        self.notify();
        result
    }

    /// Registers `callback` to run after every write. The returned
    /// [`Subscription`] removes it again.
    pub fn observe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_observer.get();
        self.inner.next_observer.set(id + 1);
        self.inner.observers.borrow_mut().push(Observer {
            id,
            callback: Rc::new(callback),
        });
        let registry: Rc<dyn ObserverRegistry> = self.inner.clone();
        Subscription {
            source: Some(Rc::downgrade(&registry)),
            id,
        }
    }

    /// Derives a signal that follows this one through `f`. The derived
    /// signal keeps its upstream subscription until it is dropped.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Signal<U> {
        let derived = Signal::new(self.with(&f));
        let target = Rc::downgrade(&derived.inner);
        let subscription = self.observe(move |value| {
            if let Some(inner) = target.upgrade() {
                Signal { inner }.set(f(value));
            }
        });
        derived.inner.upstream.borrow_mut().push(subscription);
        derived
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    fn bump(&self) {
        self.inner.version.set(self.inner.version.get().wrapping_add(1));
    }

    fn notify(&self) {
        let snapshot: Vec<(ObserverId, Rc<dyn Fn(&T)>)> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|observer| (observer.id, Rc::clone(&observer.callback)))
            .collect();
        if snapshot.is_empty() {
            return;
        }
        let version = self.inner.version.get();
        let value = self.get();
        for (id, callback) in snapshot {
            if self.inner.version.get() != version {
                // A nested write already delivered the newer value to everyone.
                break;
            }
            // Observers removed by an earlier callback in this pass are skipped.
            let live = self
                .inner
                .observers
                .borrow()
                .iter()
                .any(|observer| observer.id == id);
            if live {
                callback(&value);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.value.borrow())
            .field("observers", &self.inner.observers.borrow().len())
            .finish()
    }
}

/// Handle returned by [`Signal::observe`].
#[must_use = "dropping a Subscription keeps the observer registered; call unsubscribe() to remove it"]
pub struct Subscription {
    source: Option<Weak<dyn ObserverRegistry>>,
    id: ObserverId,
}

impl Subscription {
    /// Removes the observer. Safe to call after the signal is gone.
    pub fn unsubscribe(mut self) {
        if let Some(source) = self.source.take().and_then(|weak| weak.upgrade()) {
            source.remove_observer(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
