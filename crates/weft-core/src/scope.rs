//! Ownership record of a unit: cleanups, child units and attachment state.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;

use crate::{NodeId, Unit, UnitId, WeakUnit};

pub type Cleanup = Box<dyn FnOnce() + 'static>;
type AttachCallback = Box<dyn FnOnce(NodeId) + 'static>;

/// One slot in a scope's teardown order. Child slots are dropped again when
/// the child leaves through [`Scope::remove_child`].
enum CleanupEntry {
    Callback(Cleanup),
    Child(UnitId),
}

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

struct ScopeInner {
    id: ScopeId,
    cleanups: RefCell<Vec<CleanupEntry>>,
    children: RefCell<IndexMap<UnitId, Unit>>,
    destroyed: Cell<bool>,
    parent: RefCell<Option<WeakUnit>>,
    attached_node: Cell<Option<NodeId>>,
    on_attached: RefCell<Option<AttachCallback>>,
}

#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                id: ScopeId::next(),
                cleanups: RefCell::new(Vec::new()),
                children: RefCell::new(IndexMap::new()),
                destroyed: Cell::new(false),
                parent: RefCell::new(None),
                attached_node: Cell::new(None),
                on_attached: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached_node.get().is_some()
    }

    pub fn attached_node(&self) -> Option<NodeId> {
        self.inner.attached_node.get()
    }

    pub fn parent(&self) -> Option<Unit> {
        self.inner.parent.borrow().as_ref().and_then(WeakUnit::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Unit>) {
        *self.inner.parent.borrow_mut() = parent.map(Unit::downgrade);
    }

    pub fn children(&self) -> Vec<Unit> {
        self.inner.children.borrow().values().cloned().collect()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    /// Queues `cleanup` for [`destroy`](Self::destroy). On a destroyed scope
    /// the cleanup runs immediately instead.
    pub fn track(&self, cleanup: impl FnOnce() + 'static) {
        if self.is_destroyed() {
            log::warn!(
                "{} already destroyed; running late cleanup immediately",
                self.inner.id
            );
            run_cleanup(self.inner.id, 0, cleanup);
            return;
        }
        self.inner
            .cleanups
            .borrow_mut()
            .push(CleanupEntry::Callback(Box::new(cleanup)));
    }

    /// Registers `unit` as a child torn down with this scope and, when this
    /// scope is already attached, broadcasts the attachment to it.
    pub fn child(&self, unit: &Unit) -> Unit {
        if self.register(unit) {
            if let Some(node) = self.attached_node() {
                unit.scope().attached(node);
            }
        }
        unit.clone()
    }

    /// Registration used while a unit is under construction: its content is
    /// not in the document yet, so no attachment is broadcast.
    pub(crate) fn adopt(&self, unit: &Unit) {
        self.register(unit);
    }

    fn register(&self, unit: &Unit) -> bool {
        if self.is_destroyed() {
            log::warn!(
                "{} already destroyed; unmounting late child unit {}",
                self.inner.id,
                unit.id()
            );
            unit.unmount();
            return false;
        }
        let previous = self
            .inner
            .children
            .borrow_mut()
            .insert(unit.id(), unit.clone());
        if previous.is_none() {
            self.inner
                .cleanups
                .borrow_mut()
                .push(CleanupEntry::Child(unit.id()));
        }
        true
    }

    /// Forgets `unit` and releases its teardown slot without unmounting it;
    /// the caller owns its teardown from here on.
    pub fn remove_child(&self, unit: &Unit) -> Option<Unit> {
        let id = unit.id();
        let removed = self.inner.children.borrow_mut().swap_remove(&id);
        if removed.is_some() {
            self.inner
                .cleanups
                .borrow_mut()
                .retain(|entry| !matches!(entry, CleanupEntry::Child(child) if *child == id));
        }
        removed
    }

    /// Sets the callback fired on first attachment. If the scope is already
    /// attached the callback runs right away.
    pub fn set_on_attached(&self, callback: impl FnOnce(NodeId) + 'static) {
        if let Some(node) = self.attached_node() {
            callback(node);
            return;
        }
        *self.inner.on_attached.borrow_mut() = Some(Box::new(callback));
    }

    /// Records `node` as the mount point and broadcasts the attachment
    /// depth-first to every current child.
    pub fn attached(&self, node: NodeId) {
        if self.is_destroyed() {
            log::warn!("{} destroyed; ignoring attachment to node {node}", self.inner.id);
            return;
        }
        if let Some(existing) = self.attached_node() {
            log::warn!(
                "{} already attached to node {existing}; ignoring attachment to node {node}",
                self.inner.id
            );
            return;
        }
        self.inner.attached_node.set(Some(node));
        let callback = self.inner.on_attached.borrow_mut().take();
        if let Some(callback) = callback {
            callback(node);
        }
        for child in self.children() {
            child.scope().attached(node);
        }
    }

    /// Runs every cleanup in insertion order, isolating panics, then clears
    /// children and attachment.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            log::warn!("{} already destroyed", self.inner.id);
            return;
        }
        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        let mut children = std::mem::take(&mut *self.inner.children.borrow_mut());
        log::trace!("{} running {} cleanup(s)", self.inner.id, cleanups.len());
        for (index, entry) in cleanups.into_iter().enumerate() {
            match entry {
                CleanupEntry::Callback(cleanup) => run_cleanup(self.inner.id, index, cleanup),
                CleanupEntry::Child(id) => {
                    if let Some(unit) = children.swap_remove(&id) {
                        run_cleanup(self.inner.id, index, move || unit.unmount());
                    }
                }
            }
        }
        drop(children);
        self.inner.attached_node.set(None);
        let callback = self.inner.on_attached.borrow_mut().take();
        drop(callback);
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("destroyed", &self.inner.destroyed.get())
            .field("children", &self.inner.children.borrow().len())
            .field("cleanups", &self.inner.cleanups.borrow().len())
            .field("attached_node", &self.inner.attached_node.get())
            .finish()
    }
}

fn run_cleanup(scope: ScopeId, index: usize, cleanup: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
        log::error!(
            "{scope}: cleanup #{index} panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
#[path = "tests/scope_tests.rs"]
mod tests;
