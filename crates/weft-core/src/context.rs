//! Render contexts: per-render isolation of the execution stack, the marker
//! cache and pending asynchronous work.
//!
//! Contexts live in a thread-local registry keyed by [`RenderContextId`].
//! The innermost context entered with [`RenderContext::enter`] is the
//! ambient one, returned by [`RenderContext::active`] and used by free
//! functions such as [`crate::component`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_task::LocalFutureObj;

use crate::collections::map::HashMap;
use crate::config::{MarkerEdge, RenderConfig};
use crate::document::Document;
use crate::{Markers, NodeId, Unit, UnitId};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderContextId(u64);

impl RenderContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RenderContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

pub(crate) struct ContextInner {
    id: RenderContextId,
    document: Rc<RefCell<dyn Document>>,
    config: RenderConfig,
    stack: RefCell<Vec<Unit>>,
    markers: RefCell<HashMap<UnitId, Markers>>,
    pending: RefCell<Vec<LocalFutureObj<'static, ()>>>,
    next_unit: Cell<u64>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let id = self.id;
        let _ = REGISTRY.try_with(|registry| {
            if let Ok(mut registry) = registry.try_borrow_mut() {
                registry.remove(&id);
            }
        });
    }
}

thread_local! {
    static REGISTRY: RefCell<HashMap<RenderContextId, Weak<ContextInner>>> =
        RefCell::new(HashMap::default());
    static ACTIVE_CONTEXTS: RefCell<Vec<RenderContext>> = RefCell::new(Vec::new());
}

#[derive(Clone)]
pub struct RenderContext {
    inner: Rc<ContextInner>,
}

impl PartialEq for RenderContext {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RenderContext {}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("id", &self.inner.id)
            .field("stack_depth", &self.stack_depth())
            .finish()
    }
}

impl RenderContext {
    pub fn new(document: Rc<RefCell<dyn Document>>) -> Self {
        Self::with_config(document, RenderConfig::default())
    }

    pub fn with_config(document: Rc<RefCell<dyn Document>>, config: RenderConfig) -> Self {
        let inner = Rc::new(ContextInner {
            id: RenderContextId::next(),
            document,
            config,
            stack: RefCell::new(Vec::new()),
            markers: RefCell::new(HashMap::default()),
            pending: RefCell::new(Vec::new()),
            next_unit: Cell::new(1),
        });
        REGISTRY.with(|registry| {
            registry
                .borrow_mut()
                .insert(inner.id, Rc::downgrade(&inner));
        });
        log::debug!("render context {} created", inner.id);
        Self { inner }
    }

    pub fn lookup(id: RenderContextId) -> Option<RenderContext> {
        REGISTRY
            .with(|registry| registry.borrow().get(&id).and_then(Weak::upgrade))
            .map(|inner| RenderContext { inner })
    }

    pub fn id(&self) -> RenderContextId {
        self.inner.id
    }

    pub fn config(&self) -> &RenderConfig {
        &self.inner.config
    }

    /// Unregisters the context and releases its stack, marker cache and
    /// pending work. Units created under it stay valid until unmounted.
    pub fn dispose(&self) {
        REGISTRY.with(|registry| {
            registry.borrow_mut().remove(&self.inner.id);
        });
        let stack = std::mem::take(&mut *self.inner.stack.borrow_mut());
        if !stack.is_empty() {
            log::warn!(
                "render context {} disposed with {} unit(s) under construction",
                self.inner.id,
                stack.len()
            );
        }
        drop(stack);
        self.inner.markers.borrow_mut().clear();
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        drop(pending);
        log::debug!("render context {} disposed", self.inner.id);
    }

    /// Innermost context entered on this thread.
    pub fn active() -> Option<RenderContext> {
        ACTIVE_CONTEXTS.with(|stack| stack.borrow().last().cloned())
    }

    #[track_caller]
    pub(crate) fn expect_current() -> RenderContext {
        match Self::active() {
            Some(context) => context,
            None => panic!(
                "no render context is active; call this inside RenderContext::enter or a unit factory"
            ),
        }
    }

    /// Runs `f` with this context as the ambient one.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _active = self.activate();
        f()
    }

    pub(crate) fn activate(&self) -> ActiveContext {
        let depth = ACTIVE_CONTEXTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self.clone());
            stack.len()
        });
        ActiveContext { depth }
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&mut dyn Document) -> R) -> R {
        let mut document = self.inner.document.borrow_mut();
        f(&mut *document)
    }

    pub fn document(&self) -> Rc<RefCell<dyn Document>> {
        Rc::clone(&self.inner.document)
    }

    /// Detaches `node` from whatever parent it has; failures are logged.
    pub(crate) fn detach(&self, node: NodeId) {
        self.with_document(|document| {
            if let Some(parent) = document.parent_node(node) {
                if let Err(err) = document.remove_child(parent, node) {
                    log::error!("failed to detach node {node}: {err}");
                }
            }
        });
    }

    pub(crate) fn next_unit_id(&self) -> UnitId {
        let raw = self.inner.next_unit.get();
        self.inner.next_unit.set(raw + 1);
        UnitId::new(raw)
    }

    // Execution stack

    /// Makes `unit` the current unit until the returned frame is dropped.
    pub fn push(&self, unit: &Unit) -> StackFrame {
        let depth = {
            let mut stack = self.inner.stack.borrow_mut();
            stack.push(unit.clone());
            stack.len()
        };
        StackFrame {
            context: self.clone(),
            depth,
        }
    }

    fn pop_frame(&self, depth: usize) {
        let popped = {
            let mut stack = self.inner.stack.borrow_mut();
            if stack.len() != depth {
                log::warn!(
                    "render context {}: execution stack depth {} on pop, expected {}",
                    self.inner.id,
                    stack.len(),
                    depth
                );
            }
            if stack.len() >= depth {
                stack.split_off(depth.saturating_sub(1))
            } else {
                Vec::new()
            }
        };
        drop(popped);
    }

    /// Unit on top of the execution stack.
    pub fn current(&self) -> Option<Unit> {
        self.inner.stack.borrow().last().cloned()
    }

    pub fn stack_depth(&self) -> usize {
        self.inner.stack.borrow().len()
    }

    /// Runs `f` with `unit` as the current unit and this context active,
    /// restoring both afterwards on every exit path.
    pub fn run_with_current<R>(&self, unit: &Unit, f: impl FnOnce() -> R) -> R {
        let _active = self.activate();
        let _frame = self.push(unit);
        f()
    }

    pub(crate) fn drain_stack(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.stack.borrow_mut());
        drained.len()
    }

    // Marker cache

    /// Boundary markers for `id`, reusing cached nodes when present.
    pub fn markers_for(&self, id: UnitId) -> Markers {
        if let Some(markers) = self.inner.markers.borrow().get(&id).copied() {
            return markers;
        }
        let config = &self.inner.config;
        let markers = self.with_document(|document| Markers {
            start: document.create_comment(&config.marker_text(MarkerEdge::Start, id)),
            end: document.create_comment(&config.marker_text(MarkerEdge::End, id)),
        });
        self.inner.markers.borrow_mut().insert(id, markers);
        markers
    }

    /// Seeds the cache with already-resolved comment nodes, e.g. found in
    /// server-rendered markup.
    pub fn adopt_markers(&self, id: UnitId, start: NodeId, end: NodeId) {
        self.inner
            .markers
            .borrow_mut()
            .insert(id, Markers { start, end });
    }

    pub fn cached_markers(&self, id: UnitId) -> Option<Markers> {
        self.inner.markers.borrow().get(&id).copied()
    }

    pub(crate) fn forget_markers(&self, id: UnitId) {
        self.inner.markers.borrow_mut().remove(&id);
    }

    // Pending work

    /// Registers work an external server renderer should await before
    /// serializing. Nothing in this crate polls it.
    pub fn wait_for(&self, future: impl Future<Output = ()> + 'static) {
        self.inner
            .pending
            .borrow_mut()
            .push(LocalFutureObj::new(Box::pin(future)));
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    pub fn take_pending(&self) -> Vec<LocalFutureObj<'static, ()>> {
        std::mem::take(&mut *self.inner.pending.borrow_mut())
    }
}

/// Scope guard for [`RenderContext::push`]; dropping it pops the unit.
#[must_use = "the unit is popped as soon as the frame is dropped"]
pub struct StackFrame {
    context: RenderContext,
    depth: usize,
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        self.context.pop_frame(self.depth);
    }
}

pub(crate) struct ActiveContext {
    depth: usize,
}

impl Drop for ActiveContext {
    fn drop(&mut self) {
        let depth = self.depth;
        let popped = ACTIVE_CONTEXTS.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            let at = depth.saturating_sub(1).min(stack.len());
            stack.split_off(at)
        });
        drop(popped);
    }
}
