#![doc = r"Unit runtime and reconcilers for the Weft reactive document toolkit."]

pub mod collections;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod list;
pub mod scope;
pub mod signal;
pub mod switch;
pub mod unit;

pub use config::{DuplicateKeyPolicy, MarkerEdge, RenderConfig, DEBUG_ENV};
pub use context::{RenderContext, RenderContextId, StackFrame};
pub use document::{Document, MemoryDocument, NodeKind};
pub use error::{NodeError, NotInContextError};
pub use list::keyed_list;
pub use scope::{Cleanup, Scope, ScopeId};
pub use signal::{Signal, Subscription};
pub use switch::{show, Switch};
pub use unit::{Content, Markers, Piece, Unit, UnitId, View, WeakUnit};

use std::cell::RefCell;
use std::future::Future;

pub type NodeId = usize;

/// Constructs a unit in the active render context, parented to the current
/// unit if there is one.
///
/// # Panics
///
/// When no render context is active.
#[track_caller]
pub fn component<V: Into<View>>(factory: impl FnOnce() -> V) -> Unit {
    RenderContext::expect_current().component(factory)
}

#[track_caller]
pub fn component_with_props<P, V: Into<View>>(props: P, factory: impl FnOnce(P) -> V) -> Unit {
    RenderContext::expect_current().component_with_props(props, factory)
}

/// Fallible [`component`]: the factory's error is returned unchanged after
/// the partial unit has been torn down.
#[track_caller]
pub fn try_component<V: Into<View>, E>(factory: impl FnOnce() -> Result<V, E>) -> Result<Unit, E> {
    RenderContext::expect_current().try_component(factory)
}

pub fn current_unit() -> Result<Unit, NotInContextError> {
    let context = RenderContext::active().ok_or(NotInContextError::NoRenderContext)?;
    context.current().ok_or(NotInContextError::NoCurrentUnit)
}

pub fn current_scope() -> Result<Scope, NotInContextError> {
    current_unit().map(|unit| unit.scope().clone())
}

/// Registers `cleanup` on the current unit's scope.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) -> Result<(), NotInContextError> {
    current_scope()?.track(cleanup);
    Ok(())
}

/// Runs `callback` with the mount point once the current unit is attached.
pub fn on_attached(callback: impl FnOnce(NodeId) + 'static) -> Result<(), NotInContextError> {
    current_scope()?.set_on_attached(callback);
    Ok(())
}

/// Observes `signal` for the lifetime of the current unit. During each
/// callback the unit is current again, so units built inside it are
/// parented correctly.
pub fn watch<T: Clone + 'static>(
    signal: &Signal<T>,
    callback: impl FnMut(&T) + 'static,
) -> Result<(), NotInContextError> {
    let owner = current_unit()?;
    let weak = owner.downgrade();
    let callback = RefCell::new(callback);
    let subscription = signal.observe(move |value| {
        let Some(owner) = weak.upgrade() else {
            return;
        };
        if owner.is_unmounted() {
            return;
        }
        let Ok(mut callback) = callback.try_borrow_mut() else {
            log::warn!(
                "watcher of unit {} re-entered by its own write; nested update skipped",
                owner.id()
            );
            return;
        };
        let context = owner.context().clone();
        context.run_with_current(&owner, || (*callback)(value));
    });
    owner.scope().track(move || subscription.unsubscribe());
    Ok(())
}

pub fn wait_for(future: impl Future<Output = ()> + 'static) -> Result<(), NotInContextError> {
    let context = RenderContext::active().ok_or(NotInContextError::NoRenderContext)?;
    context.wait_for(future);
    Ok(())
}

#[track_caller]
pub fn with_document<R>(f: impl FnOnce(&mut dyn Document) -> R) -> R {
    RenderContext::expect_current().with_document(f)
}

#[track_caller]
pub fn element(tag: &str) -> NodeId {
    with_document(|document| document.create_element(tag))
}

#[track_caller]
pub fn text(value: &str) -> NodeId {
    with_document(|document| document.create_text(value))
}

#[track_caller]
pub fn append_child(parent: NodeId, child: NodeId) -> Result<(), NodeError> {
    with_document(|document| document.insert_before(parent, child, None))
}
