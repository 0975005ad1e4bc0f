//! Unit runtime: construction, boundary markers, mounting and teardown.
//!
//! A unit is created by running a factory while its logical parent sits on
//! top of the render context's execution stack. The factory's [`View`] is
//! normalized into [`Content`]; anything other than exactly one node or one
//! unit gets a pair of boundary comment markers so it can be moved and
//! removed as a block.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::document::NodeKind;
use crate::{NodeError, NodeId, RenderContext, Scope};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comment nodes bounding a unit's content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub start: NodeId,
    pub end: NodeId,
}

/// What a factory returns.
#[derive(Clone, Debug, Default)]
pub enum View {
    #[default]
    Empty,
    Node(NodeId),
    Unit(Unit),
    Text(String),
    List(Vec<View>),
}

impl From<NodeId> for View {
    fn from(node: NodeId) -> Self {
        View::Node(node)
    }
}

impl From<Unit> for View {
    fn from(unit: Unit) -> Self {
        View::Unit(unit)
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_owned())
    }
}

impl From<()> for View {
    fn from(_: ()) -> Self {
        View::Empty
    }
}

impl<V: Into<View>> From<Option<V>> for View {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl<V: Into<View>> From<Vec<V>> for View {
    fn from(views: Vec<V>) -> Self {
        View::List(views.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Piece {
    Node(NodeId),
    Unit(Unit),
}

/// Normalized content stored in a unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Content {
    #[default]
    Empty,
    Node(NodeId),
    Unit(Unit),
    Sequence(Vec<Piece>),
}

impl Content {
    /// Child units in document order, not descending into them.
    pub fn units(&self) -> Vec<Unit> {
        match self {
            Content::Unit(unit) => vec![unit.clone()],
            Content::Sequence(pieces) => pieces
                .iter()
                .filter_map(|piece| match piece {
                    Piece::Unit(unit) => Some(unit.clone()),
                    Piece::Node(_) => None,
                })
                .collect(),
            Content::Empty | Content::Node(_) => Vec::new(),
        }
    }
}

struct UnitInner {
    id: UnitId,
    context: RenderContext,
    scope: Scope,
    content: RefCell<Content>,
    markers: Cell<Option<Markers>>,
    unmounted: Cell<bool>,
}

#[derive(Clone)]
pub struct Unit {
    inner: Rc<UnitInner>,
}

#[derive(Clone)]
pub struct WeakUnit {
    inner: Weak<UnitInner>,
}

impl WeakUnit {
    pub fn upgrade(&self) -> Option<Unit> {
        self.inner.upgrade().map(|inner| Unit { inner })
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Unit {}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context.id())
            .field("markers", &self.inner.markers.get())
            .field("unmounted", &self.inner.unmounted.get())
            .finish()
    }
}

impl Unit {
    fn allocate(context: &RenderContext, parent: Option<&Unit>) -> Self {
        let scope = Scope::new();
        scope.set_parent(parent);
        Self {
            inner: Rc::new(UnitInner {
                id: context.next_unit_id(),
                context: context.clone(),
                scope,
                content: RefCell::new(Content::Empty),
                markers: Cell::new(None),
                unmounted: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> UnitId {
        self.inner.id
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn context(&self) -> &RenderContext {
        &self.inner.context
    }

    pub fn parent(&self) -> Option<Unit> {
        self.inner.scope.parent()
    }

    pub fn content(&self) -> Content {
        self.inner.content.borrow().clone()
    }

    pub fn markers(&self) -> Option<Markers> {
        self.inner.markers.get()
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.unmounted.get()
    }

    pub fn downgrade(&self) -> WeakUnit {
        WeakUnit {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn set_content(&self, content: Content) {
        *self.inner.content.borrow_mut() = content;
    }

    fn install(&self, view: View) {
        let (content, bounded) = match view {
            View::Empty => (Content::Empty, true),
            View::Node(node) => (Content::Node(node), false),
            View::Unit(unit) => (Content::Unit(unit), false),
            View::Text(text) => {
                let node = self.inner.context.with_document(|doc| doc.create_text(&text));
                (Content::Sequence(vec![Piece::Node(node)]), true)
            }
            View::List(views) => {
                let mut pieces = Vec::with_capacity(views.len());
                self.flatten(views, &mut pieces);
                (Content::Sequence(pieces), true)
            }
        };
        if bounded {
            let markers = self.inner.context.markers_for(self.inner.id);
            self.inner.markers.set(Some(markers));
        }
        self.set_content(content);
    }

    fn flatten(&self, views: Vec<View>, out: &mut Vec<Piece>) {
        for view in views {
            match view {
                View::Empty => {}
                View::Node(node) => out.push(Piece::Node(node)),
                View::Unit(unit) => out.push(Piece::Unit(unit)),
                View::Text(text) => {
                    let node = self.inner.context.with_document(|doc| doc.create_text(&text));
                    out.push(Piece::Node(node));
                }
                View::List(nested) => self.flatten(nested, out),
            }
        }
    }

    /// Every top-level document node of this unit in order: start marker,
    /// content (descending into child units), end marker.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        let markers = self.markers();
        if let Some(markers) = markers {
            out.push(markers.start);
        }
        match &*self.inner.content.borrow() {
            Content::Empty => {}
            Content::Node(node) => out.push(*node),
            Content::Unit(unit) => unit.collect_nodes(out),
            Content::Sequence(pieces) => {
                for piece in pieces {
                    match piece {
                        Piece::Node(node) => out.push(*node),
                        Piece::Unit(unit) => unit.collect_nodes(out),
                    }
                }
            }
        }
        if let Some(markers) = markers {
            out.push(markers.end);
        }
    }

    pub fn first_node(&self) -> Option<NodeId> {
        if let Some(markers) = self.markers() {
            return Some(markers.start);
        }
        match &*self.inner.content.borrow() {
            Content::Empty => None,
            Content::Node(node) => Some(*node),
            Content::Unit(unit) => unit.first_node(),
            Content::Sequence(pieces) => pieces.iter().find_map(|piece| match piece {
                Piece::Node(node) => Some(*node),
                Piece::Unit(unit) => unit.first_node(),
            }),
        }
    }

    pub fn last_node(&self) -> Option<NodeId> {
        if let Some(markers) = self.markers() {
            return Some(markers.end);
        }
        match &*self.inner.content.borrow() {
            Content::Empty => None,
            Content::Node(node) => Some(*node),
            Content::Unit(unit) => unit.last_node(),
            Content::Sequence(pieces) => pieces.iter().rev().find_map(|piece| match piece {
                Piece::Node(node) => Some(*node),
                Piece::Unit(unit) => unit.last_node(),
            }),
        }
    }

    /// Inserts (or moves) every node of this unit into `parent` before
    /// `anchor`, keeping their relative order. No attachment is broadcast.
    pub fn insert_before(&self, parent: NodeId, anchor: Option<NodeId>) -> Result<(), NodeError> {
        for node in self.nodes() {
            self.inner
                .context
                .with_document(|doc| doc.insert_before(parent, node, anchor))?;
        }
        Ok(())
    }

    /// Inserts this unit into `parent` before `anchor` and broadcasts the
    /// attachment down its scope tree.
    pub fn mount(&self, parent: NodeId, anchor: Option<NodeId>) -> Result<(), NodeError> {
        self.insert_before(parent, anchor)?;
        log::debug!("unit {} mounted under node {parent}", self.inner.id);
        self.inner.scope.attached(parent);
        Ok(())
    }

    /// Tears the unit down: destroys its scope, then removes the start
    /// marker, the content and the end marker from the document.
    pub fn unmount(&self) {
        if self.inner.unmounted.replace(true) {
            log::trace!("unit {} already unmounted", self.inner.id);
            return;
        }
        log::trace!("unmounting unit {}", self.inner.id);
        if let Some(parent) = self.parent() {
            if !parent.scope().is_destroyed() {
                parent.scope().remove_child(self);
            }
        }
        self.inner.scope.destroy();

        let context = &self.inner.context;
        let markers = self.inner.markers.get();
        let content = self.inner.content.replace(Content::Empty);
        if let Some(markers) = markers {
            context.detach(markers.start);
        }
        match content {
            Content::Empty => {}
            Content::Node(node) => context.detach(node),
            Content::Unit(unit) => unit.unmount(),
            Content::Sequence(pieces) => {
                for piece in pieces {
                    match piece {
                        Piece::Node(node) => context.detach(node),
                        Piece::Unit(unit) => unit.unmount(),
                    }
                }
            }
        }
        if let Some(markers) = markers {
            context.detach(markers.end);
            context.forget_markers(self.inner.id);
        }
    }

    fn first_element(&self) -> Option<NodeId> {
        let nodes = self.nodes();
        self.inner.context.with_document(|doc| {
            nodes
                .into_iter()
                .find(|&node| doc.node_kind(node) == Some(NodeKind::Element))
        })
    }
}

/// Unmounts the unit when construction does not complete.
struct Teardown<'a> {
    unit: &'a Unit,
    armed: bool,
}

impl Teardown<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("construction of unit {} failed; tearing down", self.unit.id());
            self.unit.unmount();
        }
    }
}

impl RenderContext {
    /// Construction protocol shared by every public constructor. The factory
    /// receives the unit it is building.
    pub(crate) fn build<V, E>(
        &self,
        factory: impl FnOnce(&Unit) -> Result<V, E>,
    ) -> Result<Unit, E>
    where
        V: Into<View>,
    {
        let _active = self.activate();
        let parent = self.current();
        let unit = Unit::allocate(self, parent.as_ref());
        if let Some(parent) = parent.as_ref() {
            parent.scope().adopt(&unit);
        }
        let teardown = Teardown {
            unit: &unit,
            armed: true,
        };
        let outcome = {
            let _frame = self.push(&unit);
            factory(&unit)
        };
        let view = outcome?;
        unit.install(view.into());
        teardown.disarm();
        log::trace!("constructed unit {} in {}", unit.id(), self.id());
        if parent.is_none() {
            self.finish_root(&unit);
        }
        Ok(unit)
    }

    fn finish_root(&self, unit: &Unit) {
        if let Some(element) = unit.first_element() {
            let attribute = &self.config().root_attribute;
            let id = unit.id().to_string();
            if let Err(err) =
                self.with_document(|doc| doc.set_attribute(element, attribute, &id))
            {
                log::error!("failed to mark root unit {}: {err}", unit.id());
            }
        }
        let leftover = self.drain_stack();
        if leftover > 0 {
            log::warn!(
                "{}: {leftover} unit(s) left on the execution stack after root unit {}",
                self.id(),
                unit.id()
            );
        }
    }

    pub fn try_component_with_props<P, V, E>(
        &self,
        props: P,
        factory: impl FnOnce(P) -> Result<V, E>,
    ) -> Result<Unit, E>
    where
        V: Into<View>,
    {
        self.build(move |_| factory(props))
    }

    pub fn try_component<V, E>(&self, factory: impl FnOnce() -> Result<V, E>) -> Result<Unit, E>
    where
        V: Into<View>,
    {
        self.build(move |_| factory())
    }

    pub fn component_with_props<P, V>(&self, props: P, factory: impl FnOnce(P) -> V) -> Unit
    where
        V: Into<View>,
    {
        infallible(self.build(move |_| Ok(factory(props))))
    }

    pub fn component<V>(&self, factory: impl FnOnce() -> V) -> Unit
    where
        V: Into<View>,
    {
        infallible(self.build(move |_| Ok(factory())))
    }

    /// Constructs a unit as a child of `owner`, as reactive callbacks do.
    pub fn component_in<V>(&self, owner: &Unit, factory: impl FnOnce() -> V) -> Unit
    where
        V: Into<View>,
    {
        self.run_with_current(owner, || self.component(factory))
    }
}

pub(crate) fn infallible(result: Result<Unit, Infallible>) -> Unit {
    match result {
        Ok(unit) => unit,
        Err(never) => match never {},
    }
}

#[cfg(test)]
#[path = "tests/unit_tests.rs"]
mod tests;
