use std::cell::{Ref, RefCell};
use std::rc::Rc;

use weft_core::{
    Document, MemoryDocument, NodeError, NodeId, NodeKind, RenderConfig, RenderContext, Unit, View,
};

/// Headless harness for rendering units into an in-memory document.
///
/// `RenderTestRule` owns a [`MemoryDocument`], a [`RenderContext`] bound to
/// it and a `<root>` container element. Content installed with
/// [`set_content`](Self::set_content) is constructed as a render root and
/// mounted into the container, replacing whatever was there before.
pub struct RenderTestRule {
    document: Rc<RefCell<MemoryDocument>>,
    context: RenderContext,
    container: NodeId,
    root: Option<Unit>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    pub fn with_config(config: RenderConfig) -> Self {
        let document = Rc::new(RefCell::new(MemoryDocument::new()));
        let container = document.borrow_mut().create_element("root");
        let context = RenderContext::with_config(document.clone(), config);
        Self {
            document,
            context,
            container,
            root: None,
        }
    }

    /// Unmounts the previous root, constructs `content` as the new root unit
    /// and mounts it into the container.
    pub fn set_content<V: Into<View>>(
        &mut self,
        content: impl FnOnce() -> V,
    ) -> Result<Unit, NodeError> {
        self.unmount();
        let unit = self.context.component(content);
        unit.mount(self.container, None)?;
        log::debug!("test rule mounted root unit {}", unit.id());
        self.root = Some(unit.clone());
        Ok(unit)
    }

    /// Unmounts the current root, if any.
    pub fn unmount(&mut self) {
        if let Some(root) = self.root.take() {
            root.unmount();
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Runs `f` with this rule's context active, for building signals or
    /// units outside `set_content`.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        self.context.enter(f)
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn root(&self) -> Option<&Unit> {
        self.root.as_ref()
    }

    pub fn document(&self) -> Ref<'_, MemoryDocument> {
        self.document.borrow()
    }

    /// All text under the container, comments excluded.
    pub fn text(&self) -> String {
        self.document.borrow().text_content(self.container)
    }

    /// Text of every element directly under `parent`, in document order.
    pub fn texts_in(&self, parent: NodeId) -> Vec<String> {
        let document = self.document.borrow();
        document
            .children(parent)
            .into_iter()
            .filter(|&child| document.node_kind(child) == Some(NodeKind::Element))
            .map(|child| document.text_content(child))
            .collect()
    }

    /// [`texts_in`](Self::texts_in) for the container.
    pub fn texts(&self) -> Vec<String> {
        self.texts_in(self.container)
    }

    pub fn child_count(&self) -> usize {
        self.document.borrow().children(self.container).len()
    }

    pub fn mutation_count(&self) -> usize {
        self.document.borrow().mutation_count()
    }

    pub fn reset_mutations(&self) {
        self.document.borrow_mut().reset_mutation_count();
    }

    pub fn dump(&self) -> String {
        self.document.borrow().dump_tree(Some(self.container))
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderTestRule {
    fn drop(&mut self) {
        self.unmount();
        self.context.dispose();
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{element, text};

    #[test]
    fn set_content_replaces_previous_root() {
        let mut rule = RenderTestRule::new();
        let first = rule.set_content(|| "first").expect("mount");
        assert_eq!(rule.text(), "first");

        rule.set_content(|| "second").expect("mount");

        assert!(first.is_unmounted());
        assert_eq!(rule.text(), "second");
        assert_eq!(rule.child_count(), 3);
    }

    #[test]
    fn texts_lists_element_children() {
        run_test_render(|rule| {
            rule.set_content(|| {
                let a = element("b");
                weft_core::append_child(a, text("x")).expect("append");
                vec![View::Node(a), View::from("loose")]
            })
            .expect("mount");
            assert_eq!(rule.texts(), vec!["x"]);
            assert_eq!(rule.text(), "xloose");
            assert!(rule.dump().contains("<b"));
        });
    }
}
