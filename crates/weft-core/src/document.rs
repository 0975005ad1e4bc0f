//! Document-tree primitive consumed by the unit runtime.
//!
//! The runtime only needs node creation, `insert_before`, `remove_child` and
//! read access to `parent_node`/`next_sibling`. [`MemoryDocument`] is the
//! arena-backed implementation used by headless rendering and tests.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::{NodeError, NodeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

pub trait Document {
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;

    /// Inserts `node` into `parent` right before `anchor`, or appends it when
    /// `anchor` is `None`. A node that already has a parent is detached
    /// first, which is how moves are expressed.
    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<(), NodeError>;

    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), NodeError>;

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn node_kind(&self, node: NodeId) -> Option<NodeKind>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), NodeError>;
}

struct DocNode {
    kind: NodeKind,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: IndexMap<String, String>,
}

impl DocNode {
    fn new(kind: NodeKind, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
        }
    }
}

#[derive(Default)]
pub struct MemoryDocument {
    nodes: Vec<DocNode>,
    mutations: usize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: NodeId) -> Result<&DocNode, NodeError> {
        self.nodes.get(id).ok_or(NodeError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DocNode, NodeError> {
        self.nodes.get_mut(id).ok_or(NodeError::Missing { id })
    }

    fn push(&mut self, kind: NodeKind, value: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DocNode::new(kind, value));
        id
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get(node).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&child| child != node);
        }
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.parent = None;
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut cursor = Some(of);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Total number of nodes ever created, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Concatenated text of the subtree rooted at `node`; comments are skipped.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(entry) = self.nodes.get(node) else {
            return;
        };
        match entry.kind {
            NodeKind::Text => out.push_str(&entry.value),
            NodeKind::Comment => {}
            NodeKind::Element => {
                for &child in &entry.children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.nodes
            .get(node)
            .filter(|n| n.kind == NodeKind::Element)
            .map(|n| n.value.as_str())
    }

    pub fn comment_text(&self, node: NodeId) -> Option<&str> {
        self.nodes
            .get(node)
            .filter(|n| n.kind == NodeKind::Comment)
            .map(|n| n.value.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    /// Successful `insert_before` and `remove_child` calls since creation or
    /// the last [`reset_mutation_count`](Self::reset_mutation_count).
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub fn reset_mutation_count(&mut self) {
        self.mutations = 0;
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.nodes.get(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        match node.kind {
            NodeKind::Element => {
                let _ = write!(output, "{indent}[{id}] <{}", node.value);
                for (name, value) in &node.attributes {
                    let _ = write!(output, " {name}=\"{value}\"");
                }
                output.push_str(">\n");
            }
            NodeKind::Text => {
                let _ = writeln!(output, "{indent}[{id}] {:?}", node.value);
            }
            NodeKind::Comment => {
                let _ = writeln!(output, "{indent}[{id}] <!--{}-->", node.value);
            }
        }
        for &child in &node.children {
            self.dump_node(output, child, depth + 1);
        }
    }
}

impl Document for MemoryDocument {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element, tag)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text, text)
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Comment, text)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<(), NodeError> {
        if self.node(parent)?.kind != NodeKind::Element {
            return Err(NodeError::NotAContainer { id: parent });
        }
        self.node(node)?;
        if self.is_ancestor(node, parent) {
            return Err(NodeError::Cycle { parent, node });
        }
        if let Some(anchor) = anchor {
            if self.node(anchor)?.parent != Some(parent) {
                return Err(NodeError::NotAChild {
                    parent,
                    node: anchor,
                });
            }
            if anchor == node {
                return Ok(());
            }
        }
        self.detach(node);
        let siblings = &mut self.node_mut(parent)?.children;
        let index = anchor
            .and_then(|anchor| siblings.iter().position(|&child| child == anchor))
            .unwrap_or(siblings.len());
        siblings.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        self.mutations += 1;
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), NodeError> {
        self.node(parent)?;
        if self.node(node)?.parent != Some(parent) {
            return Err(NodeError::NotAChild { parent, node });
        }
        self.detach(node);
        self.mutations += 1;
        Ok(())
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent_node(node)?;
        let siblings = &self.nodes.get(parent)?.children;
        let index = siblings.iter().position(|&child| child == node)?;
        siblings.get(index + 1).copied()
    }

    fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node).map(|n| n.kind)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), NodeError> {
        let entry = self.node_mut(node)?;
        if entry.kind != NodeKind::Element {
            return Err(NodeError::NotAContainer { id: node });
        }
        entry.attributes.insert(name.to_owned(), value.to_owned());
        Ok(())
    }
}
