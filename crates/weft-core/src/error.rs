use crate::NodeId;

/// Failure of a document-tree operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("node {id} missing")]
    Missing { id: NodeId },
    #[error("node {node} is not a child of node {parent}")]
    NotAChild { parent: NodeId, node: NodeId },
    #[error("node {id} cannot hold children")]
    NotAContainer { id: NodeId },
    #[error("inserting node {node} under node {parent} would create a cycle")]
    Cycle { parent: NodeId, node: NodeId },
}

/// Raised when an API that needs the unit under construction is called
/// from outside any construction or reactive callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NotInContextError {
    #[error("no render context is active")]
    NoRenderContext,
    #[error("no unit is currently under construction")]
    NoCurrentUnit,
}
