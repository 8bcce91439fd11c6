//! Error types for AppDom store operations

use thiserror::Error;

use super::{NodeId, NodeType};

/// Errors produced when creating or validating fractional index keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FractionalIndexError {
    #[error("fractional index must not be empty")]
    Empty,

    #[error("invalid character '{character}' in fractional index \"{key}\"")]
    InvalidDigit { key: String, character: char },

    #[error("fractional index \"{0}\" must not end with '0'")]
    TrailingZero(String),

    #[error("fractional index \"{before}\" must sort before \"{after}\"")]
    OutOfOrder { before: String, after: String },
}

/// A structural violation raised by an AppDom mutator or by validation.
///
/// Mutators check every precondition before building the new tree, so a
/// returned error always means the input snapshot is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("node \"{0}\" not found")]
    NotFound(NodeId),

    #[error("node \"{id}\" is {actual}, expected {expected}")]
    TypeMismatch {
        id: NodeId,
        expected: NodeType,
        actual: NodeType,
    },

    #[error("cannot move node \"{node}\" under \"{target}\": target is inside the node's own subtree")]
    CyclicMove { node: NodeId, target: NodeId },

    #[error("{parent_type} slot \"{prop}\" does not accept {child_type} nodes")]
    SlotRejected {
        parent_type: NodeType,
        prop: String,
        child_type: NodeType,
    },

    #[error("{node_type} nodes have no attribute \"{prop}\"")]
    UnknownAttribute { node_type: NodeType, prop: String },

    #[error("the root node cannot be {0}")]
    RootOperation(&'static str),

    #[error("node \"{0}\" already exists")]
    DuplicateId(NodeId),

    #[error("invalid node name \"{name}\": {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("node name \"{0}\" is already taken")]
    NameTaken(String),

    #[error("index \"{index}\" is already used under \"{parent}\".{prop}")]
    IndexCollision {
        parent: NodeId,
        prop: String,
        index: String,
    },

    #[error("node \"{0}\" is missing its parent reference")]
    MissingParent(NodeId),

    #[error("root node \"{0}\" must not have a parent")]
    RootHasParent(NodeId),

    #[error("node stored under key \"{key}\" has id \"{id}\"")]
    KeyMismatch { key: NodeId, id: NodeId },

    #[error("node \"{0}\" is not reachable from the root")]
    Unreachable(NodeId),

    #[error(transparent)]
    Index(#[from] FractionalIndexError),
}

/// Result type alias for AppDom operations
pub type DomResult<T> = Result<T, StructuralError>;
