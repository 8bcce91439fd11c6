//! The AppDom: a persistent, typed tree describing an application.
//!
//! Every mutator takes `&self` and returns a new [`AppDom`], leaving the input
//! snapshot intact. Node storage is shared between snapshots: only the map
//! itself and the nodes a mutation touches are copied.
//!
//! # Example
//!
//! ```
//! use trellis_core::dom::{AppDom, AppDomNode, NodeType};
//!
//! let dom = AppDom::new();
//! let page = AppDomNode::page("home", Some("Home"));
//! let page_id = page.id.clone();
//! let next = dom.add_node(page, dom.root_id(), "pages", None).unwrap();
//!
//! assert!(dom.get_node(&page_id, None).is_err());
//! assert_eq!(next.get_node(&page_id, Some(NodeType::Page)).unwrap().name, "home");
//! ```

mod bindable;
mod error;
mod fractional;
mod names;
mod node;
mod store;
mod validate;

pub use bindable::{BindableAttrValue, NavigationAction};
pub use error::{DomResult, FractionalIndexError, StructuralError};
pub use fractional::{create_fractional_index, validate_fractional_index};
pub use names::{propose_name, validate_node_name};
pub use node::{
    AppAttributes, AppDomNode, CodeComponentAttributes, ConnectionAttributes, ElementAttributes,
    NodeId, NodeKind, NodeType, PageAttributes, PageParameter, QueryAttributes, ThemeAttributes,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Schema version written by [`AppDom::new`]
pub const APP_DOM_VERSION: u32 = 1;

/// An immutable application tree snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AppDomRepr")]
pub struct AppDom {
    nodes: Arc<BTreeMap<NodeId, Arc<AppDomNode>>>,
    root: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
}

/// Unvalidated wire form
#[derive(Deserialize)]
struct AppDomRepr {
    nodes: BTreeMap<NodeId, AppDomNode>,
    root: NodeId,
    #[serde(default)]
    version: Option<u32>,
}

impl TryFrom<AppDomRepr> for AppDom {
    type Error = StructuralError;

    fn try_from(repr: AppDomRepr) -> Result<Self, Self::Error> {
        let dom = AppDom::from_repr(repr);
        dom.validate()?;
        Ok(dom)
    }
}

impl Default for AppDom {
    fn default() -> Self {
        Self::new()
    }
}

impl AppDom {
    /// A tree holding only an app root
    pub fn new() -> Self {
        let root = AppDomNode::app("Application");
        let root_id = root.id.clone();
        Self {
            nodes: Arc::new(BTreeMap::from([(root_id.clone(), Arc::new(root))])),
            root: root_id,
            version: Some(APP_DOM_VERSION),
        }
    }

    /// A tree with an app root and a single empty page
    pub fn create_default() -> Self {
        let dom = Self::new();
        let page = AppDomNode::page("page1", Some("Page 1"));
        match dom.add_node(page, &dom.root.clone(), "pages", None) {
            Ok(next) => next,
            Err(_) => dom,
        }
    }

    /// Decode and validate a serialized tree
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Decode a serialized tree without validating it, so that
    /// [`AppDom::violations`] can report everything wrong with it
    pub fn from_json_unchecked(source: &str) -> Result<Self, serde_json::Error> {
        let repr: AppDomRepr = serde_json::from_str(source)?;
        Ok(Self::from_repr(repr))
    }

    fn from_repr(repr: AppDomRepr) -> Self {
        AppDom {
            nodes: Arc::new(
                repr.nodes
                    .into_iter()
                    .map(|(id, node)| (id, Arc::new(node)))
                    .collect(),
            ),
            root: repr.root,
            version: repr.version,
        }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    /// The root node, absent only in a tree loaded without checks
    pub fn root(&self) -> Option<&AppDomNode> {
        self.nodes.get(&self.root).map(Arc::as_ref)
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &AppDomNode> {
        self.nodes.values().map(|node| node.as_ref())
    }

    /// Look up a node, optionally asserting its type
    pub fn get_node(&self, id: &NodeId, expected: Option<NodeType>) -> DomResult<&AppDomNode> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| StructuralError::NotFound(id.clone()))?;
        if let Some(expected) = expected {
            let actual = node.node_type();
            if actual != expected {
                return Err(StructuralError::TypeMismatch {
                    id: id.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(node)
    }

    pub fn get_parent(&self, node: &AppDomNode) -> Option<&AppDomNode> {
        node.parent_id
            .as_ref()
            .and_then(|id| self.nodes.get(id))
            .map(|parent| parent.as_ref())
    }

    /// Ancestors from the direct parent up to the root
    pub fn get_ancestors(&self, id: &NodeId) -> DomResult<Vec<&AppDomNode>> {
        let mut current = self.get_node(id, None)?;
        let mut ancestors = Vec::new();
        while let Some(parent) = self.get_parent(current) {
            // A well-formed tree is acyclic; bail out on corrupt input
            if ancestors.len() > self.nodes.len() {
                return Err(StructuralError::Unreachable(id.clone()));
            }
            ancestors.push(parent);
            current = parent;
        }
        Ok(ancestors)
    }

    /// True when `node` lies strictly inside the subtree rooted at `ancestor`
    pub fn is_descendant(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        self.get_ancestors(node)
            .map(|chain| chain.iter().any(|n| &n.id == ancestor))
            .unwrap_or(false)
    }

    /// Children of a node grouped by slot, each group sorted by index
    pub fn get_child_nodes(&self, id: &NodeId) -> BTreeMap<&str, Vec<&AppDomNode>> {
        let mut slots: BTreeMap<&str, Vec<&AppDomNode>> = BTreeMap::new();
        for node in self.nodes() {
            if node.parent_id.as_ref() == Some(id) {
                let prop = node.parent_prop.as_deref().unwrap_or_default();
                slots.entry(prop).or_default().push(node);
            }
        }
        for children in slots.values_mut() {
            sort_siblings(children);
        }
        slots
    }

    /// Children of a node in a single slot, sorted by index
    pub fn children_in(&self, parent: &NodeId, prop: &str) -> Vec<&AppDomNode> {
        let mut children: Vec<&AppDomNode> = self
            .nodes()
            .filter(|node| {
                node.parent_id.as_ref() == Some(parent) && node.parent_prop.as_deref() == Some(prop)
            })
            .collect();
        sort_siblings(&mut children);
        children
    }

    /// Depth-first descendants in slot and index order, excluding `id` itself
    pub fn get_descendants(&self, id: &NodeId) -> Vec<&AppDomNode> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let slots = self.get_child_nodes(&current);
            let ordered: Vec<&AppDomNode> = slots.into_values().flatten().collect();
            for child in ordered.iter().rev() {
                stack.push(child.id.clone());
            }
            // Preorder: children of `current` are visited before later siblings
            if current != *id {
                if let Some(node) = self.nodes.get(&current) {
                    out.push(node.as_ref());
                }
            }
        }
        out
    }

    /// Pages of the application in index order
    pub fn get_pages(&self) -> Vec<&AppDomNode> {
        self.children_in(&self.root, "pages")
    }

    pub fn get_page_by_name(&self, name: &str) -> Option<&AppDomNode> {
        self.get_pages().into_iter().find(|page| page.name == name)
    }

    /// Names currently in use anywhere in the tree
    pub fn node_names(&self) -> BTreeSet<String> {
        self.nodes().map(|node| node.name.clone()).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn sort_siblings(children: &mut [&AppDomNode]) {
    children.sort_by(|a, b| {
        a.parent_index
            .cmp(&b.parent_index)
            .then_with(|| a.id.cmp(&b.id))
    });
}
