//! Whole-tree structural validation

use std::collections::{BTreeMap, BTreeSet};

use super::{validate_fractional_index, AppDom, DomResult, NodeId, NodeType, StructuralError};

impl AppDom {
    /// Check every structural invariant, stopping at the first violation
    pub fn validate(&self) -> DomResult<()> {
        match self.violations().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Collect all structural violations in the tree
    pub fn violations(&self) -> Vec<StructuralError> {
        let mut errors = Vec::new();

        let root = match self.get_node(&self.root, Some(NodeType::App)) {
            Ok(root) => root,
            Err(err) => return vec![err],
        };
        if root.parent_id.is_some() || root.parent_prop.is_some() || root.parent_index.is_some() {
            errors.push(StructuralError::RootHasParent(root.id.clone()));
        }

        let mut indices: BTreeMap<(&NodeId, &str), BTreeSet<&str>> = BTreeMap::new();
        for (key, node) in self.nodes.iter() {
            if *key != node.id {
                errors.push(StructuralError::KeyMismatch {
                    key: key.clone(),
                    id: node.id.clone(),
                });
            }
            if node.id == self.root {
                continue;
            }
            let (Some(parent_id), Some(prop), Some(index)) =
                (&node.parent_id, &node.parent_prop, &node.parent_index)
            else {
                errors.push(StructuralError::MissingParent(node.id.clone()));
                continue;
            };
            let parent = match self.get_node(parent_id, None) {
                Ok(parent) => parent,
                Err(_) => {
                    errors.push(StructuralError::Unreachable(node.id.clone()));
                    continue;
                }
            };
            if !parent.node_type().accepts(prop, node.node_type()) {
                errors.push(StructuralError::SlotRejected {
                    parent_type: parent.node_type(),
                    prop: prop.clone(),
                    child_type: node.node_type(),
                });
            }
            if let Err(err) = validate_fractional_index(index) {
                errors.push(err.into());
            } else if !indices
                .entry((parent_id, prop.as_str()))
                .or_default()
                .insert(index.as_str())
            {
                errors.push(StructuralError::IndexCollision {
                    parent: parent_id.clone(),
                    prop: prop.clone(),
                    index: index.clone(),
                });
            }
            if !self.reaches_root(&node.id) {
                errors.push(StructuralError::Unreachable(node.id.clone()));
            }
        }

        let mut names = BTreeSet::new();
        for node in self.nodes() {
            if !names.insert(node.name.as_str()) {
                errors.push(StructuralError::NameTaken(node.name.clone()));
            }
        }
        errors
    }

    /// Follow parent links, giving up after more steps than there are nodes
    fn reaches_root(&self, id: &NodeId) -> bool {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            if *current == self.root {
                return true;
            }
            match self.nodes.get(current).and_then(|n| n.parent_id.as_ref()) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}
