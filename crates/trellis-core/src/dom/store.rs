//! Copy-on-write mutators for [`AppDom`]

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    create_fractional_index, propose_name, validate_fractional_index, validate_node_name, AppDom,
    AppDomNode, BindableAttrValue, DomResult, NodeId, NodeKind, StructuralError,
};

impl AppDom {
    /// Insert a detached node under `parent` in slot `parent_prop`.
    ///
    /// Without an explicit `parent_index` the node is appended after the last
    /// sibling in that slot. The node's own parent fields are overwritten.
    pub fn add_node(
        &self,
        mut node: AppDomNode,
        parent: &NodeId,
        parent_prop: &str,
        parent_index: Option<&str>,
    ) -> DomResult<AppDom> {
        if self.nodes.contains_key(&node.id) {
            return Err(StructuralError::DuplicateId(node.id));
        }
        validate_node_name(&node.name).map_err(|reason| StructuralError::InvalidName {
            name: node.name.clone(),
            reason,
        })?;
        if self.nodes().any(|existing| existing.name == node.name) {
            return Err(StructuralError::NameTaken(node.name));
        }
        self.check_slot(parent, parent_prop, &node)?;
        let index = self.resolve_index(parent, parent_prop, parent_index, None)?;

        debug!(node = %node.id, parent = %parent, prop = parent_prop, index = %index, "add node");
        node.parent_id = Some(parent.clone());
        node.parent_prop = Some(parent_prop.to_string());
        node.parent_index = Some(index);

        let mut next = self.clone();
        Arc::make_mut(&mut next.nodes).insert(node.id.clone(), Arc::new(node));
        Ok(next)
    }

    /// Move a node, with its subtree, to a new parent slot.
    ///
    /// Moving a node under itself or one of its descendants is rejected
    /// before anything is copied.
    pub fn move_node(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        new_prop: &str,
        new_index: Option<&str>,
    ) -> DomResult<AppDom> {
        let node = self.get_node(id, None)?;
        if *id == self.root {
            return Err(StructuralError::RootOperation("moved"));
        }
        if id == new_parent || self.is_descendant(id, new_parent) {
            return Err(StructuralError::CyclicMove {
                node: id.clone(),
                target: new_parent.clone(),
            });
        }
        self.check_slot(new_parent, new_prop, node)?;
        let index = self.resolve_index(new_parent, new_prop, new_index, Some(id))?;

        debug!(node = %id, parent = %new_parent, prop = new_prop, index = %index, "move node");
        let mut moved = node.clone();
        moved.parent_id = Some(new_parent.clone());
        moved.parent_prop = Some(new_prop.to_string());
        moved.parent_index = Some(index);

        let mut next = self.clone();
        Arc::make_mut(&mut next.nodes).insert(id.clone(), Arc::new(moved));
        Ok(next)
    }

    /// Remove a node and its whole subtree
    pub fn remove_node(&self, id: &NodeId) -> DomResult<AppDom> {
        self.get_node(id, None)?;
        if *id == self.root {
            return Err(StructuralError::RootOperation("removed"));
        }
        let doomed: Vec<NodeId> = std::iter::once(id.clone())
            .chain(self.get_descendants(id).into_iter().map(|n| n.id.clone()))
            .collect();

        debug!(node = %id, count = doomed.len(), "remove subtree");
        let mut next = self.clone();
        let nodes = Arc::make_mut(&mut next.nodes);
        for doomed_id in &doomed {
            nodes.remove(doomed_id);
        }
        Ok(next)
    }

    /// Deep-copy a subtree and place the copy right after the original.
    ///
    /// Every copied node gets a fresh id and a fresh unique name. Attribute
    /// values, including expression text, are copied verbatim, so expressions
    /// inside the copy still reference the names of the original nodes.
    pub fn duplicate_node(&self, id: &NodeId) -> DomResult<(AppDom, NodeId)> {
        let original = self.get_node(id, None)?;
        if *id == self.root {
            return Err(StructuralError::RootOperation("duplicated"));
        }
        let (Some(parent), Some(prop)) = (&original.parent_id, &original.parent_prop) else {
            return Err(StructuralError::MissingParent(id.clone()));
        };

        let siblings = self.children_in(parent, prop);
        let next_sibling_index = siblings
            .iter()
            .skip_while(|sibling| sibling.id != *id)
            .nth(1)
            .and_then(|sibling| sibling.parent_index.as_deref());
        let index = create_fractional_index(original.parent_index.as_deref(), next_sibling_index)?;

        let subtree: Vec<&AppDomNode> = std::iter::once(original)
            .chain(self.get_descendants(id))
            .collect();
        let remap: BTreeMap<&NodeId, NodeId> = subtree
            .iter()
            .map(|node| (&node.id, NodeId::generate()))
            .collect();

        let mut taken = self.node_names();
        let mut next = self.clone();
        let nodes = Arc::make_mut(&mut next.nodes);
        for node in &subtree {
            let mut copy = (*node).clone();
            copy.id = remap[&node.id].clone();
            copy.name = propose_name(&node.name, &taken);
            taken.insert(copy.name.clone());
            if node.id == *id {
                copy.parent_index = Some(index.clone());
            } else if let Some(parent_id) = &node.parent_id {
                copy.parent_id = remap.get(parent_id).cloned();
            }
            nodes.insert(copy.id.clone(), Arc::new(copy));
        }

        let copy_id = remap[id].clone();
        debug!(node = %id, copy = %copy_id, count = subtree.len(), "duplicate subtree");
        Ok((next, copy_id))
    }

    /// Set or clear a single attribute of a node.
    ///
    /// `prop` addresses element props by name. Qualified names reach other
    /// attribute groups: `layout.<name>`, `parameters.<name>` (queries and
    /// mutations) and `tokens.<name>` (themes).
    pub fn set_node_prop(
        &self,
        id: &NodeId,
        prop: &str,
        value: Option<BindableAttrValue>,
    ) -> DomResult<AppDom> {
        let node = self.get_node(id, None)?;
        let node_type = node.node_type();
        let mut updated = node.clone();
        let target = match (&mut updated.kind, prop.split_once('.')) {
            (NodeKind::Element(attrs), Some(("layout", name))) => Some((&mut attrs.layout, name)),
            (NodeKind::Element(attrs), None) => Some((&mut attrs.props, prop)),
            (NodeKind::Query(attrs) | NodeKind::Mutation(attrs), Some(("parameters", name))) => {
                Some((&mut attrs.parameters, name))
            }
            (NodeKind::Theme(attrs), Some(("tokens", name))) => Some((&mut attrs.tokens, name)),
            _ => None,
        };
        let Some((group, name)) = target else {
            return Err(StructuralError::UnknownAttribute {
                node_type,
                prop: prop.to_string(),
            });
        };
        match value {
            Some(value) => {
                group.insert(name.to_string(), value);
            }
            None => {
                group.remove(name);
            }
        }
        Ok(self.replace(updated))
    }

    /// Rename a node, keeping names unique across the tree
    pub fn set_node_name(&self, id: &NodeId, name: &str) -> DomResult<AppDom> {
        let node = self.get_node(id, None)?;
        if node.name == name {
            return Ok(self.clone());
        }
        validate_node_name(name).map_err(|reason| StructuralError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        if self.nodes().any(|other| other.name == name) {
            return Err(StructuralError::NameTaken(name.to_string()));
        }
        let mut updated = node.clone();
        updated.name = name.to_string();
        Ok(self.replace(updated))
    }

    /// Apply `update` to a node's attributes. The node type must not change.
    pub fn update_node(
        &self,
        id: &NodeId,
        update: impl FnOnce(&mut NodeKind),
    ) -> DomResult<AppDom> {
        let node = self.get_node(id, None)?;
        let mut updated = node.clone();
        update(&mut updated.kind);
        if updated.node_type() != node.node_type() {
            return Err(StructuralError::TypeMismatch {
                id: id.clone(),
                expected: node.node_type(),
                actual: updated.node_type(),
            });
        }
        Ok(self.replace(updated))
    }

    fn replace(&self, node: AppDomNode) -> AppDom {
        let mut next = self.clone();
        Arc::make_mut(&mut next.nodes).insert(node.id.clone(), Arc::new(node));
        next
    }

    fn check_slot(&self, parent: &NodeId, prop: &str, child: &AppDomNode) -> DomResult<()> {
        let parent_type = self.get_node(parent, None)?.node_type();
        let child_type = child.node_type();
        if parent_type.accepts(prop, child_type) {
            Ok(())
        } else {
            Err(StructuralError::SlotRejected {
                parent_type,
                prop: prop.to_string(),
                child_type,
            })
        }
    }

    /// Validate an explicit index or compute an append position.
    /// `moving` is excluded from the sibling set.
    fn resolve_index(
        &self,
        parent: &NodeId,
        prop: &str,
        requested: Option<&str>,
        moving: Option<&NodeId>,
    ) -> DomResult<String> {
        let siblings: Vec<&AppDomNode> = self
            .children_in(parent, prop)
            .into_iter()
            .filter(|sibling| Some(&sibling.id) != moving)
            .collect();
        match requested {
            Some(index) => {
                validate_fractional_index(index)?;
                if siblings
                    .iter()
                    .any(|sibling| sibling.parent_index.as_deref() == Some(index))
                {
                    return Err(StructuralError::IndexCollision {
                        parent: parent.clone(),
                        prop: prop.to_string(),
                        index: index.to_string(),
                    });
                }
                Ok(index.to_string())
            }
            None => {
                let last = siblings
                    .last()
                    .and_then(|sibling| sibling.parent_index.as_deref());
                Ok(create_fractional_index(last, None)?)
            }
        }
    }
}
