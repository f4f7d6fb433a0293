//! Host node tree kept in a map.

use std::collections::HashMap;
use std::fmt::Write as _;

use canopy_core::{HostAdapter, HostError, HostHandle, HostProps, HostType};

use crate::fault::{FaultPlan, OpKind};

/// What a host node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A root container created with [`MemoryHost::create_container`].
    Container,
    /// An element with a tag.
    Element(String),
    /// A text node.
    Text,
}

/// One host node.
#[derive(Debug, Clone)]
pub struct HostNode {
    /// Node kind.
    pub kind: NodeKind,
    /// Current attributes.
    pub props: HostProps,
    /// Parent node, if attached.
    pub parent: Option<HostHandle>,
    /// Children in order.
    pub children: Vec<HostHandle>,
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    /// `create_instance`.
    Create {
        /// New node.
        node: HostHandle,
        /// Its kind.
        kind: HostType,
    },
    /// `append_child`.
    Append {
        /// Parent.
        parent: HostHandle,
        /// Appended node.
        child: HostHandle,
    },
    /// `insert_before`.
    InsertBefore {
        /// Parent.
        parent: HostHandle,
        /// Inserted node.
        child: HostHandle,
        /// Reference sibling.
        before: HostHandle,
    },
    /// `remove_child`.
    Remove {
        /// Parent.
        parent: HostHandle,
        /// Removed node.
        child: HostHandle,
    },
    /// `commit_prop_update`.
    UpdateProps {
        /// Updated node.
        node: HostHandle,
    },
}

impl HostOp {
    /// Kind of the call.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            HostOp::Create { .. } => OpKind::Create,
            HostOp::Append { .. } => OpKind::Append,
            HostOp::InsertBefore { .. } => OpKind::InsertBefore,
            HostOp::Remove { .. } => OpKind::Remove,
            HostOp::UpdateProps { .. } => OpKind::UpdateProps,
        }
    }
}

/// In-memory [`HostAdapter`].
pub struct MemoryHost {
    nodes: HashMap<HostHandle, HostNode>,
    next_id: u64,
    ops: Vec<HostOp>,
    faults: FaultPlan,
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::with_capacity(256),
            next_id: 1,
            ops: Vec::with_capacity(64),
            faults: FaultPlan::default(),
        }
    }

    /// Creates a detached container to mount a root into.
    pub fn create_container(&mut self) -> HostHandle {
        let handle = self.allocate();
        self.nodes.insert(
            handle,
            HostNode {
                kind: NodeKind::Container,
                props: HostProps::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        handle
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, handle: HostHandle) -> Option<&HostNode> {
        self.nodes.get(&handle)
    }

    /// Children of a node.
    #[must_use]
    pub fn children(&self, handle: HostHandle) -> &[HostHandle] {
        self.nodes
            .get(&handle)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Number of live nodes, containers included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Recorded adapter calls, oldest first.
    #[must_use]
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Number of recorded calls of one kind.
    #[must_use]
    pub fn count_ops(&self, kind: OpKind) -> usize {
        self.ops.iter().filter(|op| op.kind() == kind).count()
    }

    /// Takes and clears the operation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Makes the `nth` (0-based) future call of `kind` fail.
    pub fn fail_on(&mut self, kind: OpKind, nth: usize) {
        self.faults.arm(kind, nth);
    }

    /// Serializes a subtree, e.g. `<list id="1"><item>a</item></list>`.
    ///
    /// Containers render only their children.
    #[must_use]
    pub fn render_to_string(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.write_node(handle, &mut out);
        out
    }

    /// Concatenated text content of a subtree.
    #[must_use]
    pub fn text_content(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.collect_text(handle, &mut out);
        out
    }

    fn allocate(&mut self) -> HostHandle {
        let handle = HostHandle::new(self.next_id);
        self.next_id += 1;
        handle
    }

    fn write_node(&self, handle: HostHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        match &node.kind {
            NodeKind::Container => {
                for &child in &node.children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Text => {
                if let Some(text) = node.props.get(HostProps::TEXT) {
                    let _ = write!(out, "{text}");
                }
            }
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in node.props.iter() {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for &child in &node.children {
                    self.write_node(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn collect_text(&self, handle: HostHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        if node.kind == NodeKind::Text {
            if let Some(text) = node.props.get(HostProps::TEXT) {
                let _ = write!(out, "{text}");
            }
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    fn check_fault(&mut self, kind: OpKind) -> Result<(), HostError> {
        if self.faults.trip(kind) {
            tracing::debug!(?kind, "injected host failure");
            return Err(HostError::new(kind.name(), "injected failure"));
        }
        Ok(())
    }

    fn require(&self, handle: HostHandle, operation: &'static str) -> Result<(), HostError> {
        if self.nodes.contains_key(&handle) {
            Ok(())
        } else {
            Err(HostError::new(operation, format!("unknown node {}", handle.raw())))
        }
    }

    /// Detaches a node from its current parent, if any.
    fn detach(&mut self, child: HostHandle) {
        let parent = self.nodes.get(&child).and_then(|node| node.parent);
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|&c| c != child);
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
    }

    /// Drops a node and all its descendants.
    fn drop_subtree(&mut self, handle: HostHandle) {
        if let Some(node) = self.nodes.remove(&handle) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAdapter for MemoryHost {
    fn create_instance(&mut self, kind: &HostType, props: &HostProps) -> Result<HostHandle, HostError> {
        self.check_fault(OpKind::Create)?;
        let handle = self.allocate();
        let node_kind = match kind {
            HostType::Element(tag) => NodeKind::Element(tag.to_string()),
            HostType::Text => NodeKind::Text,
        };
        self.nodes.insert(
            handle,
            HostNode {
                kind: node_kind,
                props: props.clone(),
                parent: None,
                children: Vec::new(),
            },
        );
        self.ops.push(HostOp::Create {
            node: handle,
            kind: kind.clone(),
        });
        Ok(handle)
    }

    fn append_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError> {
        self.check_fault(OpKind::Append)?;
        self.require(parent, "append_child")?;
        self.require(child, "append_child")?;

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        self.ops.push(HostOp::Append { parent, child });
        Ok(())
    }

    fn insert_before(&mut self, parent: HostHandle, child: HostHandle, before: HostHandle) -> Result<(), HostError> {
        self.check_fault(OpKind::InsertBefore)?;
        self.require(parent, "insert_before")?;
        self.require(child, "insert_before")?;
        if !self.children(parent).contains(&before) {
            return Err(HostError::new(
                "insert_before",
                format!("node {} is not a child of {}", before.raw(), parent.raw()),
            ));
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            let position = node
                .children
                .iter()
                .position(|&c| c == before)
                .unwrap_or(node.children.len());
            node.children.insert(position, child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError> {
        self.check_fault(OpKind::Remove)?;
        if !self.children(parent).contains(&child) {
            return Err(HostError::new(
                "remove_child",
                format!("node {} is not a child of {}", child.raw(), parent.raw()),
            ));
        }
        self.detach(child);
        self.drop_subtree(child);
        self.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }

    fn commit_prop_update(
        &mut self,
        instance: HostHandle,
        _prev_props: &HostProps,
        next_props: &HostProps,
    ) -> Result<(), HostError> {
        self.check_fault(OpKind::UpdateProps)?;
        let node = self
            .nodes
            .get_mut(&instance)
            .ok_or_else(|| HostError::new("commit_prop_update", format!("unknown node {}", instance.raw())))?;
        node.props = next_props.clone();
        self.ops.push(HostOp::UpdateProps { node: instance });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(host: &mut MemoryHost, tag: &str) -> HostHandle {
        host.create_instance(&HostType::Element(tag.into()), &HostProps::new())
            .unwrap()
    }

    fn text(host: &mut MemoryHost, content: &str) -> HostHandle {
        host.create_instance(&HostType::Text, &HostProps::text(content))
            .unwrap()
    }

    #[test]
    fn test_tree_hierarchy() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let list = element(&mut host, "list");
        let a = text(&mut host, "a");
        let b = text(&mut host, "b");

        host.append_child(list, a).unwrap();
        host.append_child(list, b).unwrap();
        host.append_child(root, list).unwrap();

        assert_eq!(host.children(list), &[a, b]);
        assert_eq!(host.render_to_string(root), "<list>ab</list>");
        assert_eq!(host.text_content(root), "ab");
    }

    #[test]
    fn test_insert_before_moves_existing_child() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let a = text(&mut host, "a");
        let b = text(&mut host, "b");
        let c = text(&mut host, "c");
        for node in [a, b, c] {
            host.append_child(root, node).unwrap();
        }

        host.insert_before(root, c, a).unwrap();
        assert_eq!(host.children(root), &[c, a, b]);
        assert_eq!(host.node(c).unwrap().parent, Some(root));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let list = element(&mut host, "list");
        let a = text(&mut host, "a");
        host.append_child(list, a).unwrap();
        host.append_child(root, list).unwrap();

        host.remove_child(root, list).unwrap();
        assert!(host.node(a).is_none());
        assert_eq!(host.node_count(), 1);
        assert!(host.remove_child(root, list).is_err());
    }

    #[test]
    fn test_prop_update_and_serialization() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let item = element(&mut host, "item");
        host.append_child(root, item).unwrap();

        let next = HostProps::new().with("id", 3).with("active", true);
        host.commit_prop_update(item, &HostProps::new(), &next).unwrap();
        assert_eq!(host.render_to_string(root), "<item active=\"true\" id=\"3\"></item>");
        assert_eq!(host.count_ops(OpKind::UpdateProps), 1);
    }

    #[test]
    fn test_injected_fault() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        host.fail_on(OpKind::Append, 1);

        let a = text(&mut host, "a");
        let b = text(&mut host, "b");
        host.append_child(root, a).unwrap();
        let err = host.append_child(root, b).unwrap_err();
        assert_eq!(err.operation, "append_child");
        host.append_child(root, b).unwrap();
        assert_eq!(host.children(root), &[a, b]);
    }
}
