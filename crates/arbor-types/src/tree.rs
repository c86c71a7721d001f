use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::{Address, ArborError, Result, Value};

/// Stable handle to a node in a [`Tree`].
///
/// Handles are generational: once a node is removed its slot may be reused,
/// but an old handle to it never resolves to the newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    value: Value,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

// ---------------------------------------------------------------------------
// Tree: arena of owned nodes
// ---------------------------------------------------------------------------

/// Arena holding one rooted tree plus any detached subtrees created from it.
///
/// Ownership edges are the `children` lists; a node has at most one parent and
/// the ownership graph is acyclic. `Value::Node` references are plain handle
/// copies and are never followed when cloning or removing.
///
/// Cloning the whole `Tree` keeps every handle valid in the copy, which is what
/// snapshot isolation relies on.
#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree whose root has an empty name and no value.
    pub fn new() -> Self {
        Self::with_root("", Value::None)
    }

    pub fn with_root(name: impl Into<String>, value: Value) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.create(name, value);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, attached or detached.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|s| s.generation == id.generation && s.data.is_some())
    }

    fn data(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_ref())
            .ok_or_else(|| ArborError::address(format!("stale node handle {}", id)))
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_mut())
            .ok_or_else(|| ArborError::address(format!("stale node handle {}", id)))
    }

    // -- creation ----------------------------------------------------------

    /// Create a detached node. Attach it with [`add`](Tree::add) or [`insert`](Tree::insert).
    pub fn create(&mut self, name: impl Into<String>, value: Value) -> NodeId {
        let data = NodeData {
            name: name.into(),
            value,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Create a node and append it as the last child of `parent`.
    pub fn add_new(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<NodeId> {
        let child = self.create(name, value.into());
        self.add(parent, child)?;
        Ok(child)
    }

    // -- accessors ---------------------------------------------------------

    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.data(id)?.name)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        self.data_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn value(&self, id: NodeId) -> Result<&Value> {
        Ok(&self.data(id)?.value)
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<()> {
        self.data_mut(id)?.value = value.into();
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.data(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.data(id)?.children)
    }

    pub fn child_count(&self, id: NodeId) -> Result<usize> {
        Ok(self.data(id)?.children.len())
    }

    pub fn child(&self, id: NodeId, index: usize) -> Result<Option<NodeId>> {
        Ok(self.data(id)?.children.get(index).copied())
    }

    /// First child of `id` with the given name.
    pub fn find_child(&self, id: NodeId, name: &str) -> Result<Option<NodeId>> {
        for &child in self.children(id)? {
            if self.name(child)? == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Position of `id` among its siblings, or `None` for a parentless node.
    pub fn index_in_parent(&self, id: NodeId) -> Result<Option<usize>> {
        match self.parent(id)? {
            Some(parent) => Ok(self.children(parent)?.iter().position(|&c| c == id)),
            None => Ok(None),
        }
    }

    /// Sibling at a signed offset from `id` (`-1` previous, `+1` next).
    pub fn sibling(&self, id: NodeId, offset: isize) -> Result<Option<NodeId>> {
        let Some(parent) = self.parent(id)? else {
            return Ok(None);
        };
        let siblings = self.children(parent)?;
        let Some(pos) = siblings.iter().position(|&c| c == id) else {
            return Ok(None);
        };
        let target = isize::try_from(pos)
            .ok()
            .and_then(|pos| pos.checked_add(offset))
            .and_then(|target| usize::try_from(target).ok());
        Ok(target.and_then(|target| siblings.get(target).copied()))
    }

    /// The node on the line above `id` when the tree is written out: the
    /// deepest last descendant of the previous sibling, else the parent.
    pub fn previous_node(&self, id: NodeId) -> Result<Option<NodeId>> {
        let Some(mut at) = self.sibling(id, -1)? else {
            return self.parent(id);
        };
        while let Some(&last) = self.children(at)?.last() {
            at = last;
        }
        Ok(Some(at))
    }

    /// The node on the line below `id` when the tree is written out: its
    /// first child, else the next sibling of the nearest node that has one.
    pub fn next_node(&self, id: NodeId) -> Result<Option<NodeId>> {
        if let Some(first) = self.child(id, 0)? {
            return Ok(Some(first));
        }
        let mut at = id;
        loop {
            if let Some(next) = self.sibling(at, 1)? {
                return Ok(Some(next));
            }
            match self.parent(at)? {
                Some(parent) => at = parent,
                None => return Ok(None),
            }
        }
    }

    /// Topmost ancestor of `id`: the tree root, or the root of a detached subtree.
    pub fn top(&self, id: NodeId) -> Result<NodeId> {
        let mut current = id;
        while let Some(parent) = self.parent(current)? {
            current = parent;
        }
        Ok(current)
    }

    /// Returns `true` if `ancestor` lies on the parent chain of `node` (or is `node`).
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.parent(id)?;
        }
        Ok(false)
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id)?.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next)?.iter().rev().copied());
        }
        Ok(out)
    }

    // -- structural mutation ---------------------------------------------

    /// Append `child` as the last child of `parent`.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let len = self.child_count(parent)?;
        self.insert(parent, len, child)
    }

    /// Insert `child` at `index` among the children of `parent`.
    ///
    /// The child must be detached, and must not be an ancestor of `parent`.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        if self.parent(child)?.is_some() {
            return Err(ArborError::address(format!(
                "node {} is already attached; detach it first",
                child
            )));
        }
        if self.is_ancestor_or_self(child, parent)? {
            return Err(ArborError::address(format!(
                "inserting {} below {} would create a cycle",
                child, parent
            )));
        }
        let len = self.child_count(parent)?;
        if index > len {
            return Err(ArborError::address(format!(
                "insert index {} out of range for {} children",
                index, len
            )));
        }
        self.data_mut(parent)?.children.insert(index, child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlink `id` from its parent, keeping it (and its subtree) alive.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.parent(id)? {
            self.data_mut(parent)?.children.retain(|&c| c != id);
            self.data_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Detach `id` and destroy it together with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(ArborError::address("the tree root cannot be removed"));
        }
        self.detach(id)?;
        let mut doomed = self.descendants(id)?;
        doomed.push(id);
        for node in doomed {
            let slot = &mut self.slots[node.index as usize];
            slot.data = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
        }
        Ok(())
    }

    /// Remove the child at `index` of `parent`.
    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> Result<()> {
        let child = self.child(parent, index)?.ok_or_else(|| {
            ArborError::address(format!("no child at index {} of {}", index, parent))
        })?;
        self.remove(child)
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.children(id)?.to_vec();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Deep-copy the subtree at `id` into a new detached subtree of this arena.
    ///
    /// Reference values are copied as they are: the copy points at the same
    /// targets as the original, never at nodes of the copy.
    pub fn clone_subtree(&mut self, id: NodeId) -> Result<NodeId> {
        let (name, value, children) = {
            let data = self.data(id)?;
            (data.name.clone(), data.value.clone(), data.children.clone())
        };
        let copy = self.create(name, value);
        for child in children {
            let child_copy = self.clone_subtree(child)?;
            self.data_mut(copy)?.children.push(child_copy);
            self.data_mut(child_copy)?.parent = Some(copy);
        }
        Ok(copy)
    }

    /// Copy the subtree at `node` of another arena into this one, detached.
    ///
    /// References between nodes of the copied subtree are remapped onto the
    /// copies; references that point outside it cannot survive the move and
    /// become `Value::None`.
    pub fn graft(&mut self, other: &Tree, node: NodeId) -> Result<NodeId> {
        let mut mapping = HashMap::new();
        let copy = self.graft_inner(other, node, &mut mapping)?;
        let copies: Vec<NodeId> = mapping.values().copied().collect();
        for id in copies {
            if let Value::Node(target) = self.value(id)?.clone() {
                let remapped = match mapping.get(&target) {
                    Some(mapped) => Value::Node(*mapped),
                    None => {
                        tracing::warn!(node = %id, "dropping reference that points outside the grafted subtree");
                        Value::None
                    }
                };
                self.set_value(id, remapped)?;
            }
        }
        Ok(copy)
    }

    fn graft_inner(
        &mut self,
        other: &Tree,
        node: NodeId,
        mapping: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        let data = other.data(node)?;
        let copy = self.create(data.name.clone(), data.value.clone());
        mapping.insert(node, copy);
        for &child in &data.children {
            let child_copy = self.graft_inner(other, child, mapping)?;
            self.data_mut(copy)?.children.push(child_copy);
            self.data_mut(child_copy)?.parent = Some(copy);
        }
        Ok(copy)
    }

    /// Copy the subtree at `id` into a fresh tree whose root is the copy.
    pub fn extract(&self, id: NodeId) -> Result<Tree> {
        let mut out = Tree {
            slots: Vec::new(),
            free: Vec::new(),
            root: id,
        };
        out.root = out.graft(self, id)?;
        Ok(out)
    }

    // -- addressing --------------------------------------------------------

    /// Address of `id`, counted from the top of the (sub)tree it belongs to.
    pub fn path(&self, id: NodeId) -> Result<Address> {
        let mut components = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current)? {
            let pos = self
                .children(parent)?
                .iter()
                .position(|&c| c == current)
                .ok_or_else(|| ArborError::address(format!("{} is not listed by its parent", current)))?;
            components.push(pos);
            current = parent;
        }
        components.reverse();
        Ok(Address::new(components))
    }

    /// Resolve an address against the tree root.
    pub fn resolve(&self, address: &Address) -> Result<NodeId> {
        self.resolve_from(self.root, address)
    }

    /// Resolve an address against an arbitrary starting node.
    pub fn resolve_from(&self, start: NodeId, address: &Address) -> Result<NodeId> {
        let mut current = start;
        for (depth, &idx) in address.components().iter().enumerate() {
            current = self.child(current, idx)?.ok_or_else(|| {
                let prefix = Address::new(address.components()[..=depth].to_vec());
                ArborError::address(format!(
                    "index {} out of range at {} while resolving {}",
                    idx, prefix, address
                ))
            })?;
        }
        Ok(current)
    }

    // -- comparison & text ---------------------------------------------------

    /// Structural ordering: by name, then value (absent first), then children.
    ///
    /// Values that cannot be ordered against each other fall back to their
    /// type tags so the ordering stays total.
    pub fn compare(&self, a: NodeId, b: NodeId) -> Result<Ordering> {
        let (da, db) = (self.data(a)?, self.data(b)?);
        let by_name = da.name.cmp(&db.name);
        if by_name != Ordering::Equal {
            return Ok(by_name);
        }
        let by_value = match (&da.value, &db.value) {
            (Value::Node(x), Value::Node(y)) if x != y => {
                if self.contains(*x) && self.contains(*y) {
                    self.compare(*x, *y)?
                } else {
                    x.cmp(y)
                }
            }
            (va, vb) => va
                .compare(vb)
                .unwrap_or_else(|| va.type_name().cmp(vb.type_name())),
        };
        if by_value != Ordering::Equal {
            return Ok(by_value);
        }
        let (ca, cb) = (da.children.clone(), db.children.clone());
        for (x, y) in ca.iter().zip(cb.iter()) {
            let ord = self.compare(*x, *y)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(ca.len().cmp(&cb.len()))
    }

    /// Text form of a value; node references render as their target's address.
    pub fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Node(id) => self
                .path(*id)
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
            other => other.to_literal().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root
    ///   _data
    ///     a:1
    ///     b:2
    ///   code
    fn sample() -> (Tree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let data = tree.add_new(root, "_data", Value::None).unwrap();
        let a = tree.add_new(data, "a", 1).unwrap();
        let b = tree.add_new(data, "b", 2).unwrap();
        let code = tree.add_new(root, "code", Value::None).unwrap();
        (tree, data, a, b, code)
    }

    #[test]
    fn add_and_insert_keep_order() {
        let (mut tree, data, a, b, _) = sample();
        let first = tree.create("first", Value::None);
        tree.insert(data, 0, first).unwrap();
        assert_eq!(tree.children(data).unwrap(), &[first, a, b]);
        assert_eq!(tree.index_in_parent(b).unwrap(), Some(2));
    }

    #[test]
    fn insert_rejects_attached_and_cycles() {
        let (mut tree, data, a, _, code) = sample();
        assert!(tree.add(code, a).unwrap_err().is_address());
        tree.detach(data).unwrap();
        assert!(tree.add(a, data).unwrap_err().is_address(), "cycle");
        let loose = tree.create("x", Value::None);
        assert!(tree.insert(code, 5, loose).unwrap_err().is_address());
    }

    #[test]
    fn path_and_resolve_agree() {
        let (tree, data, a, b, code) = sample();
        for id in [tree.root(), data, a, b, code] {
            let addr = tree.path(id).unwrap();
            assert_eq!(tree.resolve(&addr).unwrap(), id, "address {addr}");
        }
        assert_eq!(tree.path(b).unwrap().to_string(), "0-1");
    }

    #[test]
    fn resolve_out_of_range_is_address_error() {
        let (tree, ..) = sample();
        let err = tree.resolve(&"0-7".parse().unwrap()).unwrap_err();
        assert!(err.is_address());
        assert!(err.to_string().contains("0-7"));
    }

    #[test]
    fn remove_frees_subtree_and_invalidates_handles() {
        let (mut tree, data, a, b, code) = sample();
        let before = tree.len();
        tree.remove(data).unwrap();
        assert_eq!(tree.len(), before - 3);
        assert!(!tree.contains(a) && !tree.contains(b) && !tree.contains(data));
        assert!(tree.name(a).unwrap_err().is_address());
        // slot reuse does not revive old handles
        let fresh = tree.create("fresh", Value::None);
        assert!(tree.contains(fresh));
        assert!(!tree.contains(a));
        assert_eq!(tree.children(tree.root()).unwrap(), &[code]);
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut tree = Tree::new();
        let root = tree.root();
        assert!(tree.remove(root).is_err());
    }

    #[test]
    fn remove_child_at_by_index() {
        let (mut tree, data, a, b, _) = sample();
        tree.remove_child_at(data, 0).unwrap();
        assert!(!tree.contains(a));
        assert_eq!(tree.children(data).unwrap(), &[b]);
        assert!(tree.remove_child_at(data, 3).is_err());
    }

    #[test]
    fn clone_subtree_is_independent() {
        let (mut tree, data, a, ..) = sample();
        let copy = tree.clone_subtree(data).unwrap();
        assert_eq!(tree.parent(copy).unwrap(), None);
        assert_eq!(tree.compare(copy, data).unwrap(), Ordering::Equal);
        let extra = tree.create("extra", Value::None);
        tree.add(copy, extra).unwrap();
        let copied_a = tree.child(copy, 0).unwrap().unwrap();
        tree.set_value(copied_a, 99).unwrap();
        assert_eq!(tree.child_count(data).unwrap(), 2);
        assert_eq!(tree.value(a).unwrap(), &Value::Integer(1));
    }

    #[test]
    fn clone_keeps_reference_targets() {
        let (mut tree, data, a, _, code) = sample();
        tree.set_value(code, Value::Node(a)).unwrap();
        let holder = tree.create("holder", Value::None);
        tree.add(data, holder).unwrap();
        tree.set_value(holder, Value::Node(a)).unwrap();
        let copy = tree.clone_subtree(data).unwrap();
        let copied_holder = tree.child(copy, 2).unwrap().unwrap();
        assert_eq!(tree.value(copied_holder).unwrap(), &Value::Node(a));
    }

    #[test]
    fn whole_tree_clone_preserves_handles() {
        let (mut tree, _, a, ..) = sample();
        let snapshot = tree.clone();
        tree.set_name(a, "changed").unwrap();
        assert_eq!(snapshot.name(a).unwrap(), "a");
        assert_eq!(tree.name(a).unwrap(), "changed");
    }

    #[test]
    fn graft_remaps_internal_references() {
        let (mut source, data, a, b, code) = sample();
        source.set_value(b, Value::Node(a)).unwrap();
        source.set_value(code, Value::Node(a)).unwrap();
        let moved = source.extract(data).unwrap();
        let root = moved.root();
        assert_eq!(moved.name(root).unwrap(), "_data");
        let new_a = moved.child(root, 0).unwrap().unwrap();
        let new_b = moved.child(root, 1).unwrap().unwrap();
        assert_eq!(moved.value(new_b).unwrap(), &Value::Node(new_a));

        let mut target = Tree::new();
        let grafted = target.graft(&source, code).unwrap();
        assert_eq!(target.value(grafted).unwrap(), &Value::None, "outside reference dropped");
    }

    #[test]
    fn siblings_and_descendants() {
        let (tree, data, a, b, code) = sample();
        assert_eq!(tree.sibling(a, 1).unwrap(), Some(b));
        assert_eq!(tree.sibling(a, -1).unwrap(), None);
        assert_eq!(tree.sibling(data, 1).unwrap(), Some(code));
        assert_eq!(tree.descendants(tree.root()).unwrap(), vec![data, a, b, code]);
        assert_eq!(tree.top(b).unwrap(), tree.root());
    }

    #[test]
    fn sibling_offsets_at_the_integer_limits_select_nothing() {
        let (tree, _, a, b, _) = sample();
        assert_eq!(tree.sibling(b, isize::MAX).unwrap(), None);
        assert_eq!(tree.sibling(b, isize::MIN).unwrap(), None);
        assert_eq!(tree.sibling(a, isize::MIN + 1).unwrap(), None);
    }

    #[test]
    fn previous_and_next_follow_line_order() {
        let (tree, data, a, b, code) = sample();
        let root = tree.root();
        assert_eq!(tree.next_node(root).unwrap(), Some(data));
        assert_eq!(tree.next_node(a).unwrap(), Some(b));
        assert_eq!(tree.next_node(b).unwrap(), Some(code));
        assert_eq!(tree.next_node(code).unwrap(), None);
        assert_eq!(tree.previous_node(code).unwrap(), Some(b));
        assert_eq!(tree.previous_node(a).unwrap(), Some(data));
        assert_eq!(tree.previous_node(data).unwrap(), Some(root));
        assert_eq!(tree.previous_node(root).unwrap(), None);
    }

    #[test]
    fn compare_orders_by_name_value_children() {
        let (mut tree, data, a, b, _) = sample();
        assert_eq!(tree.compare(a, b).unwrap(), Ordering::Less);
        let other = tree.create("a", Value::Integer(0));
        assert_eq!(tree.compare(other, a).unwrap(), Ordering::Less);
        let bare = tree.create("a", Value::None);
        assert_eq!(tree.compare(bare, other).unwrap(), Ordering::Less);
        let copy = tree.clone_subtree(data).unwrap();
        tree.add_new(copy, "z", Value::None).unwrap();
        assert_eq!(tree.compare(data, copy).unwrap(), Ordering::Less);
    }

    #[test]
    fn stringify_renders_references_as_addresses() {
        let (tree, _, _, b, _) = sample();
        assert_eq!(tree.stringify(&Value::Node(b)), "0-1");
        assert_eq!(tree.stringify(&Value::Integer(4)), "4");
        assert_eq!(tree.stringify(&Value::None), "");
    }
}
