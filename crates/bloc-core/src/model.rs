//! Core document model: a mirror of the page DOM as a tree of blocs.
//!
//! The host keeps this tree in sync with the live DOM (structure and
//! bounding rects). Every structural change the drag engine performs goes
//! through `BlocTree`, so the tree is always the state the host bridge
//! reports against.
//!
//! Edges go from parent → child. Child order is stored explicitly per
//! parent so sibling insertion is exact regardless of how `petgraph`
//! allocates node indices.

use crate::error::TreeError;
use crate::id::BlocId;
use kurbo::Rect;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Blocs ───────────────────────────────────────────────────────────────

/// A single element in the page tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Bloc {
    pub id: BlocId,
    /// Type tag used for drop-zone acceptance (usually the tag name or a
    /// `data-bloc-type` value).
    pub tag: String,
    /// Last known screen bounds, refreshed by the host.
    pub bounds: Rect,
    /// `data-internal-draggable` marker: opts into the internal gesture.
    pub internal_draggable: bool,
    /// Editable controls (inputs, contenteditable) never start a drag.
    pub editable: bool,
}

impl Bloc {
    pub fn new(id: BlocId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            bounds: Rect::ZERO,
            internal_draggable: false,
            editable: false,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }
}

/// Serializable bounding box in DOMRect terms (`x`, `y`, `width`, `height`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundsSpec {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<BoundsSpec> for Rect {
    fn from(b: BoundsSpec) -> Self {
        Rect::from_origin_size((b.x, b.y), (b.width.max(0.0), b.height.max(0.0)))
    }
}

impl From<Rect> for BoundsSpec {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x0,
            y: r.y0,
            width: r.width(),
            height: r.height(),
        }
    }
}

/// Nested description of a subtree, as sent by the host when it mirrors the
/// DOM into the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocSpec {
    pub id: BlocId,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub bounds: BoundsSpec,
    #[serde(default)]
    pub internal_draggable: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub children: Vec<BlocSpec>,
}

fn default_tag() -> String {
    "div".to_string()
}

// ─── Tree ────────────────────────────────────────────────────────────────

/// The mirrored page: a rooted tree of `Bloc` values.
#[derive(Debug, Clone)]
pub struct BlocTree {
    /// The underlying directed graph.
    pub graph: StableDiGraph<Bloc, ()>,

    /// The root node index (the canvas/body element).
    pub root: NodeIndex,

    /// Index from BlocId → NodeIndex for fast lookup.
    id_index: HashMap<BlocId, NodeIndex>,

    /// Child order per parent. Every parent with children has an entry.
    child_order: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl BlocTree {
    /// Create a tree holding only a root element.
    #[must_use]
    pub fn new(root: Bloc) -> Self {
        let mut graph = StableDiGraph::new();
        let id = root.id;
        let root = graph.add_node(root);
        let mut id_index = HashMap::new();
        id_index.insert(id, root);
        Self {
            graph,
            root,
            id_index,
            child_order: HashMap::new(),
        }
    }

    /// Build a tree from a host-provided nested spec.
    pub fn from_spec(spec: &BlocSpec) -> Result<Self, TreeError> {
        let mut tree = Self::new(bloc_from_spec(spec));
        for child in &spec.children {
            tree.append_spec(spec.id, child)?;
        }
        Ok(tree)
    }

    /// Append a nested spec (and its children) under `parent`.
    pub fn append_spec(&mut self, parent: BlocId, spec: &BlocSpec) -> Result<BlocId, TreeError> {
        let id = self.append(parent, bloc_from_spec(spec))?;
        for child in &spec.children {
            self.append_spec(id, child)?;
        }
        Ok(id)
    }

    /// Export the subtree rooted at `id` as a nested spec.
    pub fn to_spec(&self, id: BlocId) -> Option<BlocSpec> {
        let bloc = self.get(id)?;
        Some(BlocSpec {
            id,
            tag: bloc.tag.clone(),
            bounds: bloc.bounds.into(),
            internal_draggable: bloc.internal_draggable,
            editable: bloc.editable,
            children: self
                .children(id)
                .into_iter()
                .filter_map(|child| self.to_spec(child))
                .collect(),
        })
    }

    pub fn root_id(&self) -> BlocId {
        self.graph[self.root].id
    }

    pub fn len(&self) -> usize {
        self.id_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_index.is_empty()
    }

    pub fn contains(&self, id: BlocId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn index_of(&self, id: BlocId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    pub fn get(&self, id: BlocId) -> Option<&Bloc> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    pub fn get_mut(&mut self, id: BlocId) -> Option<&mut Bloc> {
        self.index_of(id).map(|idx| &mut self.graph[idx])
    }

    pub fn bounds(&self, id: BlocId) -> Option<Rect> {
        self.get(id).map(|b| b.bounds)
    }

    /// Update the cached screen bounds of an element. Returns false if unknown.
    pub fn set_bounds(&mut self, id: BlocId, bounds: Rect) -> bool {
        match self.get_mut(id) {
            Some(bloc) => {
                bloc.bounds = bounds;
                true
            }
            None => false,
        }
    }

    // ─── Navigation ──────────────────────────────────────────────────────

    pub fn parent(&self, id: BlocId) -> Option<BlocId> {
        let idx = self.index_of(id)?;
        self.parent_index(idx).map(|p| self.graph[p].id)
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .next()
    }

    /// Children in document order.
    pub fn children(&self, id: BlocId) -> Vec<BlocId> {
        self.index_of(id)
            .and_then(|idx| self.child_order.get(&idx))
            .map(|order| order.iter().map(|&c| self.graph[c].id).collect())
            .unwrap_or_default()
    }

    pub fn child_count(&self, id: BlocId) -> usize {
        self.index_of(id)
            .and_then(|idx| self.child_order.get(&idx))
            .map_or(0, Vec::len)
    }

    /// Position of `id` among its siblings.
    pub fn index_in_parent(&self, id: BlocId) -> Option<usize> {
        let idx = self.index_of(id)?;
        let parent = self.parent_index(idx)?;
        self.child_order.get(&parent)?.iter().position(|&c| c == idx)
    }

    /// All descendants of `id` in depth-first document order (excluding `id`).
    pub fn descendants(&self, id: BlocId) -> Vec<BlocId> {
        let mut out = Vec::new();
        let mut stack: Vec<BlocId> = self.children(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    /// Check if `ancestor` is a parent/grandparent/etc. of `descendant`.
    pub fn is_ancestor_of(&self, ancestor: BlocId, descendant: BlocId) -> bool {
        if ancestor == descendant {
            return false;
        }
        let Some(mut current) = self.index_of(descendant) else {
            return false;
        };
        while let Some(parent) = self.parent_index(current) {
            if self.graph[parent].id == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Nearest element (starting at `id` itself) whose id carries `prefix`.
    pub fn closest_with_prefix(&self, id: BlocId, prefix: &str) -> Option<BlocId> {
        let mut current = Some(id).filter(|id| self.contains(*id));
        while let Some(candidate) = current {
            if candidate.has_prefix(prefix) {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    // ─── Mutation ────────────────────────────────────────────────────────

    /// Append `bloc` as the last child of `parent`.
    pub fn append(&mut self, parent: BlocId, bloc: Bloc) -> Result<BlocId, TreeError> {
        let len = self.child_count(parent);
        self.insert(parent, len, bloc)
    }

    /// Insert `bloc` as child number `index` of `parent`.
    pub fn insert(&mut self, parent: BlocId, index: usize, bloc: Bloc) -> Result<BlocId, TreeError> {
        let parent_idx = self.index_of(parent).ok_or(TreeError::NotFound(parent))?;
        if self.contains(bloc.id) {
            return Err(TreeError::DuplicateId(bloc.id));
        }
        let len = self.child_count(parent);
        if index > len {
            return Err(TreeError::IndexOutOfRange { index, len });
        }
        let id = bloc.id;
        let idx = self.graph.add_node(bloc);
        self.graph.add_edge(parent_idx, idx, ());
        self.id_index.insert(id, idx);
        self.child_order.entry(parent_idx).or_default().insert(index, idx);
        Ok(id)
    }

    /// Move `id` (with its subtree) to position `index` of `new_parent`.
    ///
    /// `index` is interpreted against the new parent's children *after* `id`
    /// has been detached.
    pub fn move_to(&mut self, id: BlocId, new_parent: BlocId, index: usize) -> Result<(), TreeError> {
        self.check_movable(id, new_parent)?;
        let len_after_detach = self.child_count(new_parent)
            - usize::from(self.parent(id) == Some(new_parent));
        if index > len_after_detach {
            return Err(TreeError::IndexOutOfRange {
                index,
                len: len_after_detach,
            });
        }
        let idx = self.detach(id)?;
        self.attach(idx, new_parent, index)
    }

    /// Move `id` to become the previous sibling of `reference`.
    pub fn move_before(&mut self, id: BlocId, reference: BlocId) -> Result<(), TreeError> {
        self.move_relative(id, reference, 0)
    }

    /// Move `id` to become the next sibling of `reference`.
    pub fn move_after(&mut self, id: BlocId, reference: BlocId) -> Result<(), TreeError> {
        self.move_relative(id, reference, 1)
    }

    /// Move `id` to be the last child of `parent`.
    pub fn move_into(&mut self, id: BlocId, parent: BlocId) -> Result<(), TreeError> {
        self.check_movable(id, parent)?;
        let idx = self.detach(id)?;
        let len = self.child_count(parent);
        self.attach(idx, parent, len)
    }

    fn move_relative(&mut self, id: BlocId, reference: BlocId, offset: usize) -> Result<(), TreeError> {
        if id == reference {
            return Err(TreeError::Cycle {
                node: id,
                target: reference,
            });
        }
        let parent = self.parent(reference).ok_or(TreeError::RootImmutable)?;
        self.check_movable(id, parent)?;
        let idx = self.detach(id)?;
        // Sibling index is recomputed after the detach so same-parent moves land right.
        let at = self.index_in_parent(reference).ok_or(TreeError::NotFound(reference))? + offset;
        self.attach(idx, parent, at)
    }

    fn check_movable(&self, id: BlocId, new_parent: BlocId) -> Result<(), TreeError> {
        let idx = self.index_of(id).ok_or(TreeError::NotFound(id))?;
        if idx == self.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.contains(new_parent) {
            return Err(TreeError::NotFound(new_parent));
        }
        if id == new_parent || self.is_ancestor_of(id, new_parent) {
            return Err(TreeError::Cycle {
                node: id,
                target: new_parent,
            });
        }
        Ok(())
    }

    fn detach(&mut self, id: BlocId) -> Result<NodeIndex, TreeError> {
        let idx = self.index_of(id).ok_or(TreeError::NotFound(id))?;
        let parent = self.parent_index(idx).ok_or(TreeError::RootImmutable)?;
        if let Some(edge) = self.graph.find_edge(parent, idx) {
            self.graph.remove_edge(edge);
        }
        if let Some(order) = self.child_order.get_mut(&parent) {
            order.retain(|&c| c != idx);
            if order.is_empty() {
                self.child_order.remove(&parent);
            }
        }
        Ok(idx)
    }

    fn attach(&mut self, idx: NodeIndex, parent: BlocId, index: usize) -> Result<(), TreeError> {
        let parent_idx = self.index_of(parent).ok_or(TreeError::NotFound(parent))?;
        let order = self.child_order.entry(parent_idx).or_default();
        let at = index.min(order.len());
        order.insert(at, idx);
        self.graph.add_edge(parent_idx, idx, ());
        Ok(())
    }

    /// Replace the child order of `parent` with `order`, which must be a
    /// permutation of the current children.
    pub fn reorder_children(&mut self, parent: BlocId, order: &[BlocId]) -> Result<(), TreeError> {
        let parent_idx = self.index_of(parent).ok_or(TreeError::NotFound(parent))?;
        let current = self.children(parent);
        let is_permutation = current.len() == order.len()
            && current.iter().all(|c| order.contains(c))
            && order.iter().all(|c| current.contains(c));
        if !is_permutation {
            return Err(TreeError::NotAPermutation(parent));
        }
        let mut new_order = Vec::with_capacity(order.len());
        for id in order {
            new_order.push(self.index_of(*id).ok_or(TreeError::NotFound(*id))?);
        }
        self.child_order.insert(parent_idx, new_order);
        Ok(())
    }

    /// Remove `id` and its whole subtree. Returns the removed root bloc.
    pub fn remove(&mut self, id: BlocId) -> Result<Bloc, TreeError> {
        let idx = self.detach(id)?;
        for descendant in self.descendants(id) {
            if let Some(d_idx) = self.id_index.remove(&descendant) {
                self.child_order.remove(&d_idx);
                self.graph.remove_node(d_idx);
            }
        }
        self.id_index.remove(&id);
        self.child_order.remove(&idx);
        self.graph.remove_node(idx).ok_or(TreeError::NotFound(id))
    }

    /// Deep-clone the subtree at `source` and insert the copy as child
    /// number `index` of `parent`. Every cloned element gets a new id from
    /// `fresh_id`; ids already present in the tree are rejected and retried.
    /// Returns the id of the cloned root.
    pub fn clone_subtree(
        &mut self,
        source: BlocId,
        parent: BlocId,
        index: usize,
        mut fresh_id: impl FnMut(BlocId) -> BlocId,
    ) -> Result<BlocId, TreeError> {
        let spec = self.to_spec(source).ok_or(TreeError::NotFound(source))?;
        let renamed = self.rename_spec(spec, &mut fresh_id);
        let id = self.insert(parent, index, bloc_from_spec(&renamed))?;
        for child in &renamed.children {
            self.append_spec(id, child)?;
        }
        Ok(id)
    }

    fn rename_spec(&self, mut spec: BlocSpec, fresh_id: &mut impl FnMut(BlocId) -> BlocId) -> BlocSpec {
        let mut id = fresh_id(spec.id);
        while self.contains(id) {
            id = fresh_id(spec.id);
        }
        spec.id = id;
        spec.children = spec
            .children
            .into_iter()
            .map(|child| self.rename_spec(child, fresh_id))
            .collect();
        spec
    }
}

fn bloc_from_spec(spec: &BlocSpec) -> Bloc {
    Bloc {
        id: spec.id,
        tag: spec.tag.clone(),
        bounds: spec.bounds.into(),
        internal_draggable: spec.internal_draggable,
        editable: spec.editable,
    }
}

// ─── Geometry helpers ────────────────────────────────────────────────────

/// True if `inner` lies entirely within `outer` (edges inclusive).
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// Point containment with inclusive edges, matching `getBoundingClientRect`
/// hit checks (`kurbo::Rect::contains` is half-open).
pub fn rect_contains_point(rect: Rect, x: f64, y: f64) -> bool {
    x >= rect.x0 && x <= rect.x1 && y >= rect.y0 && y <= rect.y1
}
