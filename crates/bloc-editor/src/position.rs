//! Drop position resolution.
//!
//! Given the dragged element, a candidate target, and the pointer, decide
//! whether the drop lands before, after, or inside the target.
//!
//! Four candidates are scored (lower priority wins, ties go to the earlier
//! candidate):
//!
//! | Candidate | Priority | Considered when |
//! |-----------|----------|-----------------|
//! | Before | 1 within `edge_proximity` of the top edge, else 2 | pointer within the target's horizontal span |
//! | After | 1 within `edge_proximity` of the bottom edge, else 2 | pointer within the target's horizontal span |
//! | Inside | 0.5 within `inside_proximity` of the center, else 1.5 | center distance ≤ half the smaller side |
//! | Nearest side | 3 | always |

use bloc_core::{BlocId, BlocTree, Rect, TtlCache, rect_contains_rect};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionKind {
    Before,
    After,
    Inside,
}

/// Thresholds for candidate scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverParams {
    pub edge_proximity: f64,
    pub inside_proximity: f64,
}

impl Default for ResolverParams {
    fn default() -> Self {
        Self {
            edge_proximity: 20.0,
            inside_proximity: 50.0,
        }
    }
}

/// Geometry-only outcome of position scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub kind: PositionKind,
    pub is_valid: bool,
}

/// Resolved drop position against a concrete target in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResult {
    pub kind: PositionKind,
    pub target: BlocId,
    /// Insertion index in the receiving parent, before the source is detached.
    pub target_index: usize,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    kind: PositionKind,
    priority: f64,
}

/// Score the candidates for a pointer at (`x`, `y`) over `target_bounds`.
///
/// Pure: identical inputs always give the identical placement. The result
/// is invalid when the target is the source itself or lies geometrically
/// inside the source's bounds.
pub fn resolve_position(
    source: BlocId,
    source_bounds: Rect,
    target: BlocId,
    target_bounds: Rect,
    x: f64,
    y: f64,
    params: ResolverParams,
) -> Placement {
    let center = target_bounds.center();
    let center_dist = ((x - center.x).powi(2) + (y - center.y).powi(2)).sqrt();
    let within_span = x >= target_bounds.x0 && x <= target_bounds.x1;

    let mut candidates: SmallVec<[Candidate; 4]> = SmallVec::new();
    if within_span {
        let top_dist = (y - target_bounds.y0).abs();
        let bottom_dist = (y - target_bounds.y1).abs();
        candidates.push(Candidate {
            kind: PositionKind::Before,
            priority: if top_dist <= params.edge_proximity { 1.0 } else { 2.0 },
        });
        candidates.push(Candidate {
            kind: PositionKind::After,
            priority: if bottom_dist <= params.edge_proximity { 1.0 } else { 2.0 },
        });
    }
    let inside_limit = target_bounds.width().min(target_bounds.height()) / 2.0;
    if center_dist <= inside_limit {
        candidates.push(Candidate {
            kind: PositionKind::Inside,
            priority: if center_dist < params.inside_proximity { 0.5 } else { 1.5 },
        });
    }
    candidates.push(Candidate {
        kind: if y < center.y {
            PositionKind::Before
        } else {
            PositionKind::After
        },
        priority: 3.0,
    });

    let mut best = candidates[0];
    for c in &candidates[1..] {
        if c.priority < best.priority {
            best = *c;
        }
    }

    let self_or_inside_source = source == target
        || (source_bounds.area() > 0.0 && rect_contains_rect(source_bounds, target_bounds));
    Placement {
        kind: best.kind,
        is_valid: !self_or_inside_source,
    }
}

type CacheKey = (BlocId, BlocId, i64, i64);

/// Memoizing wrapper around [`resolve_position`] that also applies the
/// tree-level descendant check and computes the insertion index.
pub struct PositionResolver {
    params: ResolverParams,
    cache: TtlCache<CacheKey, PositionResult>,
}

impl PositionResolver {
    pub fn new(params: ResolverParams, ttl_ms: f64, max_entries: usize) -> Self {
        Self {
            params,
            cache: TtlCache::new(ttl_ms, max_entries),
        }
    }

    pub fn resolve(
        &mut self,
        tree: &BlocTree,
        source: BlocId,
        target: BlocId,
        x: f64,
        y: f64,
        now_ms: f64,
    ) -> PositionResult {
        let key = (source, target, x.round() as i64, y.round() as i64);
        let params = self.params;
        self.cache
            .get_or_refresh(key, now_ms, || resolve_in_tree(tree, source, target, x, y, params))
    }

    /// Drop all memoized results (after any structural change).
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn prune(&mut self, now_ms: f64) {
        self.cache.prune(now_ms);
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn resolve_in_tree(
    tree: &BlocTree,
    source: BlocId,
    target: BlocId,
    x: f64,
    y: f64,
    params: ResolverParams,
) -> PositionResult {
    let source_bounds = tree.bounds(source).unwrap_or(Rect::ZERO);
    let target_bounds = tree.bounds(target).unwrap_or(Rect::ZERO);
    let placement = resolve_position(source, source_bounds, target, target_bounds, x, y, params);

    let target_index = match placement.kind {
        PositionKind::Before => tree.index_in_parent(target).unwrap_or(0),
        PositionKind::After => tree.index_in_parent(target).map_or(0, |i| i + 1),
        PositionKind::Inside => tree.child_count(target),
    };
    // Root has no siblings: only Inside is meaningful there.
    let sibling_ok = placement.kind == PositionKind::Inside || tree.parent(target).is_some();

    PositionResult {
        kind: placement.kind,
        target,
        target_index,
        is_valid: placement.is_valid
            && sibling_ok
            && tree.contains(target)
            && !tree.is_ancestor_of(source, target),
    }
}
