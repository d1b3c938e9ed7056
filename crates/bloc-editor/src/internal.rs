//! Internal reorder gesture.
//!
//! A container marked `data-internal-draggable` rearranges its own bloc
//! children based on how the pointer moved while it was held, instead of
//! being carried somewhere else.

use bloc_core::{BlocId, BlocTree, TreeError};
use smallvec::SmallVec;

use crate::operation::Direction;

/// Pointer displacement samples for one gesture.
#[derive(Debug, Clone, Default)]
pub struct GestureSamples {
    samples: SmallVec<[(f64, f64); 32]>,
}

impl GestureSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pointer's displacement from the press origin.
    pub fn record(&mut self, dx: f64, dy: f64) {
        self.samples.push((dx, dy));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Classify the dominant axis by comparing average |dx| with |dy|.
    /// One axis wins when it exceeds the other by `axis_ratio`.
    pub fn direction(&self, axis_ratio: f64) -> Direction {
        if self.samples.is_empty() {
            return Direction::Mixed;
        }
        let n = self.samples.len() as f64;
        let (sx, sy) = self
            .samples
            .iter()
            .fold((0.0_f64, 0.0_f64), |(ax, ay), &(dx, dy)| (ax + dx, ay + dy));
        let (avg_x, avg_y) = (sx / n, sy / n);

        if avg_x.abs() >= avg_y.abs() * axis_ratio && avg_x != 0.0 {
            if avg_x > 0.0 { Direction::Right } else { Direction::Left }
        } else if avg_y.abs() >= avg_x.abs() * axis_ratio && avg_y != 0.0 {
            if avg_y > 0.0 { Direction::Down } else { Direction::Up }
        } else {
            Direction::Mixed
        }
    }
}

/// New order for `container`'s children after a gesture in `direction`.
///
/// Only children carrying `prefix` take part; they are permuted among the
/// slots they already occupy, so non-draggable children keep their places.
/// Returns `None` when the order would not change.
pub fn reordered_children(
    tree: &BlocTree,
    container: BlocId,
    direction: Direction,
    prefix: &str,
) -> Option<Vec<BlocId>> {
    let children = tree.children(container);
    let slots: Vec<usize> = children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.has_prefix(prefix))
        .map(|(i, _)| i)
        .collect();
    if slots.len() < 2 {
        return None;
    }

    let mut movable: Vec<BlocId> = slots.iter().map(|&i| children[i]).collect();
    let top = |id: &BlocId| tree.bounds(*id).map_or(0.0, |r| r.y0);
    let left = |id: &BlocId| tree.bounds(*id).map_or(0.0, |r| r.x0);
    match direction {
        Direction::Right => movable.rotate_right(1),
        Direction::Left => movable.rotate_left(1),
        Direction::Down => movable.sort_by(|a, b| top(a).total_cmp(&top(b))),
        Direction::Up => movable.sort_by(|a, b| top(b).total_cmp(&top(a))),
        Direction::Mixed => movable.sort_by(|a, b| top(a).total_cmp(&top(b)).then(left(a).total_cmp(&left(b)))),
    }

    let mut order = children.clone();
    for (slot, id) in slots.iter().zip(movable) {
        order[*slot] = id;
    }
    (order != children).then_some(order)
}

/// Apply the gesture to the tree. `Ok(None)` when nothing moved.
pub fn apply_internal_reorder(
    tree: &mut BlocTree,
    container: BlocId,
    direction: Direction,
    prefix: &str,
) -> Result<Option<Vec<BlocId>>, TreeError> {
    let Some(order) = reordered_children(tree, container, direction, prefix) else {
        return Ok(None);
    };
    tree.reorder_children(container, &order)?;
    Ok(Some(order))
}
