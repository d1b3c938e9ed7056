//! Hit testing: point → element lookup.
//!
//! Reverse-walks the tree (front-to-back) to find which element is at a
//! given (x, y) screen position. Used when the host does not hand over the
//! pointer event's target element.

use crate::id::BlocId;
use crate::model::{BlocTree, rect_contains_point};

/// Find the topmost non-root element at position (px, py).
/// Returns `None` if nothing but the root is hit.
pub fn hit_test(tree: &BlocTree, px: f64, py: f64) -> Option<BlocId> {
    let root = tree.root_id();
    hit_test_node(tree, root, px, py).filter(|id| *id != root)
}

fn hit_test_node(tree: &BlocTree, id: BlocId, px: f64, py: f64) -> Option<BlocId> {
    // Later siblings paint on top, check them first
    for child in tree.children(id).into_iter().rev() {
        if let Some(hit) = hit_test_node(tree, child, px, py) {
            return Some(hit);
        }
    }

    tree.bounds(id)
        .filter(|b| rect_contains_point(*b, px, py))
        .map(|_| id)
}

/// Like [`hit_test`], but skips `exclude` and its subtree. Used to look
/// "through" the dragged element.
pub fn hit_test_excluding(tree: &BlocTree, px: f64, py: f64, exclude: BlocId) -> Option<BlocId> {
    let root = tree.root_id();
    hit_test_node_excluding(tree, root, px, py, exclude).filter(|id| *id != root)
}

fn hit_test_node_excluding(
    tree: &BlocTree,
    id: BlocId,
    px: f64,
    py: f64,
    exclude: BlocId,
) -> Option<BlocId> {
    if id == exclude {
        return None;
    }
    for child in tree.children(id).into_iter().rev() {
        if let Some(hit) = hit_test_node_excluding(tree, child, px, py, exclude) {
            return Some(hit);
        }
    }
    tree.bounds(id)
        .filter(|b| rect_contains_point(*b, px, py))
        .map(|_| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bloc;
    use kurbo::Rect;

    fn page() -> BlocTree {
        let mut tree = BlocTree::new(
            Bloc::new(BlocId::intern("canvas"), "body").with_bounds(Rect::new(0.0, 0.0, 800.0, 600.0)),
        );
        tree.append(
            BlocId::intern("canvas"),
            Bloc::new(BlocId::intern("bloc-card"), "div").with_bounds(Rect::new(10.0, 10.0, 210.0, 110.0)),
        )
        .unwrap();
        tree.append(
            BlocId::intern("bloc-card"),
            Bloc::new(BlocId::intern("bloc-title"), "h2").with_bounds(Rect::new(20.0, 20.0, 200.0, 50.0)),
        )
        .unwrap();
        tree
    }

    #[test]
    fn hit_prefers_deepest_element() {
        let tree = page();
        assert_eq!(hit_test(&tree, 30.0, 30.0), Some(BlocId::intern("bloc-title")));
        assert_eq!(hit_test(&tree, 30.0, 90.0), Some(BlocId::intern("bloc-card")));
    }

    #[test]
    fn background_is_a_miss() {
        let tree = page();
        assert_eq!(hit_test(&tree, 700.0, 500.0), None);
    }

    #[test]
    fn excluded_subtree_is_transparent() {
        let tree = page();
        assert_eq!(
            hit_test_excluding(&tree, 30.0, 30.0, BlocId::intern("bloc-card")),
            None
        );
    }
}
