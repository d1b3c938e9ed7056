//! Drop-zone registry and bounds cache.
//!
//! Zone bounds are snapshotted from the tree and reused for
//! `zone_cache_ttl_ms` instead of being re-read on every pointer move.
//!
//! `find_zone_at` returns the first matching zone in registration order.
//! Registration order therefore acts as z-priority; overlapping zones are
//! not resolved by visual stacking order.

use bloc_core::{BlocId, BlocTree, Rect, TtlCache, ZoneId, rect_contains_point};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// How many children a zone may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    #[default]
    Unlimited,
    Bounded(usize),
}

/// Registration payload, as passed by page setup code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    pub element: BlocId,
    /// Accepted type tags. Empty (or containing `"*"`) accepts anything.
    #[serde(default)]
    pub accepted_types: SmallVec<[String; 4]>,
    /// Maximum number of children; absent means unlimited.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default = "default_true")]
    pub visual_feedback: bool,
}

fn default_true() -> bool {
    true
}

impl ZoneSpec {
    pub fn new(element: BlocId) -> Self {
        Self {
            element,
            accepted_types: SmallVec::new(),
            capacity: None,
            visual_feedback: true,
        }
    }
}

/// A registered drop zone.
#[derive(Debug, Clone, PartialEq)]
pub struct DropZone {
    pub id: ZoneId,
    pub element: BlocId,
    pub accepted_types: SmallVec<[String; 4]>,
    pub capacity: Capacity,
    pub visual_feedback: bool,
}

impl DropZone {
    fn from_spec(id: ZoneId, spec: ZoneSpec) -> Self {
        Self {
            id,
            element: spec.element,
            accepted_types: spec.accepted_types,
            capacity: spec.capacity.map_or(Capacity::Unlimited, Capacity::Bounded),
            visual_feedback: spec.visual_feedback,
        }
    }

    pub fn accepts(&self, type_tag: &str) -> bool {
        self.accepted_types.is_empty()
            || self
                .accepted_types
                .iter()
                .any(|t| t == "*" || t.eq_ignore_ascii_case(type_tag))
    }

    /// Whether `incoming` can be added as a child. An element that already
    /// lives in the zone and is only being moved does not count twice.
    pub fn has_room(&self, tree: &BlocTree, incoming: BlocId, moving: bool) -> bool {
        match self.capacity {
            Capacity::Unlimited => true,
            Capacity::Bounded(max) => {
                let already_inside = moving && tree.parent(incoming) == Some(self.element);
                let count = tree.child_count(self.element) - usize::from(already_inside);
                count < max
            }
        }
    }
}

pub struct SpatialIndex {
    zones: IndexMap<ZoneId, DropZone>,
    rects: TtlCache<ZoneId, Option<Rect>>,
}

impl SpatialIndex {
    pub fn new(ttl_ms: f64) -> Self {
        Self {
            zones: IndexMap::new(),
            rects: TtlCache::new(ttl_ms, usize::MAX),
        }
    }

    /// Register (or re-register in place) a zone.
    pub fn register(&mut self, id: ZoneId, spec: ZoneSpec) {
        log::debug!("register drop zone {id} on {}", spec.element);
        self.rects.invalidate(&id);
        self.zones.insert(id, DropZone::from_spec(id, spec));
    }

    /// Remove a zone. Returns false for unknown ids.
    pub fn unregister(&mut self, id: ZoneId) -> bool {
        self.rects.invalidate(&id);
        // shift_remove keeps the registration order of the remaining zones
        self.zones.shift_remove(&id).is_some()
    }

    /// Remove every zone whose element is no longer in the tree.
    pub fn unregister_missing(&mut self, tree: &BlocTree) -> Vec<ZoneId> {
        let gone: Vec<ZoneId> = self
            .zones
            .values()
            .filter(|z| !tree.contains(z.element))
            .map(|z| z.id)
            .collect();
        for id in &gone {
            self.unregister(*id);
        }
        gone
    }

    pub fn get(&self, id: ZoneId) -> Option<&DropZone> {
        self.zones.get(&id)
    }

    pub fn zone_for_element(&self, element: BlocId) -> Option<&DropZone> {
        self.zones.values().find(|z| z.element == element)
    }

    /// Evict cached bounds of any zone on `element`.
    pub fn invalidate_element(&mut self, element: BlocId) {
        for zone in self.zones.values() {
            if zone.element == element {
                self.rects.invalidate(&zone.id);
            }
        }
    }

    pub fn invalidate_all(&mut self) {
        self.rects.clear();
    }

    /// Cached bounds of a zone, refreshed from the tree when stale.
    pub fn zone_rect(&mut self, tree: &BlocTree, id: ZoneId, now_ms: f64) -> Option<Rect> {
        let element = self.zones.get(&id)?.element;
        self.rects
            .get_or_refresh(id, now_ms, || tree.bounds(element))
    }

    /// First zone (in registration order) containing the point and
    /// accepting `type_tag`.
    pub fn find_zone_at(
        &mut self,
        tree: &BlocTree,
        x: f64,
        y: f64,
        type_tag: &str,
        now_ms: f64,
    ) -> Option<&DropZone> {
        let ids: Vec<ZoneId> = self.zones.keys().copied().collect();
        let hit = ids.into_iter().find(|id| {
            let accepts = self.zones.get(id).is_some_and(|z| z.accepts(type_tag));
            accepts
                && self
                    .zone_rect(tree, *id, now_ms)
                    .is_some_and(|r| rect_contains_point(r, x, y))
        })?;
        self.zones.get(&hit)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
