//! Completed structural changes and their delivery to the host.
//!
//! Every mutation the engine performs is recorded as an [`Operation`] after
//! the tree already reflects it. Operations sit in the [`OperationQueue`]
//! until a flush hands them to the [`HostBridge`] (typically the host
//! application's persistence layer).

use bloc_core::BlocId;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::classify::DragType;
use crate::error::BridgeError;

/// Aggregate direction of an internal reorder gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    Mixed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
            Self::Mixed => "mixed",
        }
    }
}

/// Container layout reported by an external layout heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum LayoutKind {
    Block,
    FlexRow,
    FlexColumn,
    Grid { columns: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    #[serde(rename_all = "camelCase")]
    Move {
        element: BlocId,
        from_parent: BlocId,
        from_index: usize,
        parent: BlocId,
        index: usize,
    },
    #[serde(rename_all = "camelCase")]
    Reorder {
        element: BlocId,
        from_parent: BlocId,
        from_index: usize,
        parent: BlocId,
        index: usize,
    },
    Duplicate {
        source: BlocId,
        element: BlocId,
        parent: BlocId,
        index: usize,
    },
    Delete {
        element: BlocId,
        parent: BlocId,
        index: usize,
    },
    InternalReorder {
        container: BlocId,
        direction: Direction,
        order: Vec<BlocId>,
    },
    LayoutChanged {
        container: BlocId,
        layout: LayoutKind,
    },
}

impl OperationKind {
    /// The element the operation is about.
    pub fn element(&self) -> BlocId {
        match self {
            Self::Move { element, .. }
            | Self::Reorder { element, .. }
            | Self::Duplicate { element, .. }
            | Self::Delete { element, .. } => *element,
            Self::InternalReorder { container, .. } | Self::LayoutChanged { container, .. } => *container,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Reorder { .. } => "reorder",
            Self::Duplicate { .. } => "duplicate",
            Self::Delete { .. } => "delete",
            Self::InternalReorder { .. } => "internalReorder",
            Self::LayoutChanged { .. } => "layoutChanged",
        }
    }
}

/// An immutable record of one completed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub seq: u64,
    pub timestamp_ms: f64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl Operation {
    /// Flatten into the payload shape the host bridge understands.
    pub fn to_payload(&self) -> BridgePayload {
        let mut payload = BridgePayload {
            event: self.kind.name(),
            element_id: self.kind.element(),
            parent_id: None,
            index: None,
            drag_type: None,
            source_id: None,
            direction: None,
            order: None,
            layout: None,
        };
        match &self.kind {
            OperationKind::Move { parent, index, .. } => {
                payload.parent_id = Some(*parent);
                payload.index = Some(*index);
                payload.drag_type = Some(DragType::External);
            }
            OperationKind::Reorder { parent, index, .. } => {
                payload.parent_id = Some(*parent);
                payload.index = Some(*index);
                payload.drag_type = Some(DragType::Reorder);
            }
            OperationKind::Duplicate {
                source, parent, index, ..
            } => {
                payload.parent_id = Some(*parent);
                payload.index = Some(*index);
                payload.drag_type = Some(DragType::Duplicate);
                payload.source_id = Some(*source);
            }
            OperationKind::Delete { parent, index, .. } => {
                payload.parent_id = Some(*parent);
                payload.index = Some(*index);
            }
            OperationKind::InternalReorder { direction, order, .. } => {
                payload.drag_type = Some(DragType::Internal);
                payload.direction = Some(*direction);
                payload.order = Some(order.clone());
            }
            OperationKind::LayoutChanged { layout, .. } => {
                payload.layout = Some(*layout);
            }
        }
        payload
    }
}

/// One message to the host, in `(element, parent, index, drag type)` form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgePayload {
    pub event: &'static str,
    pub element_id: BlocId,
    pub parent_id: Option<BlocId>,
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drag_type: Option<DragType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<BlocId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<BlocId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutKind>,
}

/// One-way channel to the host application.
pub trait HostBridge {
    fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError>;
}

/// Outcome of a flush request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was sent because a drag session is in flight.
    Suppressed,
    /// Another flush is still running; this request was ignored.
    Busy,
    /// `n` operations were handed to the bridge (or discarded without one).
    Flushed(usize),
}

/// Append-only operation buffer.
///
/// Interior mutability lets the queue be flushed through a shared
/// reference; a bridge that calls back into the engine while a flush is
/// running sees `Busy` and its enqueued operations wait for the next cycle.
#[derive(Debug, Default)]
pub struct OperationQueue {
    pending: RefCell<Vec<Operation>>,
    next_seq: Cell<u64>,
    last_timestamp: Cell<f64>,
    flushing: Cell<bool>,
    delivered: Cell<u64>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. Timestamps never go backwards even if the host
    /// clock does.
    pub fn enqueue(&self, kind: OperationKind, now_ms: f64) -> Operation {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let timestamp_ms = now_ms.max(self.last_timestamp.get());
        self.last_timestamp.set(timestamp_ms);
        let op = Operation {
            seq,
            timestamp_ms,
            kind,
        };
        log::debug!("enqueue #{seq} {}", op.kind.name());
        self.pending.borrow_mut().push(op.clone());
        op
    }

    pub fn pending(&self) -> Vec<Operation> {
        self.pending.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Drop everything not yet delivered.
    pub fn clear(&self) -> usize {
        self.pending.take().len()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Total operations handed off since creation.
    pub fn delivered(&self) -> u64 {
        self.delivered.get()
    }

    /// Deliver the current batch. Bridge failures (errors or panics) are
    /// logged and the operation is considered delivered.
    pub fn flush(&self, session_active: bool, bridge: Option<&dyn HostBridge>) -> FlushOutcome {
        if session_active {
            return FlushOutcome::Suppressed;
        }
        if self.flushing.replace(true) {
            return FlushOutcome::Busy;
        }

        let batch = self.pending.take();
        for op in &batch {
            let Some(bridge) = bridge else { break };
            let payload = op.to_payload();
            match catch_unwind(AssertUnwindSafe(|| bridge.notify(&payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("bridge failed on #{} {}: {e}", op.seq, payload.event),
                Err(_) => log::error!("bridge panicked on #{} {}", op.seq, payload.event),
            }
        }
        if bridge.is_none() && !batch.is_empty() {
            log::debug!("no host bridge; discarding {} operation(s)", batch.len());
        }

        self.delivered.set(self.delivered.get() + batch.len() as u64);
        self.flushing.set(false);
        FlushOutcome::Flushed(batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn id(s: &str) -> BlocId {
        BlocId::intern(s)
    }

    fn delete(element: &str) -> OperationKind {
        OperationKind::Delete {
            element: id(element),
            parent: id("canvas"),
            index: 0,
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<String>>,
    }

    impl HostBridge for Rc<Recorder> {
        fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError> {
            self.seen.borrow_mut().push(serde_json::to_string(payload)?);
            Ok(())
        }
    }

    struct Failing;

    impl HostBridge for Failing {
        fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError> {
            Err(BridgeError::Rejected {
                event: payload.event,
                message: "offline".into(),
            })
        }
    }

    struct Panicking;

    impl HostBridge for Panicking {
        fn notify(&self, _: &BridgePayload) -> Result<(), BridgeError> {
            panic!("host blew up")
        }
    }

    #[test]
    fn sequence_and_timestamps_are_monotonic() {
        let q = OperationQueue::new();
        let a = q.enqueue(delete("bloc-a"), 100.0);
        let b = q.enqueue(delete("bloc-b"), 50.0);
        assert_eq!((a.seq, b.seq), (0, 1));
        assert_eq!(b.timestamp_ms, 100.0);
    }

    #[test]
    fn flush_is_suppressed_during_a_session() {
        let q = OperationQueue::new();
        q.enqueue(delete("bloc-a"), 0.0);
        assert_eq!(q.flush(true, None), FlushOutcome::Suppressed);
        assert_eq!(q.len(), 1);
        assert_eq!(q.flush(false, None), FlushOutcome::Flushed(1));
        assert!(q.is_empty());
    }

    #[test]
    fn flush_delivers_payloads_in_order() {
        let q = OperationQueue::new();
        let rec = Rc::new(Recorder::default());
        q.enqueue(delete("bloc-a"), 0.0);
        q.enqueue(
            OperationKind::Move {
                element: id("bloc-b"),
                from_parent: id("canvas"),
                from_index: 1,
                parent: id("bloc-c"),
                index: 0,
            },
            1.0,
        );
        assert_eq!(q.flush(false, Some(&rec)), FlushOutcome::Flushed(2));
        let seen = rec.seen.borrow();
        assert_eq!(
            seen[0],
            r#"{"event":"delete","elementId":"bloc-a","parentId":"canvas","index":0}"#
        );
        assert_eq!(
            seen[1],
            r#"{"event":"move","elementId":"bloc-b","parentId":"bloc-c","index":0,"dragType":"external"}"#
        );
        assert_eq!(q.delivered(), 2);
    }

    struct Reentrant<'a> {
        queue: &'a OperationQueue,
        nested: RefCell<Vec<FlushOutcome>>,
    }

    impl HostBridge for Reentrant<'_> {
        fn notify(&self, _: &BridgePayload) -> Result<(), BridgeError> {
            self.queue.enqueue(delete("bloc-late"), 5.0);
            self.nested.borrow_mut().push(self.queue.flush(false, Some(self)));
            Ok(())
        }
    }

    #[test]
    fn flush_is_not_reentrant() {
        let q = OperationQueue::new();
        q.enqueue(delete("bloc-a"), 0.0);
        let bridge = Reentrant {
            queue: &q,
            nested: RefCell::new(Vec::new()),
        };
        assert_eq!(q.flush(false, Some(&bridge)), FlushOutcome::Flushed(1));
        assert_eq!(*bridge.nested.borrow(), vec![FlushOutcome::Busy]);
        // The operation enqueued mid-flush waits for the next cycle
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn bridge_failures_are_swallowed() {
        let q = OperationQueue::new();
        q.enqueue(delete("bloc-a"), 0.0);
        q.enqueue(delete("bloc-b"), 0.0);
        assert_eq!(q.flush(false, Some(&Failing)), FlushOutcome::Flushed(2));
        q.enqueue(delete("bloc-c"), 0.0);
        assert_eq!(q.flush(false, Some(&Panicking)), FlushOutcome::Flushed(1));
        assert!(!q.is_flushing());
    }

    #[test]
    fn operation_json_is_tagged_by_type() {
        let op = Operation {
            seq: 3,
            timestamp_ms: 12.0,
            kind: OperationKind::InternalReorder {
                container: id("bloc-row"),
                direction: Direction::Right,
                order: vec![id("bloc-r2"), id("bloc-r1")],
            },
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "internalReorder");
        assert_eq!(json["direction"], "right");
        assert_eq!(json["seq"], 3);
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
