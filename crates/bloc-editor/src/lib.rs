pub mod classify;
pub mod config;
pub mod error;
pub mod feedback;
pub mod input;
pub mod internal;
pub mod operation;
pub mod position;
pub mod recovery;
pub mod session;
pub mod shortcuts;
pub mod spatial;
pub mod stats;

pub use classify::{DragIntent, DragType, IgnoreReason, classify};
pub use config::EngineConfig;
pub use error::{ActionError, BridgeError, DropError};
pub use feedback::{Artifact, ArtifactId, FeedbackRenderer, FeedbackSnapshot, ToastLevel};
pub use input::{InputEvent, Modifiers, PointerButton};
pub use operation::{
    BridgePayload, Direction, FlushOutcome, HostBridge, LayoutKind, Operation, OperationKind, OperationQueue,
};
pub use position::{PositionKind, PositionResolver, PositionResult, ResolverParams, resolve_position};
pub use recovery::{RecoveryMonitor, RecoveryReason};
pub use session::{DragEngine, DragSession, DragState, EngineEvent};
pub use spatial::{Capacity, DropZone, SpatialIndex, ZoneSpec};
pub use stats::{DragStats, StatsReport};
