pub mod cache;
pub mod error;
pub mod events;
pub mod hit;
pub mod id;
pub mod model;

pub use cache::TtlCache;
pub use error::TreeError;
pub use events::{EventBus, SubscriptionId};
pub use hit::{hit_test, hit_test_excluding};
pub use id::{BLOC_PREFIX, BlocId, ZoneId};
pub use model::*;

// Re-export geometry types so downstream crates don't need a direct dependency
pub use kurbo::{Point, Rect};
