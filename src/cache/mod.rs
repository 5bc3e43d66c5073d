//! Normalized entity store.
//!
//! Holds every post and author fetched by the live channel exactly once and
//! the id lists of the collection queries that reference them.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! page_size = 5
//! snapshot_staleness_seconds = 60
//! collection_limit = 50
//! # ... see config.rs for all options
//! ```

mod config;
mod events;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use events::{Epoch, EventBus, StoreEvent, StoreEventKind};
pub use keys::{CollectionKey, EntityKey, EntityPatch};
pub(crate) use lock::mutex_lock;
pub use store::{Checkpoint, Entity, EntityStore};
pub(crate) use store::{METRIC_STORE_EVICT, METRIC_STORE_WRITE};
