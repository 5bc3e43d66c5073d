//! Entity store change events.
//!
//! Every store write publishes one event on a broadcast channel so live
//! consumers re-read without issuing a fetch.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::types::CollectionKind;

use super::keys::{CollectionKey, EntityKey};

const EVENT_CAPACITY: usize = 256;

/// Monotonic epoch for ordering events within one store.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub epoch: Epoch,
    pub kind: StoreEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEventKind {
    /// A post or author was upserted.
    EntityWritten(EntityKey),
    /// A post is marked for deletion but not yet confirmed.
    PostTombstoned(Uuid),
    /// A post was dropped from the store and every cached collection.
    PostRemoved(Uuid),
    /// A page was written into a collection.
    PageWritten(CollectionKey),
    /// Membership of a cached collection changed outside a page write.
    MembersChanged(CollectionKey),
    /// All cached pages for one collection kind were discarded.
    CollectionEvicted(CollectionKind),
    /// A checkpoint was restored after a failed mutation.
    RolledBack,
}

impl StoreEventKind {
    /// Whether a consumer of `key` needs to re-read after this event.
    pub fn touches_collection(&self, key: &CollectionKey) -> bool {
        match self {
            StoreEventKind::MembersChanged(changed) => changed == key,
            StoreEventKind::CollectionEvicted(kind) => *kind == key.kind(),
            // Any other write may carry fields of a post this collection holds.
            _ => true,
        }
    }

    /// Whether a consumer of post `id` needs to re-read after this event.
    pub fn touches_post(&self, id: Uuid) -> bool {
        match self {
            StoreEventKind::EntityWritten(EntityKey::Post(written))
            | StoreEventKind::PostTombstoned(written)
            | StoreEventKind::PostRemoved(written) => *written == id,
            // Pages carry post fields; authors are embedded in posts.
            StoreEventKind::PageWritten(_)
            | StoreEventKind::EntityWritten(EntityKey::Author(_))
            | StoreEventKind::RolledBack => true,
            StoreEventKind::MembersChanged(_) | StoreEventKind::CollectionEvicted(_) => false,
        }
    }
}

/// Broadcast fan-out of store events.
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
    epoch_counter: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Latest epoch handed out, or zero before any event.
    pub fn current_epoch(&self) -> Epoch {
        self.epoch_counter.load(Ordering::SeqCst)
    }

    pub fn publish(&self, kind: StoreEventKind) -> Epoch {
        let epoch = self.next_epoch();
        debug!(event_epoch = epoch, event_kind = ?kind, "Store event published");
        // No subscribers is fine: nothing is mounted yet.
        let _ = self.sender.send(StoreEvent { epoch, kind });
        epoch
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
