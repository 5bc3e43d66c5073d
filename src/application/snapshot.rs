//! Bootstrap snapshots rendered before the live channel is mounted.
//!
//! A snapshot is served from a bounded cache while younger than the
//! staleness window and re-fetched afterwards. Source failures never reach
//! the caller: a collection degrades to empty and a post to absent.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use lru::LruCache;
use metrics::counter;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::pagination::CollectionView;
use crate::application::repos::SnapshotSource;
use crate::cache::{CacheConfig, mutex_lock};
use crate::domain::entities::PostView;
use crate::domain::types::PostFilter;

const SOURCE: &str = "application::snapshot";
pub(crate) const METRIC_SNAPSHOT_FALLBACK: &str = "folio_snapshot_fallback_total";

/// A one-shot bootstrap value handed to a view at mount time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub value: T,
    /// Age of the data when it was handed out.
    pub age: Duration,
    /// Set when the source failed and `value` is the empty fallback.
    pub degraded: bool,
}

impl<T> Snapshot<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            age: Duration::ZERO,
            degraded: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            age: Duration::ZERO,
            degraded: true,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SnapshotKey {
    Collection(PostFilter),
    Post(Uuid),
}

#[derive(Debug, Clone)]
enum SnapshotValue {
    Collection(CollectionView),
    Post(Option<PostView>),
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    value: SnapshotValue,
    fetched_at: Instant,
}

pub struct SnapshotBootstrap {
    source: Arc<dyn SnapshotSource>,
    page_size: u32,
    staleness: Duration,
    entries: Mutex<LruCache<SnapshotKey, CachedSnapshot>>,
}

impl SnapshotBootstrap {
    pub fn new(source: Arc<dyn SnapshotSource>, config: &CacheConfig) -> Self {
        Self {
            source,
            page_size: config.page_size_non_zero().get(),
            staleness: config.snapshot_staleness(),
            entries: Mutex::new(LruCache::new(config.snapshot_limit_non_zero())),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// First page of a collection, newest first.
    #[instrument(skip(self))]
    pub async fn collection(&self, filter: PostFilter) -> Snapshot<CollectionView> {
        let key = SnapshotKey::Collection(filter);
        if let Some((SnapshotValue::Collection(view), age)) = self.lookup(key) {
            return Snapshot {
                value: view,
                age,
                degraded: false,
            };
        }

        match self.source.snapshot_page(filter, self.page_size).await {
            Ok(page) => {
                let view = CollectionView::from(page);
                debug!(members = view.len(), "Snapshot collection fetched");
                self.store(key, SnapshotValue::Collection(view.clone()));
                Snapshot::fresh(view)
            }
            Err(err) => {
                counter!(METRIC_SNAPSHOT_FALLBACK, "shape" => "collection").increment(1);
                warn!(error = %err, "Snapshot collection unavailable; rendering empty list");
                Snapshot::fallback(CollectionView::empty())
            }
        }
    }

    /// A single post, or `None` when it does not exist or cannot be fetched.
    #[instrument(skip(self))]
    pub async fn entity(&self, id: Uuid) -> Snapshot<Option<PostView>> {
        let key = SnapshotKey::Post(id);
        if let Some((SnapshotValue::Post(view), age)) = self.lookup(key) {
            return Snapshot {
                value: view,
                age,
                degraded: false,
            };
        }

        match self.source.snapshot_post(id).await {
            Ok(node) => {
                let view = node.map(PostView::from);
                self.store(key, SnapshotValue::Post(view.clone()));
                Snapshot::fresh(view)
            }
            Err(err) => {
                counter!(METRIC_SNAPSHOT_FALLBACK, "shape" => "entity").increment(1);
                warn!(error = %err, "Snapshot post unavailable; rendering as absent");
                Snapshot::fallback(None)
            }
        }
    }

    /// Prime detail snapshots for the newest `count` published posts.
    ///
    /// Returns the ids that were primed.
    #[instrument(skip(self))]
    pub async fn warm(&self, count: usize) -> Vec<Uuid> {
        if count == 0 {
            return Vec::new();
        }
        let first = u32::try_from(count).unwrap_or(u32::MAX);
        let page = match self.source.snapshot_page(PostFilter::Published, first).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "Snapshot warm-up skipped");
                return Vec::new();
            }
        };

        let ids: Vec<Uuid> = page.nodes.iter().map(|node| node.id()).take(count).collect();
        let results = join_all(ids.iter().map(|id| self.entity(*id))).await;
        let primed: Vec<Uuid> = ids
            .into_iter()
            .zip(results)
            .filter(|(_, snapshot)| !snapshot.degraded && snapshot.value.is_some())
            .map(|(id, _)| id)
            .collect();

        info!(requested = count, primed = primed.len(), "Snapshot cache warmed");
        primed
    }

    fn lookup(&self, key: SnapshotKey) -> Option<(SnapshotValue, Duration)> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "lookup");
        let entry = entries.get(&key)?;
        let age = entry.fetched_at.elapsed();
        if age < self.staleness {
            Some((entry.value.clone(), age))
        } else {
            entries.pop(&key);
            None
        }
    }

    fn store(&self, key: SnapshotKey, value: SnapshotValue) {
        mutex_lock(&self.entries, SOURCE, "store").put(
            key,
            CachedSnapshot {
                value,
                fetched_at: Instant::now(),
            },
        );
    }
}
