//! The live query channel.
//!
//! Every read goes to the live backend and lands in the entity store;
//! watchers re-read the store whenever a relevant store event arrives, so
//! writes made by anyone (another watcher, a mutation) show up without a
//! fetch of their own.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::pagination::CollectionView;
use crate::application::repos::{LiveSource, SourceError};
use crate::cache::{
    CacheConfig, CollectionKey, EntityPatch, EntityStore, StoreEvent, StoreEventKind,
};
use crate::domain::entities::{AuthorRecord, PostView};
use crate::domain::fields::AuthorFields;
use crate::domain::types::PostFilter;

pub(crate) const METRIC_LIVE_FETCH_MS: &str = "folio_live_fetch_ms";

/// Result of a live query as a view sees it.
///
/// An error keeps the last good `data` next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<SourceError>,
}

impl<T> QueryState<T> {
    /// State of a query whose first fetch has not completed.
    pub fn pending(data: Option<T>) -> Self {
        Self {
            data,
            loading: true,
            error: None,
        }
    }

    pub fn ready(data: T) -> Self {
        Self {
            data: Some(data),
            loading: false,
            error: None,
        }
    }

    pub fn failed(data: Option<T>, error: SourceError) -> Self {
        Self {
            data,
            loading: false,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct LiveQueryChannel {
    store: Arc<EntityStore>,
    source: Arc<dyn LiveSource>,
    page_size: u32,
}

impl LiveQueryChannel {
    pub fn new(store: Arc<EntityStore>, source: Arc<dyn LiveSource>, config: &CacheConfig) -> Self {
        Self {
            store,
            source,
            page_size: config.page_size_non_zero().get(),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn collection_key(&self, filter: PostFilter) -> CollectionKey {
        CollectionKey::new(filter, self.page_size)
    }

    /// Fetch one page and return the whole collection as now cached.
    ///
    /// Without a cursor the cached collection restarts from this page.
    #[instrument(skip(self))]
    pub async fn fetch_collection(
        &self,
        filter: PostFilter,
        cursor: Option<&str>,
    ) -> Result<CollectionView, SourceError> {
        let key = self.collection_key(filter);
        let started_at = Instant::now();
        let result = self.source.fetch_page(filter, self.page_size, cursor).await;
        record_fetch("collection", started_at);

        let page = result.inspect_err(|err| {
            warn!(collection = %key, error = %err, "Live collection fetch failed");
        })?;
        debug!(collection = %key, members = page.nodes.len(), "Live page fetched");
        self.store.write_page(key, cursor, page);
        Ok(self.store.read_collection(&key).unwrap_or_default())
    }

    /// Append the next page of a cached collection.
    ///
    /// Returns `false` when nothing is cached or there is no next page.
    pub async fn load_more(&self, filter: PostFilter) -> Result<bool, SourceError> {
        let key = self.collection_key(filter);
        let cursor = match self.store.read_collection(&key) {
            Some(view) if view.has_next_page => view.end_cursor,
            _ => None,
        };
        let Some(cursor) = cursor else {
            return Ok(false);
        };

        let before = self.store.loaded_pages(&key);
        self.fetch_collection(filter, Some(&cursor)).await?;
        Ok(self.store.loaded_pages(&key) > before)
    }

    #[instrument(skip(self))]
    pub async fn fetch_entity(&self, id: Uuid) -> Result<Option<PostView>, SourceError> {
        let started_at = Instant::now();
        let result = self.source.fetch_post(id).await;
        record_fetch("entity", started_at);

        let node = result.inspect_err(|err| {
            warn!(post_id = %id, error = %err, "Live post fetch failed");
        })?;
        match node {
            Some(node) => self.store.write_node(node),
            None => {
                // Deleted elsewhere; pending local records are left alone.
                if self.store.post(id).is_some_and(|view| !view.is_pending()) {
                    self.store.remove_post(id);
                }
            }
        }
        Ok(self.store.post(id))
    }

    #[instrument(skip(self))]
    pub async fn fetch_profile(&self, id: Uuid) -> Result<Option<AuthorRecord>, SourceError> {
        let started_at = Instant::now();
        let result = self.source.fetch_profile(id).await;
        record_fetch("profile", started_at);

        match result? {
            Some(profile) => {
                self.store.write_entity(EntityPatch::Author {
                    id,
                    fields: AuthorFields::from(&profile),
                });
                Ok(self.store.author(id))
            }
            None => Ok(None),
        }
    }

    pub fn watch_collection(&self, filter: PostFilter) -> LiveCollection {
        let key = self.collection_key(filter);
        let events = self.store.subscribe();
        let cached = self.store.read_collection(&key);
        LiveCollection {
            channel: self.clone(),
            filter,
            key,
            events,
            state: QueryState::pending(cached),
            fetched: false,
            stale: false,
        }
    }

    pub fn watch_entity(&self, id: Uuid) -> LiveEntity {
        let events = self.store.subscribe();
        let cached = self.store.post(id);
        LiveEntity {
            channel: self.clone(),
            id,
            events,
            state: QueryState::pending(cached.map(Some)),
            fetched: false,
        }
    }
}

fn record_fetch(op: &'static str, started_at: Instant) {
    histogram!(METRIC_LIVE_FETCH_MS, "op" => op)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

/// Drain pending events, reporting whether any matched.
fn drain(
    events: &mut broadcast::Receiver<StoreEvent>,
    relevant: impl Fn(&StoreEventKind) -> bool,
) -> bool {
    let mut touched = false;
    loop {
        match events.try_recv() {
            Ok(event) => touched |= relevant(&event.kind),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Store event receiver lagged; forcing re-read");
                touched = true;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return touched,
        }
    }
}

/// A watched collection query.
pub struct LiveCollection {
    channel: LiveQueryChannel,
    filter: PostFilter,
    key: CollectionKey,
    events: broadcast::Receiver<StoreEvent>,
    state: QueryState<CollectionView>,
    fetched: bool,
    stale: bool,
}

impl LiveCollection {
    pub fn filter(&self) -> PostFilter {
        self.filter
    }

    pub fn state(&self) -> &QueryState<CollectionView> {
        &self.state
    }

    /// True before the first fetch and after the cached pages were evicted.
    pub fn needs_fetch(&self) -> bool {
        !self.fetched || self.stale
    }

    /// Apply store events that arrived since the last call.
    ///
    /// An eviction marks the query stale and loading while the last data
    /// stays visible. Returns whether the state changed.
    pub fn sync(&mut self) -> bool {
        let key = self.key;
        if !drain(&mut self.events, |kind| kind.touches_collection(&key)) {
            return false;
        }

        match self.channel.store.read_collection(&self.key) {
            Some(view) => {
                if self.state.data.as_ref() == Some(&view) {
                    return false;
                }
                self.state.data = Some(view);
                true
            }
            None if self.fetched && !self.stale => {
                debug!(collection = %self.key, "Cached pages evicted; refetch required");
                self.stale = true;
                self.state.loading = true;
                true
            }
            None => false,
        }
    }

    /// Re-issue the first page, discarding any later pages.
    pub async fn refetch(&mut self) -> &QueryState<CollectionView> {
        self.state.loading = true;
        let result = self.channel.fetch_collection(self.filter, None).await;
        // Our own page write (and anything before it) is already reflected.
        drain(&mut self.events, |_| false);

        self.fetched = true;
        self.state.loading = false;
        match result {
            Ok(view) => {
                self.state.error = None;
                if self.channel.store.read_collection(&self.key).is_some() {
                    self.stale = false;
                    self.state.data = Some(view);
                } else {
                    // Evicted again while the page was in flight.
                    self.stale = true;
                    self.state.loading = true;
                }
            }
            Err(err) => {
                self.stale = false;
                self.state.error = Some(err);
            }
        }
        &self.state
    }

    /// Append the next page. Already loaded members keep their positions.
    pub async fn load_more(&mut self) -> Result<bool, SourceError> {
        let appended = self.channel.load_more(self.filter).await?;
        drain(&mut self.events, |_| false);
        if appended && let Some(view) = self.channel.store.read_collection(&self.key) {
            self.state.data = Some(view);
        }
        Ok(appended)
    }
}

/// A watched single-post query.
///
/// `data` is `Some(None)` once the backend reported the post as absent.
pub struct LiveEntity {
    channel: LiveQueryChannel,
    id: Uuid,
    events: broadcast::Receiver<StoreEvent>,
    state: QueryState<Option<PostView>>,
    fetched: bool,
}

impl LiveEntity {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &QueryState<Option<PostView>> {
        &self.state
    }

    pub fn needs_fetch(&self) -> bool {
        !self.fetched
    }

    pub fn sync(&mut self) -> bool {
        let id = self.id;
        if !drain(&mut self.events, |kind| kind.touches_post(id)) {
            return false;
        }
        let current = self.channel.store.post(self.id);
        if !self.fetched && current.is_none() {
            return false;
        }
        if self.state.data.as_ref() == Some(&current) {
            return false;
        }
        self.state.data = Some(current);
        true
    }

    pub async fn refetch(&mut self) -> &QueryState<Option<PostView>> {
        self.state.loading = true;
        let result = self.channel.fetch_entity(self.id).await;
        drain(&mut self.events, |_| false);

        self.fetched = true;
        self.state.loading = false;
        match result {
            Ok(view) => {
                self.state.data = Some(view);
                self.state.error = None;
            }
            Err(err) => self.state.error = Some(err),
        }
        &self.state
    }
}
