//! The entity store.
//!
//! Posts and authors are kept once each, keyed by id. Collections hold only
//! member ids plus their pagination state, so an entity shared by several
//! collections (or embedded as an author in many posts) is written in one
//! place and every reader observes the write.

use std::collections::HashMap;
use std::sync::RwLock;

use lru::LruCache;
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::pagination::{CollectionView, PostPage};
use crate::domain::entities::{AuthorRecord, PostNode, PostView};
use crate::domain::fields::{AuthorFields, Merge, PostFields};
use crate::domain::types::{CollectionKind, Confirmation};

use super::config::CacheConfig;
use super::events::{Epoch, EventBus, StoreEvent, StoreEventKind};
use super::keys::{CollectionKey, EntityKey, EntityPatch};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
pub(crate) const METRIC_STORE_WRITE: &str = "folio_store_write_total";
pub(crate) const METRIC_STORE_EVICT: &str = "folio_store_evict_total";

/// A materialized entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Post(PostView),
    Author(AuthorRecord),
}

/// A post as two layers: what the backend last confirmed, and the
/// provisional fields of a mutation that has not resolved yet. Authoritative
/// writes only ever touch `base`; the overlay and the tombstone are cleared
/// by [`EntityStore::confirm_node`] or a checkpoint restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StoredPost {
    base: PostFields,
    overlay: Option<PostFields>,
    /// Id of the embedded author, when one was ever resolved.
    author_ref: Option<Uuid>,
    tombstoned: bool,
}

impl StoredPost {
    fn fields(&self) -> PostFields {
        let mut fields = self.base.clone();
        if let Some(overlay) = &self.overlay {
            fields.merge(overlay.clone());
        }
        fields
    }

    fn confirmation(&self) -> Confirmation {
        if self.overlay.is_some() || self.tombstoned {
            Confirmation::Pending
        } else {
            Confirmation::Confirmed
        }
    }

    /// A local record the backend has never returned.
    fn is_unsent_create(&self) -> bool {
        self.overlay.is_some() && self.base.created_at.is_none()
    }

    fn settle(&mut self) {
        self.overlay = None;
        self.tombstoned = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CollectionEntry {
    members: Vec<Uuid>,
    end_cursor: Option<String>,
    has_next_page: bool,
    pages: usize,
}

/// Prior values of the entries a mutation is about to overwrite.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    posts: Vec<(Uuid, Option<StoredPost>)>,
    authors: Vec<(Uuid, Option<AuthorFields>)>,
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        self.posts.len() + self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EntityStore {
    posts: RwLock<HashMap<Uuid, StoredPost>>,
    authors: RwLock<HashMap<Uuid, AuthorFields>>,
    collections: RwLock<LruCache<CollectionKey, CollectionEntry>>,
    events: EventBus,
}

impl EntityStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            authors: RwLock::new(HashMap::new()),
            collections: RwLock::new(LruCache::new(config.collection_limit_non_zero())),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn epoch(&self) -> Epoch {
        self.events.current_epoch()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn read(&self, key: EntityKey) -> Option<Entity> {
        match key {
            EntityKey::Post(id) => self.post(id).map(Entity::Post),
            EntityKey::Author(id) => self.author(id).map(Entity::Author),
        }
    }

    /// A post ready to render. Absent while tombstoned or incomplete.
    pub fn post(&self, id: Uuid) -> Option<PostView> {
        let posts = rw_read(&self.posts, SOURCE, "post.posts");
        let authors = rw_read(&self.authors, SOURCE, "post.authors");
        materialize(&posts, &authors, id)
    }

    pub fn author(&self, id: Uuid) -> Option<AuthorRecord> {
        rw_read(&self.authors, SOURCE, "author")
            .get(&id)
            .map(|fields| fields.materialize(id))
    }

    /// Every loaded page of a collection, or `None` when nothing is cached.
    pub fn read_collection(&self, key: &CollectionKey) -> Option<CollectionView> {
        let entry = rw_write(&self.collections, SOURCE, "read_collection")
            .get(key)
            .cloned()?;

        let posts = rw_read(&self.posts, SOURCE, "read_collection.posts");
        let authors = rw_read(&self.authors, SOURCE, "read_collection.authors");
        let members = entry
            .members
            .iter()
            .filter_map(|id| materialize(&posts, &authors, *id))
            .collect();

        Some(CollectionView {
            posts: members,
            end_cursor: entry.end_cursor,
            has_next_page: entry.has_next_page,
        })
    }

    /// Number of pages loaded into a collection.
    pub fn loaded_pages(&self, key: &CollectionKey) -> usize {
        rw_read(&self.collections, SOURCE, "loaded_pages")
            .peek(key)
            .map_or(0, |entry| entry.pages)
    }

    pub fn cached_collections(&self) -> Vec<CollectionKey> {
        rw_read(&self.collections, SOURCE, "cached_collections")
            .iter()
            .map(|(key, _)| *key)
            .collect()
    }

    // ========================================================================
    // Authoritative writes
    // ========================================================================

    /// Write a page into a collection.
    ///
    /// Without `after` the collection is replaced by this single page. With
    /// `after` the page is appended, but only when `after` is still the
    /// collection's end cursor; a page for a cursor that no longer matches
    /// (the collection was evicted or refetched meanwhile) is dropped.
    /// Returns whether the page was applied.
    ///
    /// A replacing page keeps unsent optimistic creates the filter admits at
    /// its head, since the backend cannot return them yet.
    pub fn write_page(&self, key: CollectionKey, after: Option<&str>, page: PostPage) -> bool {
        let PostPage { nodes, page_info } = page;
        let ids: Vec<Uuid> = nodes.iter().map(PostNode::id).collect();
        let unsent = match after {
            None => self.unsent_creates(&key),
            Some(_) => Vec::new(),
        };

        {
            let mut collections = rw_write(&self.collections, SOURCE, "write_page");
            match after {
                None => {
                    let entry = CollectionEntry {
                        members: dedup(unsent.into_iter().chain(ids).collect()),
                        end_cursor: page_info.end_cursor,
                        has_next_page: page_info.has_next_page,
                        pages: 1,
                    };
                    if let Some((evicted, _)) = collections.push(key, entry)
                        && evicted != key
                    {
                        counter!(METRIC_STORE_EVICT, "reason" => "capacity").increment(1);
                        debug!(collection = %evicted, "Collection evicted for capacity");
                    }
                }
                Some(cursor) => {
                    let Some(entry) = collections.get_mut(&key) else {
                        debug!(collection = %key, cursor, "Dropped page for uncached collection");
                        return false;
                    };
                    if entry.end_cursor.as_deref() != Some(cursor) {
                        debug!(collection = %key, cursor, "Dropped page for stale cursor");
                        return false;
                    }
                    for id in ids {
                        if !entry.members.contains(&id) {
                            entry.members.push(id);
                        }
                    }
                    entry.end_cursor = page_info.end_cursor;
                    entry.has_next_page = page_info.has_next_page;
                    entry.pages += 1;
                }
            }
        }

        {
            let mut posts = rw_write(&self.posts, SOURCE, "write_page.posts");
            let mut authors = rw_write(&self.authors, SOURCE, "write_page.authors");
            for node in nodes {
                upsert_node(&mut posts, &mut authors, node);
            }
        }

        counter!(METRIC_STORE_WRITE, "op" => "page").increment(1);
        self.events.publish(StoreEventKind::PageWritten(key));
        true
    }

    /// Merge a partial entity into the confirmed layer. A pending post keeps
    /// showing its provisional fields.
    pub fn write_entity(&self, patch: EntityPatch) {
        let key = patch.key();
        match patch {
            EntityPatch::Post { id, fields } => {
                rw_write(&self.posts, SOURCE, "write_entity.post")
                    .entry(id)
                    .or_default()
                    .base
                    .merge(fields);
            }
            EntityPatch::Author { id, fields } => {
                rw_write(&self.authors, SOURCE, "write_entity.author")
                    .entry(id)
                    .or_default()
                    .merge(fields);
            }
        }
        counter!(METRIC_STORE_WRITE, "op" => "entity").increment(1);
        self.events.publish(StoreEventKind::EntityWritten(key));
    }

    /// Write a post and its embedded author as read from the backend. A
    /// pending or tombstoned post stays that way until its mutation resolves.
    pub fn write_node(&self, node: PostNode) {
        self.put_node(node, false, "node");
    }

    /// Write the backend's answer to a mutation, dropping any provisional
    /// state the post still carries.
    pub fn confirm_node(&self, node: PostNode) {
        self.put_node(node, true, "confirm");
    }

    fn put_node(&self, node: PostNode, settle: bool, op: &'static str) {
        let id = node.id();
        let author_id = node.author.as_ref().map(|author| author.id);
        {
            let mut posts = rw_write(&self.posts, SOURCE, "put_node.posts");
            let mut authors = rw_write(&self.authors, SOURCE, "put_node.authors");
            let stored = upsert_node(&mut posts, &mut authors, node);
            if settle {
                stored.settle();
            }
        }
        counter!(METRIC_STORE_WRITE, "op" => op).increment(1);
        if let Some(author_id) = author_id {
            self.events
                .publish(StoreEventKind::EntityWritten(EntityKey::Author(author_id)));
        }
        self.events
            .publish(StoreEventKind::EntityWritten(EntityKey::Post(id)));
    }

    /// Drop every cached page of one collection kind so the next read goes
    /// to the backend.
    pub fn evict_collection(&self, kind: CollectionKind) -> usize {
        let evicted = {
            let mut collections = rw_write(&self.collections, SOURCE, "evict_collection");
            let keys: Vec<CollectionKey> = collections
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| key.kind() == kind)
                .collect();
            for key in &keys {
                collections.pop(key);
            }
            keys.len()
        };

        counter!(METRIC_STORE_EVICT, "reason" => "explicit").increment(evicted as u64);
        info!(
            collection_kind = kind.as_str(),
            evicted, "Evicted cached collection pages"
        );
        self.events.publish(StoreEventKind::CollectionEvicted(kind));
        evicted
    }

    // ========================================================================
    // Optimistic writes
    // ========================================================================

    /// Merge provisional fields into a post and mark it pending.
    pub fn write_optimistic(&self, id: Uuid, fields: PostFields, author: Option<AuthorRecord>) {
        let author_id = author.as_ref().map(|author| author.id);
        {
            let mut posts = rw_write(&self.posts, SOURCE, "write_optimistic.posts");
            let mut authors = rw_write(&self.authors, SOURCE, "write_optimistic.authors");
            if let Some(author) = author {
                authors
                    .entry(author.id)
                    .or_default()
                    .merge(AuthorFields::from(&author));
            }
            let stored = posts.entry(id).or_default();
            stored.overlay.get_or_insert_with(PostFields::default).merge(fields);
            if author_id.is_some() {
                stored.author_ref = author_id;
            }
        }
        counter!(METRIC_STORE_WRITE, "op" => "optimistic").increment(1);
        self.events
            .publish(StoreEventKind::EntityWritten(EntityKey::Post(id)));
    }

    /// Merge provisional author fields. Authors carry no confirmation state.
    pub fn write_optimistic_author(&self, id: Uuid, fields: AuthorFields) {
        rw_write(&self.authors, SOURCE, "write_optimistic_author")
            .entry(id)
            .or_default()
            .merge(fields);
        counter!(METRIC_STORE_WRITE, "op" => "optimistic").increment(1);
        self.events
            .publish(StoreEventKind::EntityWritten(EntityKey::Author(id)));
    }

    /// Put a post at the head of every cached collection whose filter admits
    /// it. Returns the collections that changed.
    pub fn insert_member_front(&self, id: Uuid) -> Vec<CollectionKey> {
        let Some(view) = self.post(id) else {
            return Vec::new();
        };

        let changed: Vec<CollectionKey> = {
            let mut collections = rw_write(&self.collections, SOURCE, "insert_member_front");
            collections
                .iter_mut()
                .filter(|(key, entry)| key.filter.admits(&view.post) && !entry.members.contains(&id))
                .map(|(key, entry)| {
                    entry.members.insert(0, id);
                    *key
                })
                .collect()
        };

        for key in &changed {
            self.events.publish(StoreEventKind::MembersChanged(*key));
        }
        changed
    }

    /// Hide a post from every read until it is removed or restored.
    pub fn tombstone(&self, id: Uuid) -> bool {
        let marked = match rw_write(&self.posts, SOURCE, "tombstone").get_mut(&id) {
            Some(stored) => {
                stored.tombstoned = true;
                true
            }
            None => false,
        };
        if marked {
            self.events.publish(StoreEventKind::PostTombstoned(id));
        }
        marked
    }

    /// Drop a post from the store and from every cached collection.
    pub fn remove_post(&self, id: Uuid) {
        self.unlink(id);
        counter!(METRIC_STORE_EVICT, "reason" => "removed").increment(1);
        self.events.publish(StoreEventKind::PostRemoved(id));
    }

    /// Drop the local stand-in of a confirmed create. Not an eviction: the
    /// confirmed record replaces it.
    pub fn discard_provisional(&self, id: Uuid) {
        self.unlink(id);
        counter!(METRIC_STORE_WRITE, "op" => "discard").increment(1);
        self.events.publish(StoreEventKind::PostRemoved(id));
    }

    fn unlink(&self, id: Uuid) {
        rw_write(&self.posts, SOURCE, "unlink.posts").remove(&id);
        let mut collections = rw_write(&self.collections, SOURCE, "unlink.collections");
        for (_, entry) in collections.iter_mut() {
            entry.members.retain(|member| *member != id);
        }
    }

    /// Unsent creates the collection's filter admits, newest first.
    fn unsent_creates(&self, key: &CollectionKey) -> Vec<Uuid> {
        let posts = rw_read(&self.posts, SOURCE, "unsent_creates.posts");
        let authors = rw_read(&self.authors, SOURCE, "unsent_creates.authors");
        let mut unsent: Vec<PostView> = posts
            .iter()
            .filter(|(_, stored)| stored.is_unsent_create())
            .filter_map(|(id, _)| materialize(&posts, &authors, *id))
            .filter(|view| key.filter.admits(&view.post))
            .collect();
        unsent.sort_by(|a, b| {
            b.post
                .created_at
                .cmp(&a.post.created_at)
                .then(b.post.id.cmp(&a.post.id))
        });
        unsent.into_iter().map(|view| view.post.id).collect()
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Capture the current value (or absence) of each key.
    pub fn checkpoint(&self, keys: &[EntityKey]) -> Checkpoint {
        let posts = rw_read(&self.posts, SOURCE, "checkpoint.posts");
        let authors = rw_read(&self.authors, SOURCE, "checkpoint.authors");
        let mut checkpoint = Checkpoint::default();
        for key in keys {
            match key {
                EntityKey::Post(id) => checkpoint.posts.push((*id, posts.get(id).cloned())),
                EntityKey::Author(id) => checkpoint.authors.push((*id, authors.get(id).cloned())),
            }
        }
        checkpoint
    }

    /// Put every captured entry back. A post that did not exist at capture
    /// time is removed along with its collection memberships. A post keeps
    /// whatever the backend confirmed since the capture; only its
    /// provisional state is rewound.
    pub fn restore(&self, checkpoint: Checkpoint) {
        let mut absent = Vec::new();
        {
            let mut posts = rw_write(&self.posts, SOURCE, "restore.posts");
            for (id, prior) in checkpoint.posts {
                match prior {
                    Some(prior) => match posts.get_mut(&id) {
                        Some(current) => {
                            current.overlay = prior.overlay;
                            current.tombstoned = prior.tombstoned;
                            current.author_ref = current.author_ref.or(prior.author_ref);
                        }
                        None => {
                            posts.insert(id, prior);
                        }
                    },
                    None => {
                        posts.remove(&id);
                        absent.push(id);
                    }
                }
            }
        }
        {
            let mut authors = rw_write(&self.authors, SOURCE, "restore.authors");
            for (id, prior) in checkpoint.authors {
                match prior {
                    Some(fields) => {
                        authors.insert(id, fields);
                    }
                    None => {
                        authors.remove(&id);
                    }
                }
            }
        }
        if !absent.is_empty() {
            let mut collections = rw_write(&self.collections, SOURCE, "restore.collections");
            for (_, entry) in collections.iter_mut() {
                entry.members.retain(|member| !absent.contains(member));
            }
        }
        self.events.publish(StoreEventKind::RolledBack);
    }
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    members
}

fn upsert_node<'a>(
    posts: &'a mut HashMap<Uuid, StoredPost>,
    authors: &mut HashMap<Uuid, AuthorFields>,
    node: PostNode,
) -> &'a mut StoredPost {
    let PostNode { post, author } = node;
    let author_ref = author.as_ref().map(|author| author.id);
    if let Some(author) = author {
        authors
            .entry(author.id)
            .or_default()
            .merge(AuthorFields::from(&author));
    }

    let stored = posts.entry(post.id).or_default();
    stored.base.merge(PostFields::from(&post));
    if author_ref.is_some() {
        stored.author_ref = author_ref;
    }
    stored
}

fn materialize(
    posts: &HashMap<Uuid, StoredPost>,
    authors: &HashMap<Uuid, AuthorFields>,
    id: Uuid,
) -> Option<PostView> {
    let stored = posts.get(&id).filter(|stored| !stored.tombstoned)?;
    let post = stored.fields().materialize(id)?;
    let author = stored
        .author_ref
        .and_then(|author_id| authors.get(&author_id).map(|fields| fields.materialize(author_id)));
    Some(PostView {
        post,
        author,
        confirmation: stored.confirmation(),
    })
}
