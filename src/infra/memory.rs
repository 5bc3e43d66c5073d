//! In-process data source.
//!
//! Serves both the snapshot and the live contracts from one seeded table of
//! posts and profiles. Reads and writes can be held at a gate or made to
//! fail, which lets callers observe the state between an optimistic write
//! and its confirmation.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::{Notify, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::pagination::{PageInfo, PostCursor, PostPage};
use crate::application::repos::{LiveSource, NewPost, SnapshotSource, SourceError};
use crate::cache::mutex_lock;
use crate::domain::entities::{AuthorRecord, PostNode, PostRecord};
use crate::domain::fields::{AuthorFields, Merge};
use crate::domain::posts::{PostChanges, ProfileChanges};
use crate::domain::types::PostFilter;

use super::error::InfraError;

const SOURCE: &str = "infra::memory";

/// Holds callers until released.
#[derive(Debug)]
struct Gate {
    open: watch::Sender<bool>,
    arrived: Notify,
}

impl Gate {
    fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            open,
            arrived: Notify::new(),
        }
    }

    fn hold(&self) {
        self.open.send_replace(false);
    }

    fn release(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut open = self.open.subscribe();
        if *open.borrow_and_update() {
            return;
        }
        self.arrived.notify_one();
        let _ = open.wait_for(|open| *open).await;
    }

    async fn arrived(&self) {
        self.arrived.notified().await;
    }
}

#[derive(Debug, Default)]
struct Tables {
    posts: HashMap<Uuid, PostRecord>,
    profiles: HashMap<Uuid, AuthorRecord>,
}

impl Tables {
    fn node(&self, post: &PostRecord) -> PostNode {
        let author = self.profiles.get(&post.author_id).cloned();
        PostNode::new(post.clone(), author)
    }

    /// Posts admitted by `filter`, newest first with ties broken by id.
    fn ordered(&self, filter: PostFilter) -> Vec<&PostRecord> {
        let mut posts: Vec<&PostRecord> = self
            .posts
            .values()
            .filter(|post| filter.admits(post))
            .collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        posts
    }

    fn page(
        &self,
        filter: PostFilter,
        first: u32,
        after: Option<&str>,
    ) -> Result<PostPage, SourceError> {
        let after = after.map(PostCursor::decode).transpose()?;
        let remaining: Vec<&PostRecord> = self
            .ordered(filter)
            .into_iter()
            .filter(|post| match after {
                Some(cursor) => (post.created_at, post.id) < (cursor.created_at(), cursor.id()),
                None => true,
            })
            .collect();

        let limit = first as usize;
        let has_next_page = remaining.len() > limit;
        let page: Vec<&PostRecord> = remaining.into_iter().take(limit).collect();
        let end_cursor = match page.last() {
            Some(last) => Some(PostCursor::new(last.created_at, last.id).encode()?),
            None => None,
        };

        Ok(PostPage::new(
            page.into_iter().map(|post| self.node(post)).collect(),
            PageInfo {
                end_cursor,
                has_next_page,
            },
        ))
    }
}

/// Seed rows for a memory backend.
///
/// ```json
/// { "posts": [ { "id": "…", "title": "…", "body": "…", "created_at": "2024-01-02T00:00:00Z",
///                "published": true, "author_id": "…", "profile_id": "…" } ],
///   "profiles": [ { "id": "…", "display_name": "Jane Doe" } ] }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub posts: Vec<PostRecord>,
    pub profiles: Vec<AuthorRecord>,
}

impl Fixtures {
    pub fn from_json(raw: &str) -> Result<Self, InfraError> {
        serde_json::from_str(raw)
            .map_err(|err| InfraError::configuration(format!("invalid fixtures: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            InfraError::configuration(format!(
                "failed to read fixtures {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }
}

/// Seeded in-memory backend with failure injection.
#[derive(Debug)]
pub struct MemorySource {
    tables: Mutex<Tables>,
    reads: Gate,
    writes: Gate,
    failing_reads: AtomicUsize,
    fail_writes: AtomicBool,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            reads: Gate::new(),
            writes: Gate::new(),
            failing_reads: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_posts(posts: impl IntoIterator<Item = PostRecord>) -> Self {
        let source = Self::new();
        for post in posts {
            source.seed_post(post);
        }
        source
    }

    pub fn with_fixtures(fixtures: Fixtures) -> Self {
        info!(
            posts = fixtures.posts.len(),
            profiles = fixtures.profiles.len(),
            "Seeding memory backend"
        );
        let source = Self::with_posts(fixtures.posts);
        for profile in fixtures.profiles {
            source.seed_profile(profile);
        }
        source
    }

    pub fn seed_post(&self, post: PostRecord) {
        mutex_lock(&self.tables, SOURCE, "seed_post")
            .posts
            .insert(post.id, post);
    }

    pub fn seed_profile(&self, profile: AuthorRecord) {
        mutex_lock(&self.tables, SOURCE, "seed_profile")
            .profiles
            .insert(profile.id, profile);
    }

    pub fn post(&self, id: Uuid) -> Option<PostRecord> {
        mutex_lock(&self.tables, SOURCE, "post").posts.get(&id).cloned()
    }

    pub fn post_count(&self) -> usize {
        mutex_lock(&self.tables, SOURCE, "post_count").posts.len()
    }

    /// Fail the next `count` reads with a transport error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn hold_reads(&self) {
        self.reads.hold();
    }

    pub fn release_reads(&self) {
        self.reads.release();
    }

    /// Resolves once a read is waiting at the held gate.
    pub async fn read_arrived(&self) {
        self.reads.arrived().await;
    }

    pub fn hold_writes(&self) {
        self.writes.hold();
    }

    pub fn release_writes(&self) {
        self.writes.release();
    }

    /// Resolves once a write is waiting at the held gate.
    pub async fn write_arrived(&self) {
        self.writes.arrived().await;
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn begin_read(&self) -> Result<(), SourceError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.reads.pass().await;
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            debug!("Injected read failure");
            return Err(SourceError::transport("injected read failure"));
        }
        Ok(())
    }

    async fn begin_write(&self) -> Result<(), SourceError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.writes.pass().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            debug!("Injected write failure");
            return Err(SourceError::Rejected("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    async fn snapshot_page(
        &self,
        filter: PostFilter,
        first: u32,
    ) -> Result<PostPage, SourceError> {
        self.begin_read().await?;
        mutex_lock(&self.tables, SOURCE, "snapshot_page").page(filter, first, None)
    }

    async fn snapshot_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError> {
        self.begin_read().await?;
        let tables = mutex_lock(&self.tables, SOURCE, "snapshot_post");
        Ok(tables.posts.get(&id).map(|post| tables.node(post)))
    }
}

#[async_trait]
impl LiveSource for MemorySource {
    async fn fetch_page(
        &self,
        filter: PostFilter,
        first: u32,
        after: Option<&str>,
    ) -> Result<PostPage, SourceError> {
        self.begin_read().await?;
        mutex_lock(&self.tables, SOURCE, "fetch_page").page(filter, first, after)
    }

    async fn fetch_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError> {
        self.begin_read().await?;
        let tables = mutex_lock(&self.tables, SOURCE, "fetch_post");
        Ok(tables.posts.get(&id).map(|post| tables.node(post)))
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostNode, SourceError> {
        self.begin_write().await?;
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: post.title.clone(),
            body: post.body.clone(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            published: post.published,
            author_id: post.author_id,
            profile_id: Some(post.author_id),
        };
        let mut tables = mutex_lock(&self.tables, SOURCE, "create_post");
        tables.posts.insert(record.id, record.clone());
        Ok(tables.node(&record))
    }

    async fn update_post(&self, id: Uuid, changes: &PostChanges) -> Result<PostNode, SourceError> {
        self.begin_write().await?;
        let mut tables = mutex_lock(&self.tables, SOURCE, "update_post");
        let record = tables
            .posts
            .get_mut(&id)
            .ok_or(SourceError::not_found("post"))?;
        if let Some(title) = &changes.title {
            record.title = title.clone();
        }
        if let Some(body) = &changes.body {
            record.body = body.clone();
        }
        if let Some(published) = changes.published {
            record.published = published;
        }
        record.updated_at = Some(OffsetDateTime::now_utc());
        let record = record.clone();
        Ok(tables.node(&record))
    }

    async fn delete_post(&self, id: Uuid) -> Result<Uuid, SourceError> {
        self.begin_write().await?;
        mutex_lock(&self.tables, SOURCE, "delete_post")
            .posts
            .remove(&id)
            .map(|post| post.id)
            .ok_or(SourceError::not_found("post"))
    }

    async fn fetch_profile(&self, id: Uuid) -> Result<Option<AuthorRecord>, SourceError> {
        self.begin_read().await?;
        Ok(mutex_lock(&self.tables, SOURCE, "fetch_profile")
            .profiles
            .get(&id)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<AuthorRecord, SourceError> {
        self.begin_write().await?;
        let mut tables = mutex_lock(&self.tables, SOURCE, "update_profile");
        let profile = tables
            .profiles
            .get_mut(&id)
            .ok_or(SourceError::not_found("profile"))?;
        let mut fields = AuthorFields::from(&*profile);
        fields.merge(changes.to_fields());
        *profile = fields.materialize(id);
        Ok(profile.clone())
    }
}
