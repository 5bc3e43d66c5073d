#![allow(dead_code)]

use std::sync::Arc;

use folio::application::live::LiveQueryChannel;
use folio::application::mutations::MutationCoordinator;
use folio::application::pagination::CollectionView;
use folio::application::reconcile::Render;
use folio::application::snapshot::SnapshotBootstrap;
use folio::cache::{CacheConfig, EntityStore};
use folio::domain::entities::{AuthorRecord, Identity, PostRecord, PostView};
use folio::infra::identity::StaticIdentity;
use folio::infra::memory::MemorySource;
use time::{Date, Month, OffsetDateTime, Time};
use uuid::Uuid;

/// A published post created at midnight UTC on 2024-01-`day`.
pub fn post_on(day: u8, title: &str, author_id: Uuid) -> PostRecord {
    let date = Date::from_calendar_date(2024, Month::January, day).expect("valid date");
    PostRecord {
        id: Uuid::new_v4(),
        title: title.to_string(),
        body: format!("{title} body, long enough to pass validation"),
        created_at: OffsetDateTime::new_utc(date, Time::MIDNIGHT),
        updated_at: None,
        published: true,
        author_id,
        profile_id: Some(author_id),
    }
}

pub fn author(name: &str) -> AuthorRecord {
    AuthorRecord {
        username: Some(name.to_lowercase().replace(' ', "_")),
        display_name: Some(name.to_string()),
        ..AuthorRecord::new(Uuid::new_v4())
    }
}

pub fn identity_for(author: &AuthorRecord) -> Identity {
    Identity {
        username: author.username.clone(),
        display_name: author.display_name.clone(),
        avatar_url: author.avatar_url.clone(),
        ..Identity::new(author.id)
    }
}

/// One store wired to separate snapshot and live sources.
pub struct Harness {
    pub config: CacheConfig,
    pub store: Arc<EntityStore>,
    pub snapshot_source: Arc<MemorySource>,
    pub live_source: Arc<MemorySource>,
    pub bootstrap: SnapshotBootstrap,
    pub channel: LiveQueryChannel,
}

impl Harness {
    pub fn new(snapshot_posts: &[PostRecord], live_posts: &[PostRecord]) -> Self {
        let config = CacheConfig::default();
        let snapshot_source = Arc::new(MemorySource::with_posts(snapshot_posts.iter().cloned()));
        let live_source = Arc::new(MemorySource::with_posts(live_posts.iter().cloned()));
        let store = Arc::new(EntityStore::new(&config));
        let bootstrap = SnapshotBootstrap::new(snapshot_source.clone(), &config);
        let channel = LiveQueryChannel::new(store.clone(), live_source.clone(), &config);
        Self {
            config,
            store,
            snapshot_source,
            live_source,
            bootstrap,
            channel,
        }
    }

    /// Same posts on both sides.
    pub fn mirrored(posts: &[PostRecord]) -> Self {
        Self::new(posts, posts)
    }

    pub fn seed_profile(&self, profile: AuthorRecord) {
        self.snapshot_source.seed_profile(profile.clone());
        self.live_source.seed_profile(profile);
    }

    pub fn coordinator(&self, identity: Option<Identity>) -> MutationCoordinator {
        MutationCoordinator::new(
            self.store.clone(),
            self.live_source.clone(),
            Arc::new(StaticIdentity::new(identity)),
        )
    }
}

pub fn list_of<'a>(render: &Render<'a, CollectionView>) -> &'a CollectionView {
    match render {
        Render::Content { data, .. } => *data,
        Render::Error(err) => panic!("expected content, got error: {err}"),
    }
}

pub fn rendered_ids(render: &Render<'_, CollectionView>) -> Vec<Uuid> {
    list_of(render).ids().collect()
}

pub fn detail_of<'a>(render: &Render<'a, Option<PostView>>) -> Option<&'a PostView> {
    match render {
        Render::Content { data, .. } => (*data).as_ref(),
        Render::Error(err) => panic!("expected content, got error: {err}"),
    }
}
