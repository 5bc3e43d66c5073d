//! Mounted list and detail views.
//!
//! A view owns one live query and one reconciler. It is seeded with a
//! bootstrap snapshot at mount time and polled afterwards; polling applies
//! store events and issues a fetch whenever the query needs one.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::application::live::{LiveCollection, LiveEntity, LiveQueryChannel, QueryState};
use crate::application::pagination::CollectionView;
use crate::application::reconcile::{
    HandoffState, Members, Observation, Reconciler, Render, Teardown,
};
use crate::application::repos::SourceError;
use crate::application::snapshot::Snapshot;
use crate::domain::entities::PostView;
use crate::domain::types::PostFilter;

/// A live query a view can drive.
#[async_trait]
pub trait WatchedQuery: Send {
    type Data: Members + Clone + Send + Sync;

    fn state(&self) -> &QueryState<Self::Data>;

    fn needs_fetch(&self) -> bool;

    /// Apply pending store events; returns whether the state changed.
    fn sync(&mut self) -> bool;

    async fn refetch(&mut self);
}

#[async_trait]
impl WatchedQuery for LiveCollection {
    type Data = CollectionView;

    fn state(&self) -> &QueryState<CollectionView> {
        LiveCollection::state(self)
    }

    fn needs_fetch(&self) -> bool {
        LiveCollection::needs_fetch(self)
    }

    fn sync(&mut self) -> bool {
        LiveCollection::sync(self)
    }

    async fn refetch(&mut self) {
        LiveCollection::refetch(self).await;
    }
}

#[async_trait]
impl WatchedQuery for LiveEntity {
    type Data = Option<PostView>;

    fn state(&self) -> &QueryState<Option<PostView>> {
        LiveEntity::state(self)
    }

    fn needs_fetch(&self) -> bool {
        LiveEntity::needs_fetch(self)
    }

    fn sync(&mut self) -> bool {
        LiveEntity::sync(self)
    }

    async fn refetch(&mut self) {
        LiveEntity::refetch(self).await;
    }
}

pub struct View<Q: WatchedQuery> {
    query: Q,
    reconciler: Reconciler<Q::Data>,
}

pub type PostListView = View<LiveCollection>;
pub type PostDetailView = View<LiveEntity>;

impl<Q: WatchedQuery> View<Q> {
    fn new(snapshot: Snapshot<Q::Data>, query: Q) -> Self {
        Self {
            query,
            reconciler: Reconciler::new(snapshot.into_value()),
        }
    }

    /// Apply store events without touching the network.
    pub fn sync(&mut self) -> Observation {
        self.query.sync();
        self.reconciler.observe(self.query.state())
    }

    /// Apply store events, then fetch if the query needs it.
    pub async fn poll(&mut self) -> Observation {
        let before = self.sync();
        if self.is_torn_down() || !self.query.needs_fetch() {
            return before;
        }

        self.query.refetch().await;
        let after = self.reconciler.observe(self.query.state());
        match after {
            Observation::Ignored | Observation::Unchanged if before != Observation::Ignored => {
                before
            }
            _ => after,
        }
    }

    /// Force a fetch regardless of cached state.
    pub async fn refetch(&mut self) -> Observation {
        self.query.refetch().await;
        self.reconciler.observe(self.query.state())
    }

    pub fn render(&self) -> Render<'_, Q::Data> {
        self.reconciler.render()
    }

    pub fn phase(&self) -> HandoffState {
        self.reconciler.state()
    }

    pub fn query_state(&self) -> &QueryState<Q::Data> {
        self.query.state()
    }

    pub fn teardown_handle(&self) -> Teardown {
        self.reconciler.teardown_handle()
    }

    pub fn is_torn_down(&self) -> bool {
        self.phase() == HandoffState::TornDown
    }

    /// Stop all further transitions for this instance.
    pub fn unmount(&mut self) {
        debug!("View unmounted");
        self.reconciler.tear_down();
    }
}

impl View<LiveCollection> {
    pub fn mount(
        snapshot: Snapshot<CollectionView>,
        channel: &LiveQueryChannel,
        filter: PostFilter,
    ) -> Self {
        debug!(
            ?filter,
            snapshot_members = snapshot.value.len(),
            degraded = snapshot.degraded,
            "Mounting post list"
        );
        View::new(snapshot, channel.watch_collection(filter))
    }

    /// Append the next page once live data is authoritative.
    ///
    /// Returns `false` before the handoff and when no page remains.
    pub async fn load_more(&mut self) -> Result<bool, SourceError> {
        if self.phase() != HandoffState::LiveAuthoritative {
            return Ok(false);
        }
        let appended = self.query.load_more().await?;
        self.reconciler.observe(self.query.state());
        Ok(appended)
    }
}

impl View<LiveEntity> {
    pub fn mount(
        snapshot: Snapshot<Option<PostView>>,
        channel: &LiveQueryChannel,
        id: Uuid,
    ) -> Self {
        debug!(
            post_id = %id,
            snapshot_present = snapshot.value.is_some(),
            degraded = snapshot.degraded,
            "Mounting post detail"
        );
        View::new(snapshot, channel.watch_entity(id))
    }
}
