//! Optimistic create, update and delete.
//!
//! Every mutation writes a provisional record into the entity store before
//! the backend call, so mounted views re-render immediately. On success the
//! provisional record is replaced by the authoritative one; on failure the
//! entries touched are restored from a checkpoint and the error returned.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::{IdentitySource, LiveSource, NewPost, SourceError};
use crate::cache::{Checkpoint, EntityKey, EntityPatch, EntityStore, mutex_lock};
use crate::domain::entities::{AuthorRecord, Identity, PostView};
use crate::domain::error::DomainError;
use crate::domain::fields::{AuthorFields, PostFields};
use crate::domain::posts::{PostChanges, PostInput, ProfileChanges};
use crate::domain::types::CollectionKind;

const SOURCE: &str = "application::mutations";
pub(crate) const METRIC_OPTIMISTIC_APPLY: &str = "folio_optimistic_apply_total";
pub(crate) const METRIC_OPTIMISTIC_ROLLBACK: &str = "folio_optimistic_rollback_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("sign in to change posts")]
    Unauthenticated,
    #[error("a change to {0} is still in flight")]
    InFlight(EntityKey),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Removes its key from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<EntityKey>>,
    key: EntityKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        mutex_lock(self.in_flight, SOURCE, "in_flight.release").remove(&self.key);
    }
}

pub struct MutationCoordinator {
    store: Arc<EntityStore>,
    source: Arc<dyn LiveSource>,
    identity: Arc<dyn IdentitySource>,
    in_flight: Mutex<HashSet<EntityKey>>,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<EntityStore>,
        source: Arc<dyn LiveSource>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        Self {
            store,
            source,
            identity,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, key: EntityKey) -> bool {
        mutex_lock(&self.in_flight, SOURCE, "in_flight.check").contains(&key)
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(&self, input: PostInput) -> Result<PostView, MutationError> {
        let valid = input.validate()?;
        let identity = self.identity()?;
        let temp_id = Uuid::new_v4();
        let _guard = self.begin(EntityKey::Post(temp_id))?;

        let checkpoint = self
            .store
            .checkpoint(&[EntityKey::Post(temp_id), EntityKey::Author(identity.id)]);
        let provisional = PostFields {
            title: Some(valid.title.clone()),
            body: Some(valid.body.clone()),
            created_at: Some(OffsetDateTime::now_utc()),
            updated_at: None,
            published: Some(valid.published),
            author_id: Some(identity.id),
            profile_id: Some(identity.id),
        };
        self.store
            .write_optimistic(temp_id, provisional, Some(identity.as_author()));
        let inserted = self.store.insert_member_front(temp_id);
        counter!(METRIC_OPTIMISTIC_APPLY, "op" => "create").increment(1);
        info!(temp_id = %temp_id, collections = inserted.len(), "Optimistic post created");

        let request = NewPost::new(valid, identity.id);
        match self.source.create_post(&request).await {
            Ok(node) => {
                let id = node.id();
                self.store.discard_provisional(temp_id);
                self.store.confirm_node(node.clone());
                // New members shift every cursor after them.
                self.evict_post_collections();
                info!(temp_id = %temp_id, post_id = %id, "Post creation confirmed");
                Ok(self.store.post(id).unwrap_or_else(|| PostView::from(node)))
            }
            Err(err) => Err(self.rollback(checkpoint, "create", err)),
        }
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: PostChanges) -> Result<PostView, MutationError> {
        let changes = changes.validate()?;
        self.identity()?;
        let _guard = self.begin(EntityKey::Post(id))?;

        let checkpoint = self.store.checkpoint(&[EntityKey::Post(id)]);
        self.store
            .write_optimistic(id, changes.to_fields(OffsetDateTime::now_utc()), None);
        counter!(METRIC_OPTIMISTIC_APPLY, "op" => "update").increment(1);
        info!(post_id = %id, "Optimistic post update applied");

        match self.source.update_post(id, &changes).await {
            Ok(node) => {
                self.store.confirm_node(node.clone());
                self.evict_post_collections();
                info!(post_id = %id, "Post update confirmed");
                Ok(self.store.post(id).unwrap_or_else(|| PostView::from(node)))
            }
            Err(err) => Err(self.rollback(checkpoint, "update", err)),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<Uuid, MutationError> {
        self.identity()?;
        let _guard = self.begin(EntityKey::Post(id))?;

        let checkpoint = self.store.checkpoint(&[EntityKey::Post(id)]);
        self.store.tombstone(id);
        counter!(METRIC_OPTIMISTIC_APPLY, "op" => "delete").increment(1);
        info!(post_id = %id, "Post hidden pending deletion");

        match self.source.delete_post(id).await {
            Ok(deleted) => {
                self.store.remove_post(deleted);
                if deleted != id {
                    self.store.remove_post(id);
                }
                info!(post_id = %deleted, "Post deletion confirmed");
                Ok(deleted)
            }
            Err(err) => Err(self.rollback(checkpoint, "delete", err)),
        }
    }

    /// Update a profile. Every cached post embedding the author reflects
    /// the change at once.
    #[instrument(skip(self, changes))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<AuthorRecord, MutationError> {
        let changes = changes.validate()?;
        self.identity()?;
        let _guard = self.begin(EntityKey::Author(id))?;

        let checkpoint = self.store.checkpoint(&[EntityKey::Author(id)]);
        self.store.write_optimistic_author(id, changes.to_fields());
        counter!(METRIC_OPTIMISTIC_APPLY, "op" => "profile").increment(1);
        info!(author_id = %id, "Optimistic profile update applied");

        match self.source.update_profile(id, &changes).await {
            Ok(profile) => {
                self.store.write_entity(EntityPatch::Author {
                    id,
                    fields: AuthorFields::from(&profile),
                });
                info!(author_id = %id, "Profile update confirmed");
                Ok(self.store.author(id).unwrap_or(profile))
            }
            Err(err) => Err(self.rollback(checkpoint, "profile", err)),
        }
    }

    fn identity(&self) -> Result<Identity, MutationError> {
        self.identity.current().ok_or(MutationError::Unauthenticated)
    }

    fn begin(&self, key: EntityKey) -> Result<InFlightGuard<'_>, MutationError> {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "in_flight.acquire");
        if !in_flight.insert(key) {
            warn!(entity = %key, "Rejected concurrent mutation");
            return Err(MutationError::InFlight(key));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            key,
        })
    }

    fn evict_post_collections(&self) {
        self.store.evict_collection(CollectionKind::Feed);
        self.store.evict_collection(CollectionKind::ByAuthor);
    }

    fn rollback(
        &self,
        checkpoint: Checkpoint,
        op: &'static str,
        err: SourceError,
    ) -> MutationError {
        self.store.restore(checkpoint);
        counter!(METRIC_OPTIMISTIC_ROLLBACK, "op" => op).increment(1);
        warn!(op, error = %err, "Mutation failed; optimistic write rolled back");
        MutationError::Source(err)
    }
}
