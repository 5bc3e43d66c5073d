//! Data source traits the core depends on.
//!
//! The bootstrap snapshot and the live channel read through separate traits
//! so each can be backed by its own explicitly constructed client.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{PaginationError, PostPage};
use crate::domain::entities::{AuthorRecord, Identity, PostNode};
use crate::domain::posts::{PostChanges, ProfileChanges, ValidPost};
use crate::domain::types::PostFilter;

/// Failure reported by a data source.
///
/// Cloneable so a query state can keep the error next to its last good
/// data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("query failed: {}", .0.join("; "))]
    Graphql(Vec<String>),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("request timed out")]
    Timeout,
}

impl SourceError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}

impl From<PaginationError> for SourceError {
    fn from(err: PaginationError) -> Self {
        Self::decode(err)
    }
}

/// Fields sent to the backend when creating a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub published: bool,
    pub author_id: Uuid,
}

impl NewPost {
    pub fn new(input: ValidPost, author_id: Uuid) -> Self {
        Self {
            title: input.title,
            body: input.body,
            published: input.published,
            author_id,
        }
    }
}

/// Read-only source for the bootstrap snapshot.
///
/// Implementations promise results no older than their staleness window.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot_page(&self, filter: PostFilter, first: u32)
    -> Result<PostPage, SourceError>;

    async fn snapshot_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError>;
}

/// Paginated query and mutation interface of the live backend.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch_page(
        &self,
        filter: PostFilter,
        first: u32,
        after: Option<&str>,
    ) -> Result<PostPage, SourceError>;

    async fn fetch_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError>;

    async fn create_post(&self, post: &NewPost) -> Result<PostNode, SourceError>;

    async fn update_post(&self, id: Uuid, changes: &PostChanges) -> Result<PostNode, SourceError>;

    /// Returns the id of the deleted record.
    async fn delete_post(&self, id: Uuid) -> Result<Uuid, SourceError>;

    async fn fetch_profile(&self, id: Uuid) -> Result<Option<AuthorRecord>, SourceError>;

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<AuthorRecord, SourceError>;
}

/// Supplies the currently authenticated user, if any.
pub trait IdentitySource: Send + Sync {
    fn current(&self) -> Option<Identity>;
}
