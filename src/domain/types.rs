//! Shared domain enumerations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::PostRecord;

/// Whether a stored record has been acknowledged by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    #[default]
    Confirmed,
    /// Written speculatively ahead of the authoritative response.
    Pending,
}

impl Confirmation {
    pub fn is_pending(self) -> bool {
        matches!(self, Confirmation::Pending)
    }
}

/// Collection filters understood by both data sources.
///
/// Every filter orders by creation time, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostFilter {
    /// Published posts from every author.
    Published,
    /// Every post owned by one author, published or not.
    ByAuthor(Uuid),
}

impl PostFilter {
    pub fn kind(&self) -> CollectionKind {
        match self {
            PostFilter::Published => CollectionKind::Feed,
            PostFilter::ByAuthor(_) => CollectionKind::ByAuthor,
        }
    }

    /// Whether a record belongs in a collection using this filter.
    pub fn admits(&self, post: &PostRecord) -> bool {
        match self {
            PostFilter::Published => post.published,
            PostFilter::ByAuthor(author_id) => post.author_id == *author_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Feed,
    ByAuthor,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Feed => "feed",
            CollectionKind::ByAuthor => "by_author",
        }
    }
}
