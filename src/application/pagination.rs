//! Cursor pagination types shared by the data sources and the entity store.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{PostNode, PostView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PostCursorPayload {
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    id: Uuid,
}

/// Keyset cursor over (creation time desc, id desc).
///
/// Consumers treat the encoded form as opaque; only the source that issued
/// it decodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCursor {
    created_at: OffsetDateTime,
    id: Uuid,
}

impl PostCursor {
    pub fn new(created_at: OffsetDateTime, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> Result<String, PaginationError> {
        let payload = PostCursorPayload {
            created_at: self.created_at,
            id: self.id,
        };
        let serialized = serde_json::to_vec(&payload)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(serialized))
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: PostCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            created_at: payload.created_at,
            id: payload.id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// One page of a collection as returned by a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    pub nodes: Vec<PostNode>,
    pub page_info: PageInfo,
}

impl PostPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(nodes: Vec<PostNode>, page_info: PageInfo) -> Self {
        Self { nodes, page_info }
    }
}

/// A collection as rendered: every loaded page concatenated in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionView {
    pub posts: Vec<PostView>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl CollectionView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.posts.iter().map(PostView::id)
    }
}

impl From<PostPage> for CollectionView {
    /// Read-only view of a single source page, every member confirmed.
    fn from(page: PostPage) -> Self {
        Self {
            posts: page.nodes.into_iter().map(PostView::from).collect(),
            end_cursor: page.page_info.end_cursor,
            has_next_page: page.page_info.has_next_page,
        }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}
