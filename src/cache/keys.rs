//! Entity store key definitions.

use std::fmt;

use uuid::Uuid;

use crate::domain::fields::{AuthorFields, PostFields};
use crate::domain::types::{CollectionKind, PostFilter};

/// Identifies one normalized entity in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Post(Uuid),
    Author(Uuid),
}

impl EntityKey {
    pub fn id(&self) -> Uuid {
        match self {
            EntityKey::Post(id) | EntityKey::Author(id) => *id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Post(id) => write!(f, "post:{id}"),
            EntityKey::Author(id) => write!(f, "author:{id}"),
        }
    }
}

/// Identifies one cached collection query.
///
/// The page size is part of the key: a cursor is only meaningful for the
/// page size it was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub filter: PostFilter,
    pub page_size: u32,
}

impl CollectionKey {
    pub fn new(filter: PostFilter, page_size: u32) -> Self {
        Self { filter, page_size }
    }

    pub fn kind(&self) -> CollectionKind {
        self.filter.kind()
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filter {
            PostFilter::Published => write!(f, "feed/{}", self.page_size),
            PostFilter::ByAuthor(author) => write!(f, "by_author:{author}/{}", self.page_size),
        }
    }
}

/// A partial entity write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPatch {
    Post { id: Uuid, fields: PostFields },
    Author { id: Uuid, fields: AuthorFields },
}

impl EntityPatch {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityPatch::Post { id, .. } => EntityKey::Post(*id),
            EntityPatch::Author { id, .. } => EntityKey::Author(*id),
        }
    }
}
