//! Partial field sets and the structural merge used by every store write.
//!
//! A field that is present in the newer value overwrites; an absent field
//! keeps whatever was stored before. Records are never replaced wholesale.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{AuthorRecord, PostRecord};

/// Field-wise last-write-wins merge.
pub trait Merge {
    fn merge(&mut self, newer: Self);
}

fn overlay<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub published: Option<bool>,
    pub author_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
}

impl Merge for PostFields {
    fn merge(&mut self, newer: Self) {
        overlay(&mut self.title, newer.title);
        overlay(&mut self.body, newer.body);
        overlay(&mut self.created_at, newer.created_at);
        overlay(&mut self.updated_at, newer.updated_at);
        overlay(&mut self.published, newer.published);
        overlay(&mut self.author_id, newer.author_id);
        overlay(&mut self.profile_id, newer.profile_id);
    }
}

impl PostFields {
    /// Build a full record; `None` while required fields are still missing.
    ///
    /// `published` defaults to true when no write ever carried it.
    pub fn materialize(&self, id: Uuid) -> Option<PostRecord> {
        Some(PostRecord {
            id,
            title: self.title.clone()?,
            body: self.body.clone()?,
            created_at: self.created_at?,
            updated_at: self.updated_at,
            published: self.published.unwrap_or(true),
            author_id: self.author_id?,
            profile_id: self.profile_id,
        })
    }
}

impl From<&PostRecord> for PostFields {
    fn from(record: &PostRecord) -> Self {
        Self {
            title: Some(record.title.clone()),
            body: Some(record.body.clone()),
            created_at: Some(record.created_at),
            updated_at: record.updated_at,
            published: Some(record.published),
            author_id: Some(record.author_id),
            profile_id: record.profile_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFields {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

impl Merge for AuthorFields {
    fn merge(&mut self, newer: Self) {
        overlay(&mut self.username, newer.username);
        overlay(&mut self.display_name, newer.display_name);
        overlay(&mut self.avatar_url, newer.avatar_url);
        overlay(&mut self.bio, newer.bio);
        overlay(&mut self.website, newer.website);
        overlay(&mut self.created_at, newer.created_at);
    }
}

impl AuthorFields {
    pub fn materialize(&self, id: Uuid) -> AuthorRecord {
        AuthorRecord {
            id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            bio: self.bio.clone(),
            website: self.website.clone(),
            created_at: self.created_at,
        }
    }
}

impl From<&AuthorRecord> for AuthorFields {
    fn from(record: &AuthorRecord) -> Self {
        Self {
            username: record.username.clone(),
            display_name: record.display_name.clone(),
            avatar_url: record.avatar_url.clone(),
            bio: record.bio.clone(),
            website: record.website.clone(),
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn base() -> PostFields {
        PostFields {
            title: Some("Original title".to_string()),
            body: Some("Original body text".to_string()),
            created_at: Some(datetime!(2024-01-01 00:00 UTC)),
            author_id: Some(Uuid::nil()),
            ..PostFields::default()
        }
    }

    #[test]
    fn absent_fields_are_preserved() {
        let mut fields = base();
        fields.merge(PostFields {
            title: Some("New title".to_string()),
            ..PostFields::default()
        });

        assert_eq!(fields.title.as_deref(), Some("New title"));
        assert_eq!(fields.body.as_deref(), Some("Original body text"));
    }

    #[test]
    fn disjoint_merges_are_associative() {
        let a = PostFields {
            title: Some("A title".to_string()),
            published: Some(false),
            ..PostFields::default()
        };
        let b = PostFields {
            body: Some("B body".to_string()),
            updated_at: Some(datetime!(2024-02-01 00:00 UTC)),
            ..PostFields::default()
        };

        let mut sequential = base();
        sequential.merge(a.clone());
        sequential.merge(b.clone());

        let mut combined = a;
        combined.merge(b);
        let mut direct = base();
        direct.merge(combined);

        assert_eq!(sequential, direct);
    }

    #[test]
    fn incomplete_fields_do_not_materialize() {
        let fields = PostFields {
            title: Some("Only a title".to_string()),
            ..PostFields::default()
        };
        assert!(fields.materialize(Uuid::nil()).is_none());
    }

    #[test]
    fn published_defaults_to_true() {
        let record = base().materialize(Uuid::nil()).expect("complete fields");
        assert!(record.published);
    }

    #[test]
    fn author_merge_keeps_unrelated_fields() {
        let mut author = AuthorFields {
            username: Some("jdoe".to_string()),
            bio: Some("Writes things".to_string()),
            ..AuthorFields::default()
        };
        author.merge(AuthorFields {
            display_name: Some("Jane".to_string()),
            ..AuthorFields::default()
        });
        let record = author.materialize(Uuid::nil());
        assert_eq!(record.username.as_deref(), Some("jdoe"));
        assert_eq!(record.display_name.as_deref(), Some("Jane"));
        assert_eq!(record.bio.as_deref(), Some("Writes things"));
    }
}
