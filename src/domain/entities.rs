//! Post and author records as they are rendered.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::domain::types::Confirmation;

const ANONYMOUS_LABEL: &str = "Anonymous";
const GENERATED_AVATAR_BASE: &str = "https://ui-avatars.com/api/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub published: bool,
    /// Owning author. The author row itself may be unresolvable.
    pub author_id: Uuid,
    pub profile_id: Option<Uuid>,
}

/// An author profile. Post views embed the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl AuthorRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            display_name: None,
            avatar_url: None,
            bio: None,
            website: None,
            created_at: None,
        }
    }

    /// Display name, then username, then a fixed placeholder.
    pub fn display_label(&self) -> &str {
        display_label(self.display_name.as_deref(), self.username.as_deref())
    }

    /// Stored avatar, or one generated from the display label.
    pub fn avatar(&self) -> String {
        match non_blank(self.avatar_url.as_deref()) {
            Some(url) => url.to_string(),
            None => generated_avatar(self.display_label()),
        }
    }
}

/// A post together with its resolved author, as returned by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostNode {
    #[serde(flatten)]
    pub post: PostRecord,
    pub author: Option<AuthorRecord>,
}

impl PostNode {
    pub fn new(post: PostRecord, author: Option<AuthorRecord>) -> Self {
        Self { post, author }
    }

    pub fn id(&self) -> Uuid {
        self.post.id
    }
}

/// A post materialized from the entity store for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub post: PostRecord,
    pub author: Option<AuthorRecord>,
    pub confirmation: Confirmation,
}

impl PostView {
    pub fn id(&self) -> Uuid {
        self.post.id
    }

    pub fn is_pending(&self) -> bool {
        self.confirmation.is_pending()
    }

    pub fn author_label(&self) -> &str {
        match &self.author {
            Some(author) => author.display_label(),
            None => ANONYMOUS_LABEL,
        }
    }

    pub fn author_avatar(&self) -> String {
        match &self.author {
            Some(author) => author.avatar(),
            None => generated_avatar(ANONYMOUS_LABEL),
        }
    }

    pub fn is_authored_by(&self, identity: &Identity) -> bool {
        self.post.author_id == identity.id
    }

    /// Body split into paragraphs on line breaks.
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.post.body.split('\n')
    }
}

impl From<PostNode> for PostView {
    /// A record straight from a data source is confirmed by definition.
    fn from(node: PostNode) -> Self {
        Self {
            post: node.post,
            author: node.author,
            confirmation: Confirmation::Confirmed,
        }
    }
}

impl From<PostView> for PostNode {
    fn from(view: PostView) -> Self {
        Self {
            post: view.post,
            author: view.author,
        }
    }
}

/// The currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            display_name: None,
            avatar_url: None,
        }
    }

    /// Author record embedded into optimistic posts.
    pub fn as_author(&self) -> AuthorRecord {
        AuthorRecord {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            ..AuthorRecord::new(self.id)
        }
    }
}

fn display_label<'a>(display_name: Option<&'a str>, username: Option<&'a str>) -> &'a str {
    non_blank(display_name)
        .or_else(|| non_blank(username))
        .unwrap_or(ANONYMOUS_LABEL)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn generated_avatar(label: &str) -> String {
    match Url::parse(GENERATED_AVATAR_BASE) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("name", label)
                .append_pair("background", "random");
            url.into()
        }
        Err(_) => GENERATED_AVATAR_BASE.to_string(),
    }
}
