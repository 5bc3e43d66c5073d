//! Response shapes of the pg_graphql endpoint and their conversion into
//! domain records.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{PageInfo, PostPage};
use crate::application::repos::SourceError;
use crate::domain::entities::{AuthorRecord, PostNode, PostRecord};
use crate::domain::posts::{PostChanges, ProfileChanges};
use crate::domain::types::PostFilter;

#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<WireError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireError {
    pub message: String,
}

impl<T> Envelope<T> {
    /// The payload, or the reported errors.
    pub fn into_data(self) -> Result<T, SourceError> {
        if !self.errors.is_empty() {
            return Err(SourceError::Graphql(
                self.errors.into_iter().map(|err| err.message).collect(),
            ));
        }
        self.data
            .ok_or_else(|| SourceError::decode("response carried neither data nor errors"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub(super) struct Edge<T> {
    pub node: T,
}

impl<T> Connection<T> {
    pub fn into_first(self) -> Option<T> {
        self.edges.into_iter().next().map(|edge| edge.node)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct Records<T> {
    pub records: Vec<T>,
}

impl<T> Records<T> {
    pub fn into_first(self, entity: &'static str) -> Result<T, SourceError> {
        self.records
            .into_iter()
            .next()
            .ok_or(SourceError::not_found(entity))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PostsData {
    pub posts_collection: Connection<WirePost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProfilesData {
    pub profiles_collection: Connection<WireProfile>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InsertPostData {
    #[serde(rename = "insertIntopostsCollection")]
    pub inserted: Records<WirePost>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdatePostData {
    #[serde(rename = "updatepostsCollection")]
    pub updated: Records<WirePost>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeletePostData {
    #[serde(rename = "deleteFrompostsCollection")]
    pub deleted: Records<WireId>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateProfileData {
    #[serde(rename = "updateprofilesCollection")]
    pub updated: Records<WireProfile>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireId {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(super) struct WirePost {
    id: Uuid,
    title: String,
    body: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
    published: Option<bool>,
    user_id: Uuid,
    profile_id: Option<Uuid>,
    user: Option<WireProfile>,
}

impl From<WirePost> for PostNode {
    fn from(wire: WirePost) -> Self {
        PostNode::new(
            PostRecord {
                id: wire.id,
                title: wire.title,
                body: wire.body,
                created_at: wire.created_at,
                updated_at: wire.updated_at,
                published: wire.published.unwrap_or(true),
                author_id: wire.user_id,
                profile_id: wire.profile_id,
            },
            wire.user.map(AuthorRecord::from),
        )
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireProfile {
    id: Uuid,
    username: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
}

impl From<WireProfile> for AuthorRecord {
    fn from(wire: WireProfile) -> Self {
        AuthorRecord {
            id: wire.id,
            username: wire.username,
            display_name: wire.display_name,
            avatar_url: wire.avatar_url,
            bio: wire.bio,
            website: wire.website,
            created_at: wire.created_at,
        }
    }
}

impl From<Connection<WirePost>> for PostPage {
    fn from(connection: Connection<WirePost>) -> Self {
        PostPage::new(
            connection
                .edges
                .into_iter()
                .map(|edge| PostNode::from(edge.node))
                .collect(),
            connection.page_info,
        )
    }
}

/// `postsFilter` input for a collection filter.
pub(super) fn post_filter(filter: PostFilter) -> Value {
    match filter {
        PostFilter::Published => json!({ "published": { "eq": true } }),
        PostFilter::ByAuthor(author_id) => json!({ "user_id": { "eq": author_id } }),
    }
}

/// `postsUpdateInput` holding only the fields being changed.
pub(super) fn post_set(changes: &PostChanges, now: OffsetDateTime) -> Result<Value, SourceError> {
    let mut set = Map::new();
    if let Some(title) = &changes.title {
        set.insert("title".into(), json!(title));
    }
    if let Some(body) = &changes.body {
        set.insert("body".into(), json!(body));
    }
    if let Some(published) = changes.published {
        set.insert("published".into(), json!(published));
    }
    let stamp = now
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(SourceError::decode)?;
    set.insert("updated_at".into(), json!(stamp));
    Ok(Value::Object(set))
}

/// `profilesUpdateInput` holding only the fields being changed.
pub(super) fn profile_set(changes: &ProfileChanges) -> Value {
    let mut set = Map::new();
    let fields = [
        ("username", &changes.username),
        ("display_name", &changes.display_name),
        ("avatar_url", &changes.avatar_url),
        ("bio", &changes.bio),
        ("website", &changes.website),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            set.insert(name.into(), json!(value));
        }
    }
    Value::Object(set)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const POSTS_RESPONSE: &str = r#"{
      "data": {
        "postsCollection": {
          "edges": [
            {
              "node": {
                "id": "5f0c1d0e-1b7a-4c55-9a43-0b7e1f9b6a01",
                "title": "Hello world",
                "body": "First paragraph\nSecond paragraph",
                "created_at": "2024-01-02T10:30:00.123456+00:00",
                "updated_at": null,
                "published": true,
                "user_id": "8c2f7e1a-3d4b-4f60-8e21-6a9d0c1b2e3f",
                "profile_id": "8c2f7e1a-3d4b-4f60-8e21-6a9d0c1b2e3f",
                "user": {
                  "id": "8c2f7e1a-3d4b-4f60-8e21-6a9d0c1b2e3f",
                  "username": "jdoe",
                  "display_name": "Jane Doe",
                  "avatar_url": null,
                  "bio": null,
                  "website": null,
                  "created_at": "2023-12-01T00:00:00+00:00"
                }
              }
            },
            {
              "node": {
                "id": "0a6e9b52-7a3c-4b1d-8f25-2c4d6e8f0a12",
                "title": "Orphaned post",
                "body": "Author row is gone",
                "created_at": "2024-01-01T08:00:00+00:00",
                "published": null,
                "user_id": "11111111-2222-4333-8444-555555555555",
                "profile_id": null,
                "user": null
              }
            }
          ],
          "pageInfo": { "hasNextPage": true, "endCursor": "WyIyMDI0LTAxLTAxIl0=" }
        }
      }
    }"#;

    #[test]
    fn posts_response_becomes_a_page() {
        let envelope: Envelope<PostsData> =
            serde_json::from_str(POSTS_RESPONSE).expect("parse response");
        let page = PostPage::from(envelope.into_data().expect("data").posts_collection);

        assert_eq!(page.nodes.len(), 2);
        assert!(page.page_info.has_next_page);
        assert_eq!(
            page.page_info.end_cursor.as_deref(),
            Some("WyIyMDI0LTAxLTAxIl0=")
        );

        let first = &page.nodes[0];
        assert_eq!(first.post.title, "Hello world");
        assert_eq!(first.post.author_id, first.author.as_ref().expect("author").id);
        assert_eq!(
            first.author.as_ref().map(|a| a.display_label()),
            Some("Jane Doe")
        );

        let orphan = &page.nodes[1];
        assert!(orphan.author.is_none());
        assert!(orphan.post.published);
        assert_eq!(orphan.post.created_at, datetime!(2024-01-01 08:00 UTC));
    }

    #[test]
    fn errors_take_precedence_over_data() {
        let envelope: Envelope<PostsData> = serde_json::from_str(
            r#"{ "data": null, "errors": [{ "message": "permission denied for table posts" }] }"#,
        )
        .expect("parse response");

        let err = envelope.into_data().expect_err("errors reported");
        assert_eq!(
            err,
            SourceError::Graphql(vec!["permission denied for table posts".to_string()])
        );
    }

    #[test]
    fn empty_mutation_result_is_not_found() {
        let envelope: Envelope<DeletePostData> = serde_json::from_str(
            r#"{ "data": { "deleteFrompostsCollection": { "records": [] } } }"#,
        )
        .expect("parse response");

        let err = envelope
            .into_data()
            .expect("data")
            .deleted
            .into_first("post")
            .expect_err("no record deleted");
        assert_eq!(err, SourceError::not_found("post"));
    }

    #[test]
    fn filters_map_to_column_predicates() {
        assert_eq!(
            post_filter(PostFilter::Published),
            json!({ "published": { "eq": true } })
        );
        let author = Uuid::nil();
        assert_eq!(
            post_filter(PostFilter::ByAuthor(author)),
            json!({ "user_id": { "eq": "00000000-0000-0000-0000-000000000000" } })
        );
    }

    #[test]
    fn update_sets_only_changed_fields() {
        let changes = PostChanges {
            title: Some("Renamed post".to_string()),
            ..PostChanges::default()
        };
        let set = post_set(&changes, datetime!(2024-03-04 05:06:07 UTC)).expect("set");

        assert_eq!(set["title"], json!("Renamed post"));
        assert_eq!(set["updated_at"], json!("2024-03-04T05:06:07Z"));
        assert!(set.get("body").is_none());
        assert!(set.get("published").is_none());

        let profile = profile_set(&ProfileChanges {
            bio: Some("Short bio".to_string()),
            ..ProfileChanges::default()
        });
        assert_eq!(profile, json!({ "bio": "Short bio" }));
    }
}
