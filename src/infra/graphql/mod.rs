//! HTTP client for a pg_graphql endpoint.
//!
//! One [`GraphqlSource`] serves either role: the bootstrap snapshot reads
//! through one instance and the live channel through another, each with its
//! own connection pool.

mod queries;
mod wire;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::pagination::PostPage;
use crate::application::repos::{LiveSource, NewPost, SnapshotSource, SourceError};
use crate::config::BackendSettings;
use crate::domain::entities::{AuthorRecord, PostNode};
use crate::domain::posts::{PostChanges, ProfileChanges};
use crate::domain::types::PostFilter;
use crate::infra::error::InfraError;

use wire::{
    DeletePostData, Envelope, InsertPostData, PostsData, ProfilesData, UpdatePostData,
    UpdateProfileData,
};

const GRAPHQL_PATH: &str = "graphql/v1";

#[derive(Clone, Debug)]
pub struct GraphqlSource {
    client: Client,
    endpoint: Url,
    api_key: String,
    access_token: Option<String>,
}

impl GraphqlSource {
    pub fn new(settings: &BackendSettings) -> Result<Self, InfraError> {
        let base = settings
            .url
            .as_ref()
            .ok_or_else(|| InfraError::configuration("backend.url is not set"))?;
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| InfraError::configuration("backend.api_key is not set"))?;
        let endpoint = endpoint(base)?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            access_token: settings.access_token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("folio/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, SourceError> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(map_transport)?;
        if !status.is_success() {
            // pg_graphql reports query errors in the body even on 4xx.
            if let Ok(envelope) = serde_json::from_slice::<Envelope<Value>>(&bytes)
                && !envelope.errors.is_empty()
            {
                return Err(SourceError::Graphql(
                    envelope.errors.into_iter().map(|err| err.message).collect(),
                ));
            }
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(SourceError::transport(format!("status {status} body {text}")));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|err| SourceError::decode(format!("failed to parse body: {err}")))?;
        envelope.into_data()
    }

    async fn page(
        &self,
        filter: PostFilter,
        first: u32,
        after: Option<&str>,
    ) -> Result<PostPage, SourceError> {
        let data: PostsData = self
            .execute(
                &queries::posts(),
                json!({
                    "first": first,
                    "after": after,
                    "filter": wire::post_filter(filter),
                }),
            )
            .await?;
        let page = PostPage::from(data.posts_collection);
        debug!(
            members = page.nodes.len(),
            has_next_page = page.page_info.has_next_page,
            "Page received"
        );
        Ok(page)
    }

    async fn post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError> {
        let data: PostsData = self
            .execute(&queries::post_by_id(), json!({ "id": id }))
            .await?;
        Ok(data.posts_collection.into_first().map(PostNode::from))
    }
}

fn endpoint(base: &Url) -> Result<Url, InfraError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(GRAPHQL_PATH)
        .map_err(|err| InfraError::configuration(format!("invalid backend.url: {err}")))
}

fn map_transport(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::transport(err)
    }
}

#[async_trait]
impl SnapshotSource for GraphqlSource {
    #[instrument(skip(self))]
    async fn snapshot_page(
        &self,
        filter: PostFilter,
        first: u32,
    ) -> Result<PostPage, SourceError> {
        self.page(filter, first, None).await
    }

    #[instrument(skip(self))]
    async fn snapshot_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError> {
        self.post(id).await
    }
}

#[async_trait]
impl LiveSource for GraphqlSource {
    #[instrument(skip(self))]
    async fn fetch_page(
        &self,
        filter: PostFilter,
        first: u32,
        after: Option<&str>,
    ) -> Result<PostPage, SourceError> {
        self.page(filter, first, after).await
    }

    #[instrument(skip(self))]
    async fn fetch_post(&self, id: Uuid) -> Result<Option<PostNode>, SourceError> {
        self.post(id).await
    }

    #[instrument(skip(self, post), fields(author_id = %post.author_id))]
    async fn create_post(&self, post: &NewPost) -> Result<PostNode, SourceError> {
        let data: InsertPostData = self
            .execute(
                &queries::create_post(),
                json!({
                    "title": post.title,
                    "body": post.body,
                    "published": post.published,
                    "user_id": post.author_id,
                }),
            )
            .await?;
        data.inserted
            .into_first("post")
            .map(PostNode::from)
            .map_err(|_| SourceError::Rejected("insert returned no record".to_string()))
    }

    #[instrument(skip(self, changes))]
    async fn update_post(&self, id: Uuid, changes: &PostChanges) -> Result<PostNode, SourceError> {
        let set = wire::post_set(changes, OffsetDateTime::now_utc())?;
        let data: UpdatePostData = self
            .execute(&queries::update_post(), json!({ "id": id, "set": set }))
            .await?;
        data.updated.into_first("post").map(PostNode::from)
    }

    #[instrument(skip(self))]
    async fn delete_post(&self, id: Uuid) -> Result<Uuid, SourceError> {
        let data: DeletePostData = self
            .execute(queries::DELETE_POST, json!({ "id": id }))
            .await?;
        data.deleted.into_first("post").map(|record| record.id)
    }

    #[instrument(skip(self))]
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<AuthorRecord>, SourceError> {
        let data: ProfilesData = self
            .execute(&queries::profile_by_id(), json!({ "id": id }))
            .await?;
        Ok(data.profiles_collection.into_first().map(AuthorRecord::from))
    }

    #[instrument(skip(self, changes))]
    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<AuthorRecord, SourceError> {
        let data: UpdateProfileData = self
            .execute(
                &queries::update_profile(),
                json!({ "id": id, "set": wire::profile_set(changes) }),
            )
            .await?;
        data.updated.into_first("profile").map(AuthorRecord::from)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::BackendKind;

    use super::*;

    fn settings(url: &str) -> BackendSettings {
        BackendSettings {
            kind: BackendKind::Graphql,
            url: Some(Url::parse(url).expect("url")),
            api_key: Some("anon-key".to_string()),
            access_token: None,
            timeout: Duration::from_secs(5),
            fixtures: None,
        }
    }

    #[test]
    fn endpoint_appends_graphql_path() {
        let source = GraphqlSource::new(&settings("https://project.supabase.co")).expect("source");
        assert_eq!(
            source.endpoint().as_str(),
            "https://project.supabase.co/graphql/v1"
        );

        let nested = GraphqlSource::new(&settings("http://localhost:54321/base")).expect("source");
        assert_eq!(
            nested.endpoint().as_str(),
            "http://localhost:54321/base/graphql/v1"
        );
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let mut settings = settings("https://project.supabase.co");
        settings.api_key = None;

        let err = GraphqlSource::new(&settings).expect_err("api key required");
        assert!(matches!(err, InfraError::Configuration { .. }));
    }
}
