//! Post and profile input validation.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use url::Url;

use crate::domain::error::DomainError;
use crate::domain::fields::{AuthorFields, PostFields};

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 100;
pub const BODY_MIN_CHARS: usize = 10;
pub const BODY_MAX_CHARS: usize = 50_000;
pub const BIO_MAX_CHARS: usize = 250;

pub const HUMAN_TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[month repr:long] [day padding:none], [year] [hour repr:12 padding:none]:[minute] [period]"
);

/// Fields submitted when creating a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostInput {
    pub title: String,
    pub body: String,
    pub published: Option<bool>,
}

/// A post input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPost {
    pub title: String,
    pub body: String,
    pub published: bool,
}

impl PostInput {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            published: None,
        }
    }

    pub fn validate(self) -> Result<ValidPost, DomainError> {
        validate_title(&self.title)?;
        validate_body(&self.body)?;
        Ok(ValidPost {
            title: self.title,
            body: self.body,
            published: self.published.unwrap_or(true),
        })
    }
}

/// Partial update of a post. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub published: Option<bool>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.published.is_none()
    }

    pub fn validate(self) -> Result<Self, DomainError> {
        if self.is_empty() {
            return Err(DomainError::validation("post", "no fields to update"));
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(body) = &self.body {
            validate_body(body)?;
        }
        Ok(self)
    }

    /// Field set for an optimistic write stamped with `now`.
    pub fn to_fields(&self, now: OffsetDateTime) -> PostFields {
        PostFields {
            title: self.title.clone(),
            body: self.body.clone(),
            published: self.published,
            updated_at: Some(now),
            ..PostFields::default()
        }
    }
}

/// Partial update of an author profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

impl ProfileChanges {
    pub fn validate(self) -> Result<Self, DomainError> {
        if let Some(bio) = &self.bio
            && bio.chars().count() > BIO_MAX_CHARS
        {
            return Err(DomainError::validation(
                "bio",
                format!("must be at most {BIO_MAX_CHARS} characters"),
            ));
        }
        if let Some(website) = self.website.as_deref().filter(|value| !value.is_empty()) {
            Url::parse(website)
                .map_err(|err| DomainError::validation("website", format!("not a URL: {err}")))?;
        }
        Ok(self)
    }

    pub fn to_fields(&self) -> AuthorFields {
        AuthorFields {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            bio: self.bio.clone(),
            website: self.website.clone(),
            created_at: None,
        }
    }
}

fn validate_title(title: &str) -> Result<(), DomainError> {
    let count = title.trim().chars().count();
    if count < TITLE_MIN_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("must be at least {TITLE_MIN_CHARS} characters long"),
        ));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("cannot exceed {TITLE_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}

fn validate_body(body: &str) -> Result<(), DomainError> {
    let count = body.trim().chars().count();
    if count < BODY_MIN_CHARS {
        return Err(DomainError::validation(
            "body",
            format!("must be at least {BODY_MIN_CHARS} characters long"),
        ));
    }
    if body.chars().count() > BODY_MAX_CHARS {
        return Err(DomainError::validation("body", "content is too long"));
    }
    Ok(())
}

pub fn format_human_timestamp(at: OffsetDateTime) -> String {
    at.format(HUMAN_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
