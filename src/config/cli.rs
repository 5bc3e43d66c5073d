use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the Folio client.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Folio blog reader and editor")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render the published feed, or one author's posts.
    Feed(FeedArgs),
    /// Render a single post.
    Show(PostIdArgs),
    /// Create a post.
    Create(CreateArgs),
    /// Update fields of an existing post.
    Update(UpdateArgs),
    /// Delete a post.
    Delete(PostIdArgs),
    /// Render an author profile.
    Profile(ProfileIdArgs),
    /// Update fields of an author profile.
    #[command(name = "profile-update")]
    ProfileUpdate(ProfileUpdateArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Feed(FeedArgs::default())
    }
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Number of pages to load.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// List every post by this author instead of the published feed.
    #[arg(long, value_name = "UUID")]
    pub author: Option<Uuid>,
}

impl Default for FeedArgs {
    fn default() -> Self {
        Self {
            pages: 1,
            author: None,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct PostIdArgs {
    #[arg(value_name = "POST_ID")]
    pub id: Uuid,
}

#[derive(Debug, Args, Clone)]
pub struct ProfileIdArgs {
    #[arg(value_name = "PROFILE_ID")]
    pub id: Uuid,
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub body: String,

    /// Save without publishing.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub draft: bool,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_name = "POST_ID")]
    pub id: Uuid,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub body: Option<String>,

    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub published: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct ProfileUpdateArgs {
    #[arg(value_name = "PROFILE_ID")]
    pub id: Uuid,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long = "display-name")]
    pub display_name: Option<String>,

    #[arg(long = "avatar-url", value_name = "URL")]
    pub avatar_url: Option<String>,

    #[arg(long)]
    pub bio: Option<String>,

    #[arg(long, value_name = "URL")]
    pub website: Option<String>,
}

/// Settings overridable from the command line for every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the backend kind (graphql|memory).
    #[arg(long = "backend-kind", value_name = "KIND")]
    pub backend_kind: Option<String>,

    /// Override the backend base URL.
    #[arg(long = "backend-url", value_name = "URL")]
    pub backend_url: Option<String>,

    /// Override the backend request timeout.
    #[arg(long = "backend-timeout-seconds", value_name = "SECONDS")]
    pub backend_timeout_seconds: Option<u64>,

    /// Seed the memory backend from this JSON file.
    #[arg(long = "backend-fixtures", value_name = "PATH")]
    pub backend_fixtures: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the collection page size.
    #[arg(long = "cache-page-size", value_name = "COUNT")]
    pub cache_page_size: Option<u64>,

    /// Act as this user for mutations.
    #[arg(long = "identity-user-id", value_name = "UUID")]
    pub identity_user_id: Option<Uuid>,
}
