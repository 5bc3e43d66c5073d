//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;
use uuid::Uuid;

use crate::domain::entities::Identity;

mod cli;

pub use cli::{
    CliArgs, Command, CreateArgs, FeedArgs, GlobalOverrides, PostIdArgs, ProfileIdArgs,
    ProfileUpdateArgs, UpdateArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PAGE_SIZE: u64 = 5;
const DEFAULT_SNAPSHOT_STALENESS_SECS: u64 = 60;
const DEFAULT_COLLECTION_LIMIT: u64 = 50;
const DEFAULT_SNAPSHOT_LIMIT: u64 = 100;
const DEFAULT_PRERENDER_COUNT: usize = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// pg_graphql endpoint reached over HTTP.
    Graphql,
    /// Process-local store, seeded from `backend.fixtures` when set.
    Memory,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Duration,
    /// JSON file of posts and profiles loaded into a memory backend.
    pub fixtures: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub page_size: NonZeroU32,
    pub snapshot_staleness_seconds: NonZeroU64,
    pub collection_limit: NonZeroUsize,
    pub snapshot_limit: NonZeroUsize,
    pub prerender_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IdentitySettings {
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl IdentitySettings {
    /// The configured user, if a user id is set.
    pub fn identity(&self) -> Option<Identity> {
        self.user_id.map(|id| Identity {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            ..Identity::new(id)
        })
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    backend: RawBackendSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    identity: RawIdentitySettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(kind) = overrides.backend_kind.as_ref() {
            self.backend.kind = Some(kind.clone());
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(seconds) = overrides.backend_timeout_seconds {
            self.backend.timeout_seconds = Some(seconds);
        }
        if let Some(path) = overrides.backend_fixtures.as_ref() {
            self.backend.fixtures = Some(path.display().to_string());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(size) = overrides.cache_page_size {
            self.cache.page_size = Some(size);
        }
        if let Some(user_id) = overrides.identity_user_id {
            self.identity.user_id = Some(user_id.to_string());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            backend: build_backend_settings(raw.backend)?,
            logging: build_logging_settings(raw.logging)?,
            cache: build_cache_settings(raw.cache)?,
            identity: build_identity_settings(raw.identity)?,
        })
    }
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let kind = match backend.kind.as_deref().map(str::trim) {
        None | Some("") | Some("graphql") => BackendKind::Graphql,
        Some("memory") => BackendKind::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "backend.kind",
                format!("unknown backend `{other}` (expected graphql or memory)"),
            ));
        }
    };

    let url = match non_blank(backend.url) {
        Some(value) => Some(
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("backend.url", format!("invalid URL: {err}")))?,
        ),
        None => None,
    };
    let api_key = non_blank(backend.api_key);

    if kind == BackendKind::Graphql {
        if url.is_none() {
            return Err(LoadError::invalid(
                "backend.url",
                "required when backend.kind is graphql",
            ));
        }
        if api_key.is_none() {
            return Err(LoadError::invalid(
                "backend.api_key",
                "required when backend.kind is graphql",
            ));
        }
    }

    let fixtures = non_blank(backend.fixtures).map(PathBuf::from);
    if fixtures.is_some() && kind != BackendKind::Memory {
        return Err(LoadError::invalid(
            "backend.fixtures",
            "only used when backend.kind is memory",
        ));
    }

    let timeout_seconds = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackendSettings {
        kind,
        url,
        api_key,
        access_token: non_blank(backend.access_token),
        timeout: Duration::from_secs(timeout_seconds),
        fixtures,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let page_size = non_zero_u32(cache.page_size.unwrap_or(DEFAULT_PAGE_SIZE), "cache.page_size")?;
    let staleness = cache
        .snapshot_staleness_seconds
        .unwrap_or(DEFAULT_SNAPSHOT_STALENESS_SECS);
    let snapshot_staleness_seconds = NonZeroU64::new(staleness).ok_or_else(|| {
        LoadError::invalid("cache.snapshot_staleness_seconds", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        page_size,
        snapshot_staleness_seconds,
        collection_limit: non_zero_usize(
            cache.collection_limit.unwrap_or(DEFAULT_COLLECTION_LIMIT),
            "cache.collection_limit",
        )?,
        snapshot_limit: non_zero_usize(
            cache.snapshot_limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT),
            "cache.snapshot_limit",
        )?,
        prerender_count: cache.prerender_count.unwrap_or(DEFAULT_PRERENDER_COUNT),
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let user_id = match non_blank(identity.user_id) {
        Some(value) => Some(Uuid::parse_str(&value).map_err(|err| {
            LoadError::invalid("identity.user_id", format!("invalid UUID: {err}"))
        })?),
        None => None,
    };

    Ok(IdentitySettings {
        user_id,
        display_name: non_blank(identity.display_name),
        avatar_url: non_blank(identity.avatar_url),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    kind: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    timeout_seconds: Option<u64>,
    fixtures: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    page_size: Option<u64>,
    snapshot_staleness_seconds: Option<u64>,
    collection_limit: Option<u64>,
    snapshot_limit: Option<u64>,
    prerender_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    user_id: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
