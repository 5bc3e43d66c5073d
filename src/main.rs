use std::{process, sync::Arc};

use folio::{
    application::{
        error::AppError,
        live::LiveQueryChannel,
        mutations::MutationCoordinator,
        reconcile::Render,
        repos::{IdentitySource, LiveSource, SnapshotSource},
        snapshot::SnapshotBootstrap,
        views::{PostDetailView, PostListView},
    },
    cache::{CacheConfig, EntityStore},
    config::{self, BackendKind, Settings},
    domain::{
        posts::{PostChanges, PostInput, ProfileChanges},
        types::PostFilter,
    },
    infra::{
        graphql::GraphqlSource,
        identity::StaticIdentity,
        memory::{Fixtures, MemorySource},
        telemetry,
    },
    presentation::views,
};
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
    } else {
        let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
        let dispatch = Dispatch::new(subscriber);
        dispatcher::with_default(&dispatch, || {
            error!(error = %error, "application error");
        });
    }
    eprintln!("folio: {error}");
}

/// Everything a command needs, wired once per invocation.
struct AppContext {
    bootstrap: SnapshotBootstrap,
    channel: LiveQueryChannel,
    mutations: MutationCoordinator,
}

impl AppContext {
    fn build(settings: &Settings) -> Result<Self, AppError> {
        let cache_config = CacheConfig::from(&settings.cache);
        let (snapshot_source, live_source) = build_sources(settings)?;
        let identity: Arc<dyn IdentitySource> =
            Arc::new(StaticIdentity::new(settings.identity.identity()));

        let store = Arc::new(EntityStore::new(&cache_config));
        let channel = LiveQueryChannel::new(store.clone(), live_source.clone(), &cache_config);
        let mutations = MutationCoordinator::new(store, live_source, identity);
        let bootstrap = SnapshotBootstrap::new(snapshot_source, &cache_config);

        Ok(Self {
            bootstrap,
            channel,
            mutations,
        })
    }
}

fn build_sources(
    settings: &Settings,
) -> Result<(Arc<dyn SnapshotSource>, Arc<dyn LiveSource>), AppError> {
    match settings.backend.kind {
        BackendKind::Graphql => {
            let live = GraphqlSource::new(&settings.backend)?;
            info!(endpoint = %live.endpoint(), "Using GraphQL backend");
            let snapshot: Arc<dyn SnapshotSource> =
                Arc::new(GraphqlSource::new(&settings.backend)?);
            let live: Arc<dyn LiveSource> = Arc::new(live);
            Ok((snapshot, live))
        }
        BackendKind::Memory => {
            let source = match settings.backend.fixtures.as_deref() {
                Some(path) => Arc::new(MemorySource::with_fixtures(Fixtures::load(path)?)),
                None => Arc::new(MemorySource::new()),
            };
            info!("Using in-memory backend");
            let snapshot: Arc<dyn SnapshotSource> = source.clone();
            let live: Arc<dyn LiveSource> = source;
            Ok((snapshot, live))
        }
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or_default();

    telemetry::init(&settings.logging)?;
    let app = AppContext::build(&settings)?;

    match command {
        config::Command::Feed(args) => run_feed(&app, args).await,
        config::Command::Show(args) => run_show(&app, args).await,
        config::Command::Create(args) => run_create(&app, args).await,
        config::Command::Update(args) => run_update(&app, args).await,
        config::Command::Delete(args) => run_delete(&app, args).await,
        config::Command::Profile(args) => run_profile(&app, args).await,
        config::Command::ProfileUpdate(args) => run_profile_update(&app, args).await,
    }
}

async fn run_feed(app: &AppContext, args: config::FeedArgs) -> Result<(), AppError> {
    let filter = match args.author {
        Some(author_id) => PostFilter::ByAuthor(author_id),
        None => PostFilter::Published,
    };

    let snapshot = app.bootstrap.collection(filter).await;
    let mut view = PostListView::mount(snapshot, &app.channel, filter);
    let observation = view.poll().await;
    debug!(?observation, phase = ?view.phase(), "Feed polled");

    for _ in 1..args.pages {
        if !view.load_more().await? {
            break;
        }
    }

    print!("{}", views::post_list(&view.render()));
    view.unmount();
    Ok(())
}

async fn run_show(app: &AppContext, args: config::PostIdArgs) -> Result<(), AppError> {
    let snapshot = app.bootstrap.entity(args.id).await;
    let mut view = PostDetailView::mount(snapshot, &app.channel, args.id);
    view.poll().await;

    let render = view.render();
    if let Render::Content { data: None, .. } = render {
        return Err(AppError::NotFound);
    }
    print!("{}", views::post_detail(&render));
    view.unmount();
    Ok(())
}

async fn run_create(app: &AppContext, args: config::CreateArgs) -> Result<(), AppError> {
    let input = PostInput {
        published: Some(!args.draft),
        ..PostInput::new(args.title, args.body)
    };
    let post = app.mutations.create(input).await?;
    println!("{}", views::post_summary(&post));
    Ok(())
}

async fn run_update(app: &AppContext, args: config::UpdateArgs) -> Result<(), AppError> {
    let changes = PostChanges {
        title: args.title,
        body: args.body,
        published: args.published,
    };
    let post = app.mutations.update(args.id, changes).await?;
    println!("{}", views::post_summary(&post));
    Ok(())
}

async fn run_delete(app: &AppContext, args: config::PostIdArgs) -> Result<(), AppError> {
    let deleted = app.mutations.remove(args.id).await?;
    println!("deleted {deleted}");
    Ok(())
}

async fn run_profile(app: &AppContext, args: config::ProfileIdArgs) -> Result<(), AppError> {
    let profile = app
        .channel
        .fetch_profile(args.id)
        .await?
        .ok_or(AppError::NotFound)?;
    print!("{}", views::profile(&profile));
    Ok(())
}

async fn run_profile_update(
    app: &AppContext,
    args: config::ProfileUpdateArgs,
) -> Result<(), AppError> {
    let changes = ProfileChanges {
        username: args.username,
        display_name: args.display_name,
        avatar_url: args.avatar_url,
        bio: args.bio,
        website: args.website,
    };
    let profile = app.mutations.update_profile(args.id, changes).await?;
    print!("{}", views::profile(&profile));
    Ok(())
}
