//! Handlers behind each CLI subcommand.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::{RunArgs, ServeArgs, SourceCommand, UserCommand};
use crate::config::Settings;
use crate::fetch::{GoodreadsFetcher, PageFetcher, StorygraphFetcher};
use crate::model::DataSourceCode;
use crate::notify::{DiscordNotifier, LogNotifier, Notifier};
use crate::reconcile::{Coordinator, RunReport};
use crate::restart::{DeferredRestartTrigger, ExitRestartTrigger, RESTART_EXIT_CODE, RestartTrigger};
use crate::schedule;
use crate::store::{SqliteStore, Store};

pub async fn serve(database: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let settings = Settings::from_env(args.run.dry_run).context("load settings")?;
    let store = SqliteStore::open(database)?;
    let coordinator = build_coordinator(store, &settings, Arc::new(ExitRestartTrigger))?;

    tracing::info!(
        interval_secs = args.interval_secs,
        dry_run = args.run.dry_run,
        "scheduler started"
    );
    schedule::run_every(
        &coordinator,
        Duration::from_secs(args.interval_secs),
        schedule::ctrl_c(),
    )
    .await;
    Ok(())
}

/// Exits with the restart status when the run asked for one.
pub async fn run_once(database: &Path, args: RunArgs) -> anyhow::Result<ExitCode> {
    let settings = Settings::from_env(args.dry_run).context("load settings")?;
    let store = SqliteStore::open(database)?;
    let restart = Arc::new(DeferredRestartTrigger::default());
    let coordinator = build_coordinator(store, &settings, restart.clone())?;

    let report = coordinator.run_once().await;
    print!("{}", render_report(&report));

    if restart.was_requested() {
        return Ok(ExitCode::from(RESTART_EXIT_CODE as u8));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn build_coordinator(
    store: SqliteStore,
    settings: &Settings,
    restart: Arc<dyn RestartTrigger>,
) -> anyhow::Result<Coordinator> {
    let notifier: Arc<dyn Notifier> = match &settings.discord {
        Some(discord) => Arc::new(
            DiscordNotifier::new(discord.clone(), settings.http_timeout)
                .context("build discord notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let fetchers: Vec<Arc<dyn PageFetcher>> = vec![
        Arc::new(
            GoodreadsFetcher::new(&settings.goodreads_base_url, settings.http_timeout)
                .context("build goodreads fetcher")?,
        ),
        Arc::new(
            StorygraphFetcher::new(
                &settings.storygraph_base_url,
                settings.http_timeout,
                settings.storygraph_credentials.clone(),
            )
            .context("build storygraph fetcher")?,
        ),
    ];
    let store: Arc<dyn Store> = Arc::new(store);
    Ok(Coordinator::new(store, notifier, restart, fetchers))
}

pub fn render_report(report: &RunReport) -> String {
    if report.overlapped {
        return format!("run {} skipped: another run is in progress\n", report.run_id);
    }
    let mut out = format!("run {}\n", report.run_id);
    for source in &report.sources {
        out.push_str(&format!(
            "{}: {}, users {}, errors {}, skipped {}, books {}, sent {}\n",
            source.source.display_name(),
            source.outcome.as_str(),
            source.tally.user_count,
            source.tally.error_count,
            source.skipped_users,
            source.book_count,
            source.notifications_sent,
        ));
    }
    if report.restart_requested {
        out.push_str("restart requested\n");
    }
    out
}

pub async fn user(database: &Path, command: UserCommand) -> anyhow::Result<()> {
    let store = SqliteStore::open(database)?;
    match command {
        UserCommand::Add(args) => {
            let user = store
                .add_user(&args.chat_user_id, args.source, &args.source_user_id)
                .await?;
            println!(
                "added {} ({} user {})",
                user.chat_user_id,
                user.data_source.display_name(),
                user.data_source_user_id
            );
        }
        UserCommand::Remove(args) => {
            store.remove_user(&args.chat_user_id).await?;
            println!("removed {}", args.chat_user_id);
        }
        UserCommand::ChangeSource(args) => {
            store
                .change_source(&args.chat_user_id, args.source, &args.source_user_id)
                .await?;
            println!(
                "{} now uses {} user {}",
                args.chat_user_id,
                args.source.display_name(),
                args.source_user_id
            );
        }
        UserCommand::Reset(args) => {
            store.reset_user_books(&args.chat_user_id).await?;
            println!("cleared books for {}", args.chat_user_id);
        }
        UserCommand::List => {
            let listings = store.list_users_with_books().await?;
            if listings.is_empty() {
                println!("no users");
            }
            for listing in listings {
                print!("{}", listing.render());
            }
        }
    }
    Ok(())
}

pub async fn reset_users(database: &Path) -> anyhow::Result<()> {
    let store = SqliteStore::open(database)?;
    store.reset_all_users().await?;
    println!("all users reset");
    Ok(())
}

pub async fn source(database: &Path, command: SourceCommand) -> anyhow::Result<()> {
    let store = SqliteStore::open(database)?;
    match command {
        SourceCommand::Enable(args) => {
            store.set_source_enabled(args.source, true).await?;
            print_source(args.source, true);
        }
        SourceCommand::Disable(args) => {
            store.set_source_enabled(args.source, false).await?;
            print_source(args.source, false);
        }
        SourceCommand::Toggle(args) => {
            let enabled = store.toggle_source(args.source).await?;
            print_source(args.source, enabled);
        }
        SourceCommand::Status => {
            let config = store.load_run_config().await?;
            for source in DataSourceCode::ALL {
                print_source(source, config.is_enabled(source));
            }
        }
    }
    Ok(())
}

fn print_source(source: DataSourceCode, enabled: bool) {
    let state = if enabled { "enabled" } else { "disabled" };
    println!("{}: {state}", source.display_name());
}
