//! bibsync CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration** — load `.bibsync/config.toml` and validate it.
//! 2. **Wire observability** — configure `tracing-subscriber` with a pretty or
//!    JSON layer and an optional OpenTelemetry OTLP exporter. All `tracing`
//!    spans and structured events emitted by every crate in the workspace flow
//!    through this layer.
//! 3. **Construct infrastructure** — create concrete instances of all
//!    infrastructure types (`GitRepository`, `FileRunLock`, `ZoteroClient`,
//!    `WikiClient`, report sinks, event source) and inject them into
//!    `PipelineExecutor`.
//! 4. **Select trigger mode**:
//!    - `run` — decode one event (the Actions event, or a synthesised manual
//!      or schedule event), evaluate it against the trigger policy, and run
//!      at most once.
//!    - `schedule` — drive runs from a [`listener::ScheduleEventSource`] until
//!      Ctrl-C.

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use github::{ConsoleReport, FileRunLock, GitRepository, StepSummary};
use listener::{ActionsEventSource, ScheduleEventSource, EVENT_NAME_ENV};
use nodes::{BuiltinSyncExecutor, CommitNode, ExternalSyncExecutor, PipelineExecutor, Reporter};
use pipeline::{
    EventSource, MergeOptions, ReportSink, RunLock, SyncExecutor, Timestamp, TriggerEvent,
    TriggerPolicy, ZoteroCredentials,
};
use tracing::{info, warn};
use wiki::WikiClient;
use zotero::ZoteroClient;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(
    name = "bibsync",
    version,
    about = "Keep a BibTeX bibliography in sync with Zotero and wiki citations"
)]
struct Cli {
    /// Config file [default: <repo>/.bibsync/config.toml]
    #[arg(long, global = true, env = "BIBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run once: provision, sync, commit, push, report
    Run {
        /// Where the triggering event comes from
        #[arg(long, value_enum, default_value_t = TriggerArg::Auto)]
        trigger: TriggerArg,
    },
    /// Run only the sync executor and print counts; nothing is committed
    Sync,
    /// Run on the daily schedule until interrupted
    Schedule,
    /// Print the next scheduled run time
    NextRun,
    /// Report whether the current GitHub Actions event would start a run
    CheckTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TriggerArg {
    /// The GitHub Actions event when running in Actions, otherwise manual
    Auto,
    Manual,
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let telemetry = telemetry::init()?;

    let result = dispatch(cli).await;

    telemetry.shutdown();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(&cli.repo, cli.config.as_deref()).context("invalid configuration")?;
    let policy = config.trigger_policy()?;

    match cli.command {
        Command::Run { trigger } => {
            let event = trigger_event(trigger, &policy, |name| std::env::var(name).ok())?;
            let Some(intent) = policy.evaluate(&event) else {
                info!(event = ?event, "Event does not trigger a run");
                return Ok(ExitCode::SUCCESS);
            };
            let report = build_executor(&config, &cli.repo)?.run(intent).await;
            Ok(exit_code(report.outcome.is_success()))
        }
        Command::Sync => {
            let summary = build_executor(&config, &cli.repo)?.sync_only().await?;
            println!(
                "{} added, {} updated, {} total",
                summary.added, summary.updated, summary.total
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Schedule => {
            schedule_loop(&config, &cli.repo, &policy).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::NextRun => {
            println!("{}", policy.schedule().next_after(Timestamp::now()));
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckTrigger => {
            let mut source = ActionsEventSource::from_env()?;
            let event = source.next_event().await.context("no event to evaluate")?;
            match policy.evaluate(&event) {
                Some(intent) => println!("run ({})", intent.trigger),
                None => println!("skip"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// The single event a `run` evaluates. `lookup` reads environment variables.
fn trigger_event<F>(
    trigger: TriggerArg,
    policy: &TriggerPolicy,
    lookup: F,
) -> anyhow::Result<TriggerEvent>
where
    F: Fn(&str) -> Option<String>,
{
    match trigger {
        TriggerArg::Manual => Ok(TriggerEvent::Manual),
        TriggerArg::Schedule => Ok(TriggerEvent::Schedule {
            cron: Some(policy.schedule().expression().to_string()),
        }),
        TriggerArg::Auto => {
            if lookup(EVENT_NAME_ENV).map_or(true, |name| name.trim().is_empty()) {
                info!("Not running in GitHub Actions; treating as a manual run");
                return Ok(TriggerEvent::Manual);
            }
            let source = ActionsEventSource::from_lookup(lookup)?;
            source.peek().cloned().context("Actions event source yielded no event")
        }
    }
}

async fn schedule_loop(config: &Config, repo: &Path, policy: &TriggerPolicy) -> anyhow::Result<()> {
    let executor = build_executor(config, repo)?;
    let mut source = ScheduleEventSource::new(policy.schedule().clone());
    info!(schedule = %policy.schedule(), "Scheduler started");

    loop {
        let event = tokio::select! {
            event = source.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping scheduler");
                return Ok(());
            }
        };
        let Some(event) = event else { return Ok(()) };
        if let Some(intent) = policy.evaluate(&event) {
            let report = executor.run(intent).await;
            if !report.outcome.is_success() {
                warn!(run_id = %report.run_id, "Scheduled run failed; waiting for the next one");
            }
        }
    }
}

/// Wires the concrete adapters for `repo` into a [`PipelineExecutor`].
fn build_executor(config: &Config, repo: &Path) -> anyhow::Result<PipelineExecutor> {
    let bibliography = config.bibliography_path()?;
    let git = GitRepository::new(repo).with_push_target(config.push_target()?);

    let lock_timeout = Duration::from_secs(config.lock.timeout_secs);
    let lock = match &config.lock.path {
        Some(path) => FileRunLock::new(repo.join(path), lock_timeout),
        // Outside a work tree provisioning fails before the lock is taken.
        None => {
            let git_dir = git.git_dir().unwrap_or_else(|_| repo.join(".git"));
            FileRunLock::in_git_dir(&git_dir, lock_timeout)
        }
    };

    let sync: Arc<dyn SyncExecutor> = match config.external_command() {
        Some((command, requires_credentials)) => {
            info!(command = %command, "Using external sync executor");
            Arc::new(
                ExternalSyncExecutor::new(command, repo)
                    .with_credentials_required(requires_credentials),
            )
        }
        None => {
            let options = MergeOptions { source_tag: config.wiki.source_tag.clone() };
            let mut builtin = BuiltinSyncExecutor::new(repo.join(bibliography.as_str()), options);
            if config.zotero.enabled {
                let client = ZoteroClient::new(config.zotero.client.clone())
                    .context("cannot create Zotero client")?;
                builtin = builtin.with_references(Arc::new(client));
            }
            let pages = config.wiki_pages()?;
            if !pages.is_empty() {
                let client = WikiClient::new(config.wiki.client.clone())
                    .context("cannot create wiki client")?;
                builtin = builtin.with_citations(Arc::new(client), pages);
            }
            Arc::new(builtin)
        }
    };

    let committer = CommitNode::new(repo, bibliography)
        .with_identity(config.commit_identity()?)
        .with_message(config.commit.message.clone())
        .with_push(config.commit.push);

    let sink: Arc<dyn ReportSink> = match StepSummary::from_env() {
        Some(summary) => {
            info!(path = %summary.path().display(), "Reporting to the Actions job summary");
            Arc::new(summary)
        }
        None => Arc::new(ConsoleReport),
    };

    let lock: Arc<dyn RunLock> = Arc::new(lock);
    Ok(PipelineExecutor::new(repo, committer, Arc::new(git), lock, sync)
        .with_reporter(Reporter::default().with_sink(sink))
        .with_credentials(ZoteroCredentials::from_lookup(|name| std::env::var(name).ok())))
}
