//! gh-crawler: snapshot GitHub organization metadata into a versioned sink
//!
//! One run crawls every configured organization and all of their
//! repositories, tags the rows with the configured version, and publishes
//! that version once everything landed. Readers keep seeing the previous
//! snapshot until the publish.

mod config;

use std::sync::Arc;

use anyhow::Context;
use crawler_pool::{CredentialWorker, ResourceKind, WorkerPool, run_jobs};
use github_client::{Downloader, GithubClient, split_repo_id};
use snapshot_store::{ConsoleStore, PostgresStore, SnapshotStore};
use sqlx::postgres::PgPool;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Config;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

/// Minimal arg scan; the only flag is `--config <path>`.
fn config_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
    }
    None
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    match config.sink.database_url {
        Some(ref url) => {
            let pool = PgPool::connect(url)
                .await
                .context("failed to connect to database")?;
            info!("using postgres sink");
            Ok(Arc::new(PostgresStore::new(pool)))
        }
        None => {
            info!("no database configured, printing to console");
            Ok(Arc::new(ConsoleStore::new()))
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = build_store(&config).await?;

    let workers: Vec<CredentialWorker> = config
        .github
        .tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let client = GithubClient::new(token, &config.github.api_url)
                .with_context(|| format!("failed to build client for credential {i}"))?;
            Ok(CredentialWorker::new(
                i,
                Downloader::new(client, Arc::clone(&store)),
            ))
        })
        .collect::<anyhow::Result<_>>()?;

    let pool = Arc::new(WorkerPool::new(workers, Arc::clone(&store))?);
    let version = config.sink.version;

    pool.begin(version).await?;
    info!(version, orgs = config.github.orgs.len(), "run started");

    // Expand each org into its owner/name repository identifiers up front,
    // so the repo fan-out sees the full job list
    let mut repos = Vec::new();
    for org in &config.github.orgs {
        let org_name = org.clone();
        let skip_forks = config.github.skip_forks;
        let names = pool
            .with_lease(move |worker| async move {
                worker
                    .downloader()
                    .list_repositories(&org_name, skip_forks)
                    .await
            })
            .await
            .with_context(|| format!("failed to list repositories of {org}"))?;
        repos.extend(names.into_iter().map(|name| format!("{org}/{name}")));
    }
    info!(repos = repos.len(), "repositories listed");

    run_jobs(
        Arc::clone(&pool),
        ResourceKind::Org,
        config.github.orgs.clone(),
        |worker, org| async move { worker.downloader().download_organization(&org).await },
    )
    .await?;

    run_jobs(
        Arc::clone(&pool),
        ResourceKind::Repo,
        repos,
        |worker, id| async move {
            let (owner, name) = split_repo_id(&id)?;
            worker.downloader().download_repository(owner, name).await
        },
    )
    .await?;

    let stats = pool.end().await?;
    info!(elapsed = ?stats.elapsed, "run finished");
    for (i, usage) in stats.rates_usage.iter().enumerate() {
        info!(
            credential = i,
            used = usage.used,
            speed = %format!("{:.2}/min", usage.speed),
            "credential usage"
        );
    }

    pool.with_lease(move |worker| async move { worker.downloader().set_current(version).await })
        .await
        .context("failed to publish version")?;
    info!(version, "version published");

    if config.sink.cleanup {
        // Stale versions are only garbage; a failed cleanup never fails the run
        let result = pool
            .with_lease(move |worker| async move { worker.downloader().cleanup(version).await })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "cleanup failed, stale versions left in place");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path = Config::resolve_path(config_arg().as_deref());
    let config = Config::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    run(config).await
}
