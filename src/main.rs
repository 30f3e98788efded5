use std::fs::OpenOptions;
use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use octocrab::Octocrab;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patch_mirror::catalog::PatchCatalog;
use patch_mirror::config::Cli;
use patch_mirror::driver::{RepositoryDriver, RunSummary};
use patch_mirror::github::{OctocrabClient, RetryConfig, list_accessible_repos};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,patch_mirror=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (token, config) = cli.into_config()?;

    let catalog = PatchCatalog::load(&config.catalog_dir, &config.remote_dir)
        .with_context(|| format!("loading patches from {}", config.catalog_dir.display()))?;
    tracing::info!(patches = catalog.len(), "Loaded patch catalog");
    for name in config.unmatched_force(&catalog) {
        tracing::warn!(package = name, "Forced package has no patch in the catalog");
    }

    let octocrab = Octocrab::builder()
        .personal_token(token)
        .build()
        .context("building GitHub client")?;

    let repos = if config.repos.is_empty() {
        list_accessible_repos(&octocrab)
            .await
            .context("listing accessible repositories")?
    } else {
        config.repos.clone()
    };
    tracing::info!(repos = repos.len(), dry_run = config.dry_run, "Starting run");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping before the next action");
            on_interrupt.cancel();
        }
    });

    let summary = RepositoryDriver::new(&catalog, &config, cancel)
        .run(&repos, |repo| {
            OctocrabClient::new(octocrab.clone(), repo.clone())
                .with_retry(RetryConfig::DEFAULT, config.retry_policy)
        })
        .await?;

    report(&summary)
}

/// Prints the aggregate change flag, and records it for the calling workflow
/// when running under GitHub Actions.
fn report(summary: &RunSummary) -> anyhow::Result<()> {
    for failure in summary.failures() {
        tracing::warn!(
            repo = %failure.repo,
            package = %failure.package,
            error = failure.error.as_deref().unwrap_or("unknown"),
            "Package failed"
        );
    }

    let line = format!("update={}", summary.changed());
    println!("{line}");

    if let Some(path) = std::env::var_os("GITHUB_OUTPUT") {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.to_string_lossy()))?;
        writeln!(file, "{line}").context("writing GITHUB_OUTPUT")?;
    }
    Ok(())
}
