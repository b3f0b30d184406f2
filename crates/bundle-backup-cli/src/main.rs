mod commands;
mod config;
mod coordinator;
mod providers;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bundle_backup::{BackupContext, BackupLayout, BackupOptions, Git};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "bundle-backup")]
#[command(about = "Back up git repositories from hosting providers as bundle files")]
struct Cli {
    /// Config file (defaults to ~/.config/bundle-backup/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Back up every repository of every enabled provider
    Run {
        /// Repeat the backup on this interval instead of exiting
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        every_minutes: Option<u64>,
    },
    /// List the repositories each provider would back up
    List,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_context(config: &AppConfig) -> Result<BackupContext> {
    let layout = BackupLayout::new(&config.backup_root).with_context(|| {
        format!(
            "invalid backup root: {}",
            config.backup_root.display()
        )
    })?;

    let options = BackupOptions {
        diff_mode: config.diff_mode,
        retention: config.retention,
    };
    let git = Git::new(&config.git_binary).with_timeout(config.git_timeout());

    Ok(BackupContext::new(layout, options).with_git(git))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = config::load_config(cli.config.as_deref())?;
    let providers = providers::build_providers(
        &config.providers,
        &config.http.to_options(),
        |name| std::env::var(name).ok(),
    )?;

    if providers.is_empty() {
        anyhow::bail!("no enabled providers configured");
    }

    match cli.command {
        Command::Run { every_minutes } => {
            let ctx = build_context(&config)?;
            tokio::fs::create_dir_all(ctx.layout.root())
                .await
                .with_context(|| {
                    format!(
                        "failed to create backup root: {}",
                        ctx.layout.root().display()
                    )
                })?;

            tracing::info!(
                root = %ctx.layout.root().display(),
                diff_mode = ?ctx.options.diff_mode,
                retention = ctx.options.retention,
                providers = providers.len(),
                "starting backup"
            );

            let every = every_minutes.map(|m| Duration::from_secs(m * 60));
            commands::run::run(&ctx, &providers, every).await
        }
        Command::List => commands::list::run(&providers).await,
    }
}
