//! `resim experiences sync`: reconcile a project with an experience config,
//! or clone a project into one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use resim_api::Connection;
use resim_core::settings::{self, Settings};
use resim_sync::pipeline::{self, SyncOptions};
use resim_sync::{ProgressSink, Quiet};

use super::progress::{print_report, TerminalProgress};

#[derive(Subcommand, Debug)]
pub enum ExperiencesCommand {
    /// Make the project's experiences, tags, systems and managed test
    /// suites match a YAML config.
    Sync(SyncArgs),
}

pub fn run(cmd: ExperiencesCommand) -> Result<()> {
    match cmd {
        ExperiencesCommand::Sync(args) => {
            crate::init_tracing(args.verbose);
            args.run()
        }
    }
}

/// Arguments for `resim experiences sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Project name or id. Defaults to RESIM_PROJECT or the settings file.
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Path to the experience config YAML.
    #[arg(long = "experience-config", value_name = "FILE")]
    pub experience_config: PathBuf,

    /// Write the project's current experiences to the config path instead
    /// of syncing. Performs no mutations.
    #[arg(long)]
    pub clone: bool,

    /// Show the plan and per-phase progress.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Concurrent API calls per phase.
    #[arg(long)]
    pub workers: Option<usize>,

    /// API base URL. Overrides RESIM_API_URL and the settings file.
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token. Overrides RESIM_TOKEN and the settings file.
    #[arg(long)]
    pub token: Option<String>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let settings = settings::load_at(&home).context("failed to load ~/.resim/config.yaml")?;
        let settings = self.override_settings(settings);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime.block_on(self.run_async(settings))
    }

    fn override_settings(&self, mut settings: Settings) -> Settings {
        if let Some(url) = &self.url {
            settings.api_url = url.clone();
        }
        if let Some(token) = &self.token {
            settings.token = Some(token.clone());
        }
        if let Some(project) = &self.project {
            settings.default_project = Some(project.clone());
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        settings
    }

    async fn run_async(self, settings: Settings) -> Result<()> {
        let cancel = CancellationToken::new();
        spawn_ctrl_c_handler(cancel.clone());
        let options = SyncOptions {
            workers: settings.workers,
            cancel,
        };
        let progress: &dyn ProgressSink = if self.verbose { &TerminalProgress } else { &Quiet };

        // An invalid config must fail before any network traffic.
        let config = if self.clone {
            None
        } else {
            let config = pipeline::load_config(self.experience_config.clone())
                .await
                .with_context(|| {
                    format!("invalid experience config {}", self.experience_config.display())
                })?;
            Some(config)
        };

        let project = settings
            .default_project
            .clone()
            .context("no project given; pass --project or set RESIM_PROJECT")?;
        let connection = Connection::new(&settings.api_url, settings.token.as_deref())
            .context("failed to configure API client")?;
        let project_id = connection
            .resolve_project(&project)
            .await
            .with_context(|| format!("failed to resolve project '{project}'"))?;
        let client = connection.for_project(project_id);
        tracing::info!(%project, %project_id, "resolved project");

        match config {
            None => {
                let cloned = pipeline::clone(&client, &self.experience_config, &options, progress)
                    .await
                    .with_context(|| format!("clone of project '{project}' failed"))?;
                println!(
                    "✓ wrote {} experience(s) from '{project}' to {}",
                    cloned.experiences.len(),
                    self.experience_config.display()
                );
            }
            Some(config) => {
                let report = pipeline::sync_config(&client, &config, &options, progress)
                    .await
                    .with_context(|| format!("sync of project '{project}' failed"))?;
                print_report(&project, &report.summary, &report.apply, self.verbose);
            }
        }
        Ok(())
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::warn!("received ctrl-c, cancelling sync");
                    cancel.cancel();
                }
                Err(err) => tracing::error!(%err, "ctrl-c handler failed"),
            },
        }
    });
}
