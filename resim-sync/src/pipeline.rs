//! Sync pipeline entry points used by the CLI.
//!
//! `run` chains the four stages: load config, fetch state, plan, apply.
//! The config is loaded before any backend call, so an invalid file never
//! reaches the network.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use resim_api::ExperienceApi;
use resim_core::{config, SyncConfig};

use crate::apply::{ApplyReport, Applier};
use crate::clone::clone_config;
use crate::error::SyncError;
use crate::plan::{compute_plan, PlanSummary};
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::progress::ProgressSink;
use crate::state::fetch_state;

/// Knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    pub cancel: CancellationToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cancel: CancellationToken::new(),
        }
    }
}

impl SyncOptions {
    fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.workers, self.cancel.clone())
    }
}

/// What a successful sync did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub summary: PlanSummary,
    pub apply: ApplyReport,
}

/// Load the config at `config_path` and reconcile the backend with it.
pub async fn run(
    api: &dyn ExperienceApi,
    config_path: &Path,
    options: &SyncOptions,
    progress: &dyn ProgressSink,
) -> Result<SyncReport, SyncError> {
    let config = load_config(config_path.to_path_buf()).await?;
    sync_config(api, &config, options, progress).await
}

/// Reconcile the backend with an already-loaded config.
pub async fn sync_config(
    api: &dyn ExperienceApi,
    config: &SyncConfig,
    options: &SyncOptions,
    progress: &dyn ProgressSink,
) -> Result<SyncReport, SyncError> {
    let pool = options.pool();

    let state = fetch_state(api, &pool, progress).await?;
    tracing::info!(
        experiences = state.experiences_by_name.len(),
        tags = state.tag_sets_by_name.len(),
        systems = state.system_sets_by_name.len(),
        "fetched current state",
    );

    let mut plan = compute_plan(config, &state)?;
    let summary = plan.summary();
    tracing::info!(
        creates = summary.creates,
        updates = summary.updates,
        restores = summary.restores,
        archives = summary.archives,
        "computed plan",
    );
    progress.plan_ready(&summary);

    let apply = Applier::new(api, &pool, progress).apply(&mut plan).await?;
    Ok(SyncReport { summary, apply })
}

/// Fetch the current state and write a config reproducing it to
/// `config_path`. Performs no mutations.
pub async fn clone(
    api: &dyn ExperienceApi,
    config_path: &Path,
    options: &SyncOptions,
    progress: &dyn ProgressSink,
) -> Result<SyncConfig, SyncError> {
    let pool = options.pool();
    let state = fetch_state(api, &pool, progress).await?;
    let cloned = clone_config(&state);

    let path = config_path.to_path_buf();
    let to_write = cloned.clone();
    tokio::task::spawn_blocking(move || config::save_at(&path, &to_write))
        .await
        .map_err(|e| SyncError::Join(e.to_string()))??;
    tracing::info!(
        path = %config_path.display(),
        experiences = cloned.experiences.len(),
        "wrote cloned config",
    );
    Ok(cloned)
}

/// Load and validate the config on the blocking pool.
pub async fn load_config(path: PathBuf) -> Result<SyncConfig, SyncError> {
    let config = tokio::task::spawn_blocking(move || config::load_at(&path))
        .await
        .map_err(|e| SyncError::Join(e.to_string()))??;
    Ok(config)
}
