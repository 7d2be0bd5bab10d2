use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use super::chunk::split_into_chunks;
use super::worker::{run_batch, BatchReport, WorkerOptions};
use crate::database_ops::db::CountryStore;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_WORKERS: usize = 16;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub chunk_size: usize,
    /// Upper bound on batches running at the same time.
    pub max_workers: usize,
    pub worker: WorkerOptions,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            worker: WorkerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Fetching,
    Dispatching,
    Waiting,
    Reporting,
}

impl Phase {
    /// Phases in the order a run passes through them.
    pub const ORDER: [Phase; 5] = [
        Phase::Connecting,
        Phase::Fetching,
        Phase::Dispatching,
        Phase::Waiting,
        Phase::Reporting,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub batches: usize,
    /// Batches whose task panicked; their ids are missing from `totals`.
    pub failed_batches: usize,
    pub totals: BatchReport,
}

impl RunSummary {
    pub fn updated(&self) -> usize {
        self.totals.updated
    }
}

/// Fetch every user id, split into batches and run one worker per batch, at most
/// `max_workers` at a time. Returns once every batch has finished.
///
/// Only the initial id fetch (and an invalid chunk size) is fatal.
pub async fn run_country_backfill<S>(store: Arc<S>, cfg: &DispatchConfig) -> Result<RunSummary>
where
    S: CountryStore + 'static,
{
    info!(phase = ?Phase::Fetching, "fetching user ids");
    let user_ids = store.user_ids().await.context("fetching user ids")?;
    let fetched = user_ids.len();
    info!(fetched, "user ids fetched");

    let batches = split_into_chunks(&user_ids, cfg.chunk_size)?;
    let batch_count = batches.len();
    info!(
        phase = ?Phase::Dispatching,
        batches = batch_count,
        chunk_size = cfg.chunk_size,
        max_workers = cfg.max_workers,
        "dispatching batches"
    );

    let sem = Arc::new(Semaphore::new(cfg.max_workers.max(1)));
    let mut tasks = Vec::with_capacity(batch_count);
    for (index, batch) in batches.into_iter().enumerate() {
        let worker = index + 1;
        let store = store.clone();
        let sem = sem.clone();
        let opts = cfg.worker.clone();
        tasks.push(tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = sem.acquire_owned().await.ok();
            run_batch(store.as_ref(), worker, &batch, &opts).await
        }));
    }

    info!(phase = ?Phase::Waiting, "waiting for workers");
    let results = join_all(tasks).await;

    let mut summary = RunSummary {
        fetched,
        batches: batch_count,
        ..RunSummary::default()
    };
    for (index, res) in results.into_iter().enumerate() {
        match res {
            Ok(report) => summary.totals.merge(&report),
            Err(join_err) => {
                error!(worker = index + 1, error = %join_err, "worker task failed");
                summary.failed_batches += 1;
            }
        }
    }

    info!(
        phase = ?Phase::Reporting,
        initial_users = summary.fetched,
        users_updated = summary.totals.updated,
        planned = summary.totals.planned,
        placeholder = summary.totals.placeholder,
        lookup_failed = summary.totals.lookup_failed,
        write_failed = summary.totals.write_failed,
        failed_batches = summary.failed_batches,
        "finished"
    );
    Ok(summary)
}
