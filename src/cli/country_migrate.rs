use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::database_ops::country_backfill::dispatch::{
    run_country_backfill, DispatchConfig, Phase, RunSummary, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_WORKERS,
};
use crate::database_ops::country_backfill::worker::{WorkerOptions, UNKNOWN_COUNTRY};
use crate::database_ops::db::Db;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct CountryMigrateConfig {
    /// Optional override for the MySQL connection string.
    pub database_url: Option<String>,
    /// Batch size (defaults to env MIGRATE_CHUNK_SIZE or 1000).
    pub chunk_size: Option<usize>,
    /// Concurrent batches (defaults to env MIGRATE_MAX_WORKERS or 16).
    pub max_workers: Option<usize>,
    /// Country written for blank stats (defaults to env MIGRATE_PLACEHOLDER or XX).
    pub placeholder: Option<String>,
    /// Look up only; forced on by env MIGRATE_DRY_RUN.
    pub dry_run: bool,
}

impl CountryMigrateConfig {
    /// Resolve explicit values over env over defaults.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let chunk_size = self
            .chunk_size
            .unwrap_or_else(|| env_util::env_parse("MIGRATE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE));
        let max_workers = self
            .max_workers
            .unwrap_or_else(|| env_util::env_parse("MIGRATE_MAX_WORKERS", DEFAULT_MAX_WORKERS));
        let placeholder = self
            .placeholder
            .clone()
            .or_else(|| env_util::env_opt("MIGRATE_PLACEHOLDER"))
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());
        DispatchConfig {
            chunk_size,
            max_workers,
            worker: WorkerOptions {
                placeholder,
                dry_run: self.dry_run || env_util::env_flag("MIGRATE_DRY_RUN", false),
            },
        }
    }
}

/// One connection per concurrent batch, saturating at `u32::MAX`.
fn pool_size(max_workers: usize) -> u32 {
    u32::try_from(max_workers).unwrap_or(u32::MAX)
}

pub async fn run(cfg: CountryMigrateConfig) -> Result<RunSummary> {
    env_util::init_env();
    info!("starting country field migrator");

    let database_url = match cfg.database_url.clone() {
        Some(url) => url,
        None => env_util::db_url().context("resolving database url")?,
    };
    let dispatch = cfg.dispatch_config();
    if dispatch.worker.dry_run {
        info!("dry run: no rows will be written");
    }

    info!(
        phase = ?Phase::Connecting,
        url = %env_util::redact_dsn(&database_url),
        "connecting to database"
    );
    let db = Db::connect(&database_url, pool_size(dispatch.max_workers))
        .await
        .context("Db::connect failed")?;

    run_country_backfill(Arc::new(db), &dispatch).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win() {
        let cfg = CountryMigrateConfig {
            chunk_size: Some(250),
            max_workers: Some(4),
            placeholder: Some("ZZ".into()),
            dry_run: true,
            ..CountryMigrateConfig::default()
        };
        let d = cfg.dispatch_config();
        assert_eq!(d.chunk_size, 250);
        assert_eq!(d.max_workers, 4);
        assert_eq!(d.worker.placeholder, "ZZ");
        assert!(d.worker.dry_run);
    }

    #[test]
    fn pool_size_saturates_instead_of_truncating() {
        assert_eq!(pool_size(16), 16);
        assert_eq!(pool_size(usize::MAX), u32::MAX);
    }
}
