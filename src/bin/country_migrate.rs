use anyhow::Result;
use clap::Parser;
use country_migrator::cli::country_migrate::{run, CountryMigrateConfig};
use country_migrator::tracing::{init_tracing, DEFAULT_FILTER};
use country_migrator::util::env as env_util;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "country_migrate",
    version,
    about = "Backfill users.country from users_stats.country"
)]
struct Cli {
    /// Optional override for the database URL (otherwise DATABASE_URL or SQL_* env)
    #[arg(long)]
    db_url: Option<String>,
    /// Users per batch (default: env MIGRATE_CHUNK_SIZE or 1000)
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Batches processed concurrently (default: env MIGRATE_MAX_WORKERS or 16)
    #[arg(long)]
    max_workers: Option<usize>,
    /// Country code written when the stats row has none (default: XX)
    #[arg(long)]
    placeholder: Option<String>,
    /// When set, only logs what would be written
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;
    env_util::bootstrap_cli("country_migrate");

    let summary = run(CountryMigrateConfig {
        database_url: cli.db_url,
        chunk_size: cli.chunk_size,
        max_workers: cli.max_workers,
        placeholder: cli.placeholder,
        dry_run: cli.dry_run,
    })
    .await?;

    info!(
        "Finished. Initial Users: {} // Users updated: {}",
        summary.fetched,
        summary.updated()
    );
    Ok(())
}
