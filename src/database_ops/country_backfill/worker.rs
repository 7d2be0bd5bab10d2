use tracing::{info, warn};

use crate::database_ops::db::{CountryStore, UserId};

/// Country written when `users_stats.country` is NULL or blank.
pub const UNKNOWN_COUNTRY: &str = "XX";

/// What happened to one user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated { country: String, placeholder: bool },
    /// Dry run: the value that would have been written.
    Planned { country: String, placeholder: bool },
    LookupFailed,
    WriteFailed,
}

/// Per-batch tallies, summed by the dispatcher after the barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub updated: usize,
    pub planned: usize,
    /// Updated or planned with the placeholder country.
    pub placeholder: usize,
    pub lookup_failed: usize,
    pub write_failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Updated { placeholder, .. } => {
                self.updated += 1;
                self.placeholder += usize::from(*placeholder);
            }
            Outcome::Planned { placeholder, .. } => {
                self.planned += 1;
                self.placeholder += usize::from(*placeholder);
            }
            Outcome::LookupFailed => self.lookup_failed += 1,
            Outcome::WriteFailed => self.write_failed += 1,
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.planned += other.planned;
        self.placeholder += other.placeholder;
        self.lookup_failed += other.lookup_failed;
        self.write_failed += other.write_failed;
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub placeholder: String,
    pub dry_run: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            placeholder: UNKNOWN_COUNTRY.to_string(),
            dry_run: false,
        }
    }
}

/// Blank or whitespace-only codes become the placeholder; anything else is kept
/// as stored. Returns the value and whether the placeholder was used.
pub fn normalize_country(raw: &str, placeholder: &str) -> (String, bool) {
    if raw.trim().is_empty() {
        (placeholder.to_string(), true)
    } else {
        (raw.to_string(), false)
    }
}

/// Look up, normalize and write one user's country. Never fails: every error
/// becomes an [`Outcome`].
pub async fn migrate_user<S>(
    store: &S,
    worker: usize,
    user_id: UserId,
    opts: &WorkerOptions,
) -> Outcome
where
    S: CountryStore + ?Sized,
{
    let raw = match store.stats_country(user_id).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            warn!(worker, user_id, "no users_stats row; skipping");
            return Outcome::LookupFailed;
        }
        Err(e) => {
            warn!(worker, user_id, error = %e, "country lookup failed; skipping");
            return Outcome::LookupFailed;
        }
    };
    let (country, placeholder) = normalize_country(&raw, &opts.placeholder);

    if opts.dry_run {
        info!(worker, user_id, country = %country, placeholder, "would update user");
        return Outcome::Planned {
            country,
            placeholder,
        };
    }

    if let Err(e) = store.set_country(user_id, &country).await {
        warn!(worker, user_id, country = %country, error = %e, "country write failed");
        return Outcome::WriteFailed;
    }
    info!(worker, user_id, country = %country, "updated user");
    Outcome::Updated {
        country,
        placeholder,
    }
}

/// Run one batch sequentially. Failures on one id never stop the rest of the batch.
pub async fn run_batch<S>(
    store: &S,
    worker: usize,
    user_ids: &[UserId],
    opts: &WorkerOptions,
) -> BatchReport
where
    S: CountryStore + ?Sized,
{
    info!(worker, batch_len = user_ids.len(), "starting job");
    let mut report = BatchReport::default();
    for &user_id in user_ids {
        let outcome = migrate_user(store, worker, user_id, opts).await;
        report.record(&outcome);
    }
    info!(
        worker,
        updated = report.updated,
        planned = report.planned,
        lookup_failed = report.lookup_failed,
        write_failed = report.write_failed,
        "job finished"
    );
    report
}
