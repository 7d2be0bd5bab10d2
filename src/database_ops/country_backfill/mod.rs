//! Backfill `users.country` from `users_stats.country`.
//!
//! The id list is split into fixed-size batches ([`chunk`]), each batch is handled
//! by one worker ([`worker`]), and [`dispatch`] runs the workers on a bounded pool
//! and sums their reports after all of them have finished.
pub mod chunk;
pub mod dispatch;
pub mod worker;

pub use chunk::{chunk_slices, split_into_chunks};
pub use dispatch::{run_country_backfill, DispatchConfig, Phase, RunSummary};
pub use worker::{BatchReport, Outcome, WorkerOptions, UNKNOWN_COUNTRY};
