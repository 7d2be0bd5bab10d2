pub mod country_backfill;
pub mod db;
