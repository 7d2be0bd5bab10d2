use anyhow::{Context, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::redact_dsn;

pub type UserId = i64;

/// The three statements the country backfill needs from the users database.
#[async_trait::async_trait]
pub trait CountryStore: Send + Sync {
    /// Every user id, ordered so batch assignment is stable across runs.
    async fn user_ids(&self) -> Result<Vec<UserId>>;

    /// `users_stats.country` for one user. `None` when the stats row is missing;
    /// a NULL column comes back as an empty string.
    async fn stats_country(&self, user_id: UserId) -> Result<Option<String>>;

    /// Overwrite `users.country`. Does not check that the row exists.
    async fn set_country(&self, user_id: UserId, country: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {}", redact_dsn(database_url)))?;
        info!(max_connections, "connected to db");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CountryStore for Db {
    async fn user_ids(&self) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn stats_country(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, Option<String>>(
            "SELECT country FROM users_stats WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Option::unwrap_or_default))
    }

    async fn set_country(&self, user_id: UserId, country: &str) -> Result<()> {
        sqlx::query("UPDATE users SET country = ? WHERE id = ?")
            .bind(country)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Single-connection in-memory SQLite with the users/users_stats tables.
    /// One connection only: every new in-memory connection is a fresh database.
    pub(crate) async fn sqlite_db() -> Db {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, country TEXT NOT NULL DEFAULT '')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE users_stats (id INTEGER PRIMARY KEY, country TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        Db::from_pool(pool)
    }

    pub(crate) async fn insert_user(db: &Db, id: i64, stats_country: Option<Option<&str>>) {
        sqlx::query("INSERT INTO users (id) VALUES (?)")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();
        if let Some(country) = stats_country {
            sqlx::query("INSERT INTO users_stats (id, country) VALUES (?, ?)")
                .bind(id)
                .bind(country)
                .execute(&db.pool)
                .await
                .unwrap();
        }
    }

    pub(crate) async fn user_country(db: &Db, id: i64) -> String {
        sqlx::query_scalar::<_, String>("SELECT country FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn user_ids_are_ordered() {
        let db = sqlite_db().await;
        for id in [30, 10, 20] {
            insert_user(&db, id, None).await;
        }
        assert_eq!(db.user_ids().await.unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn stats_country_distinguishes_missing_null_and_value() {
        let db = sqlite_db().await;
        insert_user(&db, 1, Some(Some("JP"))).await;
        insert_user(&db, 2, Some(None)).await;
        insert_user(&db, 3, None).await;

        assert_eq!(db.stats_country(1).await.unwrap().as_deref(), Some("JP"));
        assert_eq!(db.stats_country(2).await.unwrap().as_deref(), Some(""));
        assert_eq!(db.stats_country(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_country_overwrites_and_ignores_missing_rows() {
        let db = sqlite_db().await;
        insert_user(&db, 1, None).await;
        db.set_country(1, "DE").await.unwrap();
        assert_eq!(user_country(&db, 1).await, "DE");

        // no users row: still Ok, nothing affected
        db.set_country(99, "DE").await.unwrap();
    }

    #[tokio::test]
    async fn connect_opens_any_pool() {
        let db = Db::connect("sqlite::memory:", 2).await.unwrap();
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn missing_table_surfaces_as_error() {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = Db::from_pool(pool);
        assert!(db.user_ids().await.is_err());
    }
}
