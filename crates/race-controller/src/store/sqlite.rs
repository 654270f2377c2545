//! SQLite-backed race store.
//!
//! All queries use bound parameters. The schema is created on connect.

use super::{DriverRow, RaceStore, StoreError};
use async_trait::async_trait;
use common::types::{CarNumber, RaceId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Pool size for file-backed databases.
const FILE_POOL_SIZE: u32 = 4;

/// `seq` keeps registration order; `id` must not alias `rowid`.
const CREATE_RACES: &str =
    "CREATE TABLE IF NOT EXISTS races (seq INTEGER PRIMARY KEY AUTOINCREMENT, id INTEGER NOT NULL UNIQUE)";

const CREATE_DRIVERS: &str =
    "CREATE TABLE IF NOT EXISTS drivers (race_id INTEGER NOT NULL, name TEXT NOT NULL, car INTEGER NOT NULL)";

/// Store backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRaceStore {
    pool: SqlitePool,
}

impl SqliteRaceStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// In-memory URLs get a single pinned connection so every query sees
    /// the same database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the URL is invalid or the database
    /// cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(FILE_POOL_SIZE)
        };

        let pool = pool_options.connect_with(options).await?;

        sqlx::query(CREATE_RACES).execute(&pool).await?;
        sqlx::query(CREATE_DRIVERS).execute(&pool).await?;

        info!(target: "rc.store", in_memory = in_memory, "SQLite race store ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl RaceStore for SqliteRaceStore {
    #[instrument(skip_all)]
    async fn list_races(&self) -> Result<Vec<RaceId>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM races ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| RaceId(id)).collect())
    }

    #[instrument(skip_all, fields(race_id = %race_id))]
    async fn list_drivers(&self, race_id: RaceId) -> Result<Vec<DriverRow>, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, car FROM drivers WHERE race_id = ?1 ORDER BY rowid")
                .bind(race_id.0)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, car)| {
                // Off-grid values become 0 and are dropped by the roster model.
                let car = u8::try_from(car).unwrap_or_else(|_| {
                    warn!(target: "rc.store", race_id = %race_id, car = car, "Stored car out of range");
                    0
                });
                DriverRow { name, car }
            })
            .collect())
    }

    #[instrument(skip_all, fields(race_id = %id))]
    async fn insert_race(&self, id: RaceId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO races (id) VALUES (?1)")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(race_id = %race_id, car = %car))]
    async fn insert_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO drivers (race_id, name, car) VALUES (?1, ?2, ?3)")
            .bind(race_id.0)
            .bind(name)
            .bind(i64::from(car.get()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(race_id = %race_id, car = %car))]
    async fn update_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE drivers SET car = ?1 WHERE race_id = ?2 AND name = ?3")
            .bind(i64::from(car.get()))
            .bind(race_id.0)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database("driver row not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(race_id = %id))]
    async fn delete_race(&self, id: RaceId) -> Result<bool, StoreError> {
        sqlx::query("DELETE FROM drivers WHERE race_id = ?1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM races WHERE id = ?1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(race_id = %race_id))]
    async fn delete_driver(&self, race_id: RaceId, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM drivers WHERE race_id = ?1 AND name = ?2")
            .bind(race_id.0)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
