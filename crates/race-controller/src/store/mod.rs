//! Persistence collaborator for races and drivers.
//!
//! The controller only needs create/read/delete-by-id style calls, each
//! of which either succeeds or fails with [`StoreError`]. No call spans a
//! transaction; the directory layers its own ordering on top.
//!
//! # Implementations
//!
//! - [`MemoryRaceStore`] - in-process, used by default and in tests
//! - [`SqliteRaceStore`] - `sqlx` over SQLite, selected by `RC_DATABASE_URL`

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRaceStore;
pub use sqlite::SqliteRaceStore;

use async_trait::async_trait;
use common::types::{CarNumber, RaceId};
use thiserror::Error;

/// Storage failure. Never retried by the controller.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// A persisted driver row.
///
/// `car` is the raw stored value and is not guaranteed to be on the grid;
/// the roster model re-validates rows when it rebuilds a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRow {
    pub name: String,
    pub car: u8,
}

/// Race and driver persistence.
#[async_trait]
pub trait RaceStore: Send + Sync {
    /// Every stored race id, in storage order.
    async fn list_races(&self) -> Result<Vec<RaceId>, StoreError>;

    /// Driver rows for a race, in insertion order. Unknown races yield an
    /// empty list.
    async fn list_drivers(&self, race_id: RaceId) -> Result<Vec<DriverRow>, StoreError>;

    async fn insert_race(&self, id: RaceId) -> Result<(), StoreError>;

    async fn insert_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError>;

    /// Change the car of a named driver.
    async fn update_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError>;

    /// Delete a race and its drivers. Returns `true` if the race existed.
    async fn delete_race(&self, id: RaceId) -> Result<bool, StoreError>;

    /// Delete a named driver from a race. Returns `true` if a row was removed.
    async fn delete_driver(&self, race_id: RaceId, name: &str) -> Result<bool, StoreError>;
}
