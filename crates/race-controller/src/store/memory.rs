//! In-memory race store.

use super::{DriverRow, RaceStore, StoreError};
use async_trait::async_trait;
use common::types::{CarNumber, RaceId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    /// Race ids in registration order.
    races: Vec<RaceId>,
    drivers: HashMap<RaceId, Vec<DriverRow>>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryRaceStore {
    inner: RwLock<Inner>,
}

impl MemoryRaceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RaceStore for MemoryRaceStore {
    async fn list_races(&self) -> Result<Vec<RaceId>, StoreError> {
        Ok(self.inner.read().await.races.clone())
    }

    async fn list_drivers(&self, race_id: RaceId) -> Result<Vec<DriverRow>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .drivers
            .get(&race_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_race(&self, id: RaceId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.races.contains(&id) {
            return Err(StoreError::Database(format!("race {id} already stored")));
        }
        inner.races.push(id);
        Ok(())
    }

    async fn insert_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .drivers
            .entry(race_id)
            .or_default()
            .push(DriverRow {
                name: name.to_string(),
                car: car.get(),
            });
        Ok(())
    }

    async fn update_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let row = inner
            .drivers
            .get_mut(&race_id)
            .and_then(|rows| rows.iter_mut().find(|row| row.name == name))
            .ok_or_else(|| StoreError::Database("driver row not found".to_string()))?;
        row.car = car.get();
        Ok(())
    }

    async fn delete_race(&self, id: RaceId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drivers.remove(&id);
        let before = inner.races.len();
        inner.races.retain(|race| *race != id);
        Ok(inner.races.len() != before)
    }

    async fn delete_driver(&self, race_id: RaceId, name: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(rows) = inner.drivers.get_mut(&race_id) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| row.name != name);
        Ok(rows.len() != before)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn car(n: u8) -> CarNumber {
        CarNumber::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_races_listed_in_insertion_order() {
        let store = MemoryRaceStore::new();
        store.insert_race(RaceId(5)).await.unwrap();
        store.insert_race(RaceId(2)).await.unwrap();
        store.insert_race(RaceId(9)).await.unwrap();

        assert_eq!(
            store.list_races().await.unwrap(),
            vec![RaceId(5), RaceId(2), RaceId(9)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_race_rejected() {
        let store = MemoryRaceStore::new();
        store.insert_race(RaceId(1)).await.unwrap();
        assert!(store.insert_race(RaceId(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_race_removes_drivers() {
        let store = MemoryRaceStore::new();
        store.insert_race(RaceId(1)).await.unwrap();
        store.insert_driver(RaceId(1), "Alice", car(3)).await.unwrap();

        assert!(store.delete_race(RaceId(1)).await.unwrap());
        assert!(store.list_drivers(RaceId(1)).await.unwrap().is_empty());
        assert!(!store.delete_race(RaceId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_delete_driver() {
        let store = MemoryRaceStore::new();
        store.insert_race(RaceId(1)).await.unwrap();
        store.insert_driver(RaceId(1), "Alice", car(3)).await.unwrap();
        store.update_driver(RaceId(1), "Alice", car(6)).await.unwrap();

        assert_eq!(
            store.list_drivers(RaceId(1)).await.unwrap(),
            vec![DriverRow {
                name: "Alice".to_string(),
                car: 6
            }]
        );
        assert!(store.update_driver(RaceId(1), "Bob", car(2)).await.is_err());

        assert!(store.delete_driver(RaceId(1), "Alice").await.unwrap());
        assert!(!store.delete_driver(RaceId(1), "Alice").await.unwrap());
        assert!(!store.delete_driver(RaceId(4), "Alice").await.unwrap());
    }
}
