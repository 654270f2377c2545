//! Race Directory - pending races backed by a [`RaceStore`].
//!
//! The directory owns every race until it is claimed to start. Roster
//! mutations load the aggregate, apply the roster rule, then write the
//! delta through the store.
//!
//! The directory holds no in-process state of its own; callers serialize
//! access by routing every call through the session actor.

use crate::errors::RcError;
use crate::roster::{Driver, Race, RosterSnapshot};
use crate::store::RaceStore;
use common::types::{CarNumber, RaceId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Lookup and mutation of pending races.
#[derive(Clone)]
pub struct RaceDirectory {
    store: Arc<dyn RaceStore>,
}

impl RaceDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn RaceStore>) -> Self {
        Self { store }
    }

    /// Pending race ids in storage order.
    ///
    /// # Errors
    ///
    /// `RcError::Storage` if the store call fails.
    pub async fn list_pending(&self) -> Result<Vec<RaceId>, RcError> {
        Ok(self.store.list_races().await?)
    }

    /// The smallest pending race id, if any.
    ///
    /// # Errors
    ///
    /// `RcError::Storage` if the store call fails.
    pub async fn next_pending_id(&self) -> Result<Option<RaceId>, RcError> {
        Ok(self.list_pending().await?.into_iter().min())
    }

    /// Roster view of a race with duplicate cars collapsed to the first
    /// occurrence. Rows with an off-grid car are left out.
    ///
    /// # Errors
    ///
    /// `RcError::Storage` if the store call fails.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn snapshot(&self, id: RaceId) -> Result<RosterSnapshot, RcError> {
        let rows = self.store.list_drivers(id).await?;

        let mut seen = BTreeSet::new();
        let mut drivers = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(car) = CarNumber::new(row.car) else {
                warn!(target: "rc.directory", race_id = %id, car = row.car, "Dropping off-grid car from snapshot");
                continue;
            };
            if seen.insert(car) {
                drivers.push(Driver {
                    name: row.name,
                    car,
                });
            } else {
                warn!(target: "rc.directory", race_id = %id, car = %car, "Dropping duplicate car from snapshot");
            }
        }

        Ok(RosterSnapshot { id, drivers })
    }

    /// Delete a race and its drivers.
    ///
    /// Returns `true` if this call removed the race. Removing an id that is
    /// not pending is not an error.
    ///
    /// # Errors
    ///
    /// `RcError::Storage` if the store call fails.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn remove(&self, id: RaceId) -> Result<bool, RcError> {
        let removed = self.store.delete_race(id).await?;
        debug!(target: "rc.directory", race_id = %id, removed = removed, "Race removed");
        Ok(removed)
    }

    /// Register a new, empty race.
    ///
    /// # Errors
    ///
    /// `RcError::RaceExists` if the id is already pending.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn register(&self, id: RaceId) -> Result<(), RcError> {
        if self.is_pending(id).await? {
            return Err(RcError::RaceExists(id));
        }
        self.store.insert_race(id).await?;
        info!(target: "rc.directory", race_id = %id, "Race registered");
        Ok(())
    }

    /// Rebuild the roster aggregate of a pending race.
    ///
    /// # Errors
    ///
    /// `RcError::RaceNotFound` if the id is not pending.
    pub async fn load(&self, id: RaceId) -> Result<Race, RcError> {
        if !self.is_pending(id).await? {
            return Err(RcError::RaceNotFound(id));
        }
        let rows = self.store.list_drivers(id).await?;
        Ok(Race::from_drivers(
            id,
            rows.into_iter().map(|row| (row.name, row.car)),
        ))
    }

    /// Add a driver to a pending race. Returns the assigned car.
    ///
    /// # Errors
    ///
    /// `RcError::RaceNotFound`, roster validation failures as
    /// `RcError::Validation`, or `RcError::Storage`.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn add_driver(
        &self,
        id: RaceId,
        name: &str,
        car: Option<u8>,
    ) -> Result<CarNumber, RcError> {
        let mut race = self.load(id).await?;
        let car = race.add_driver(name, car)?;
        self.store.insert_driver(id, name, car).await?;
        debug!(target: "rc.directory", race_id = %id, car = %car, "Driver added");
        Ok(car)
    }

    /// Reassign a driver's car.
    ///
    /// # Errors
    ///
    /// As [`RaceDirectory::add_driver`], plus `UnknownDriver` validation.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn update_driver(
        &self,
        id: RaceId,
        name: &str,
        car: u8,
    ) -> Result<CarNumber, RcError> {
        let mut race = self.load(id).await?;
        let car = race.update_driver(name, car)?;
        self.store.update_driver(id, name, car).await?;
        debug!(target: "rc.directory", race_id = %id, car = %car, "Driver updated");
        Ok(car)
    }

    /// Remove a driver by name. Returns `false` if no such driver.
    ///
    /// # Errors
    ///
    /// `RcError::RaceNotFound` or `RcError::Storage`.
    #[instrument(skip_all, fields(race_id = %id))]
    pub async fn remove_driver(&self, id: RaceId, name: &str) -> Result<bool, RcError> {
        let mut race = self.load(id).await?;
        if !race.remove_driver(name) {
            return Ok(false);
        }
        Ok(self.store.delete_driver(id, name).await?)
    }

    async fn is_pending(&self, id: RaceId) -> Result<bool, RcError> {
        Ok(self.store.list_races().await?.contains(&id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::roster::RosterError;
    use crate::store::MemoryRaceStore;

    fn directory() -> (RaceDirectory, Arc<MemoryRaceStore>) {
        let store = Arc::new(MemoryRaceStore::new());
        (RaceDirectory::new(store.clone()), store)
    }

    fn car(n: u8) -> CarNumber {
        CarNumber::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_next_pending_is_minimum_id() {
        let (dir, _) = directory();
        assert_eq!(dir.next_pending_id().await.unwrap(), None);

        for id in [7, 2, 9] {
            dir.register(RaceId(id)).await.unwrap();
        }

        assert_eq!(
            dir.list_pending().await.unwrap(),
            vec![RaceId(7), RaceId(2), RaceId(9)]
        );
        assert_eq!(dir.next_pending_id().await.unwrap(), Some(RaceId(2)));
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let (dir, _) = directory();
        dir.register(RaceId(1)).await.unwrap();
        assert!(matches!(
            dir.register(RaceId(1)).await,
            Err(RcError::RaceExists(RaceId(1)))
        ));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (dir, _) = directory();
        dir.register(RaceId(1)).await.unwrap();

        assert!(dir.remove(RaceId(1)).await.unwrap());
        assert!(!dir.remove(RaceId(1)).await.unwrap());
        assert!(dir.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_collapses_duplicate_cars() {
        let (dir, store) = directory();
        store.insert_race(RaceId(1)).await.unwrap();
        store.insert_driver(RaceId(1), "Alice", car(3)).await.unwrap();
        store.insert_driver(RaceId(1), "Bob", car(3)).await.unwrap();
        store.insert_driver(RaceId(1), "Cara", car(5)).await.unwrap();

        let snapshot = dir.snapshot(RaceId(1)).await.unwrap();
        let names: Vec<&str> = snapshot.drivers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Cara"]);
    }

    #[tokio::test]
    async fn test_add_driver_persists_and_validates() {
        let (dir, _) = directory();
        dir.register(RaceId(1)).await.unwrap();

        assert_eq!(dir.add_driver(RaceId(1), "Alice", Some(4)).await.unwrap(), car(4));
        assert_eq!(dir.add_driver(RaceId(1), "Bob", None).await.unwrap(), car(8));

        let err = dir.add_driver(RaceId(1), "Alice", Some(4)).await.unwrap_err();
        assert!(matches!(err, RcError::Validation(RosterError::DuplicateName)));

        let snapshot = dir.snapshot(RaceId(1)).await.unwrap();
        assert_eq!(snapshot.drivers.len(), 2);
        assert_eq!(snapshot.drivers.iter().filter(|d| d.name == "Alice").count(), 1);
    }

    #[tokio::test]
    async fn test_roster_ops_on_unknown_race() {
        let (dir, _) = directory();
        assert!(matches!(
            dir.add_driver(RaceId(5), "Alice", None).await,
            Err(RcError::RaceNotFound(RaceId(5)))
        ));
        assert!(matches!(
            dir.remove_driver(RaceId(5), "Alice").await,
            Err(RcError::RaceNotFound(RaceId(5)))
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove_driver() {
        let (dir, _) = directory();
        dir.register(RaceId(1)).await.unwrap();
        dir.add_driver(RaceId(1), "Alice", Some(1)).await.unwrap();
        dir.add_driver(RaceId(1), "Bob", Some(2)).await.unwrap();

        assert_eq!(dir.update_driver(RaceId(1), "Alice", 6).await.unwrap(), car(6));
        assert!(matches!(
            dir.update_driver(RaceId(1), "Alice", 2).await,
            Err(RcError::Validation(RosterError::DuplicateCar(_)))
        ));

        assert!(dir.remove_driver(RaceId(1), "Bob").await.unwrap());
        assert!(!dir.remove_driver(RaceId(1), "Bob").await.unwrap());

        let race = dir.load(RaceId(1)).await.unwrap();
        assert_eq!(race.drivers().len(), 1);
        assert_eq!(race.drivers().first().map(|d| d.car), Some(car(6)));
        assert!(race.available_cars().contains(&car(2)));
    }
}
