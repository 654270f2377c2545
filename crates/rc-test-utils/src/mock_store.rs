//! Fault-injecting race store.
//!
//! Wraps [`MemoryRaceStore`] and can be told to fail chosen operations or
//! to lose the claim on a race: the next `delete_race` for that id removes
//! it but reports it was already gone, as if another starter got there
//! first.
//!
//! # Example
//!
//! ```rust,ignore
//! use rc_test_utils::{MockRaceStore, StoreOp};
//!
//! let store = MockRaceStore::new().failing(StoreOp::ListRaces);
//! assert!(store.list_races().await.is_err());
//! assert_eq!(store.calls(StoreOp::ListRaces), 1);
//! ```

use async_trait::async_trait;
use common::types::{CarNumber, RaceId};
use race_controller::store::{DriverRow, MemoryRaceStore, RaceStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Store operations that can be failed or counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListRaces,
    ListDrivers,
    InsertRace,
    InsertDriver,
    UpdateDriver,
    DeleteRace,
    DeleteDriver,
}

#[derive(Debug, Default)]
struct Faults {
    failing: HashSet<StoreOp>,
    lost_claims: HashSet<RaceId>,
    calls: HashMap<StoreOp, usize>,
}

/// Mock store for directory and session tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockRaceStore {
    inner: Arc<MemoryRaceStore>,
    faults: Arc<Mutex<Faults>>,
}

impl MockRaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MockRaceStore::set_failing`].
    pub fn failing(self, op: StoreOp) -> Self {
        self.set_failing(op, true);
        self
    }

    /// Make `op` fail with `StoreError::Database` until cleared.
    pub fn set_failing(&self, op: StoreOp, failing: bool) {
        let mut faults = self.faults.lock().unwrap();
        if failing {
            faults.failing.insert(op);
        } else {
            faults.failing.remove(&op);
        }
    }

    /// Next `delete_race(id)` deletes the race but returns `false`.
    pub fn lose_claim(&self, id: RaceId) {
        self.faults.lock().unwrap().lost_claims.insert(id);
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.faults
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// As an `Arc<dyn RaceStore>` sharing this mock's state.
    pub fn shared(&self) -> Arc<dyn RaceStore> {
        Arc::new(self.clone())
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap();
        *faults.calls.entry(op).or_default() += 1;
        if faults.failing.contains(&op) {
            return Err(StoreError::Database(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn take_lost_claim(&self, id: RaceId) -> bool {
        self.faults.lock().unwrap().lost_claims.remove(&id)
    }
}

#[async_trait]
impl RaceStore for MockRaceStore {
    async fn list_races(&self) -> Result<Vec<RaceId>, StoreError> {
        self.enter(StoreOp::ListRaces)?;
        self.inner.list_races().await
    }

    async fn list_drivers(&self, race_id: RaceId) -> Result<Vec<DriverRow>, StoreError> {
        self.enter(StoreOp::ListDrivers)?;
        self.inner.list_drivers(race_id).await
    }

    async fn insert_race(&self, id: RaceId) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertRace)?;
        self.inner.insert_race(id).await
    }

    async fn insert_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertDriver)?;
        self.inner.insert_driver(race_id, name, car).await
    }

    async fn update_driver(
        &self,
        race_id: RaceId,
        name: &str,
        car: CarNumber,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::UpdateDriver)?;
        self.inner.update_driver(race_id, name, car).await
    }

    async fn delete_race(&self, id: RaceId) -> Result<bool, StoreError> {
        self.enter(StoreOp::DeleteRace)?;
        if self.take_lost_claim(id) {
            self.inner.delete_race(id).await?;
            return Ok(false);
        }
        self.inner.delete_race(id).await
    }

    async fn delete_driver(&self, race_id: RaceId, name: &str) -> Result<bool, StoreError> {
        self.enter(StoreOp::DeleteDriver)?;
        self.inner.delete_driver(race_id, name).await
    }
}
