//! Roster model for a single race.
//!
//! A [`Race`] partitions the fixed 8-car grid between its drivers and its
//! pool of available cars. Every operation keeps the two partitions
//! disjoint with `{1..8}` as their union; a failed operation leaves the
//! race untouched.
//!
//! # Validation order
//!
//! `add_driver` reports the first failure in this order, so inputs that
//! break several rules always yield the same code:
//!
//! 1. `CapacityExceeded` - the pool is empty
//! 2. `OutOfRange` - the supplied car is not on the grid
//! 3. `EmptyName` - the name is empty or blank
//! 4. `DuplicateName` - another driver already has the name
//! 5. `DuplicateCar` - another driver already holds the car
//!
//! No I/O happens here; persistence is the directory's job.

use common::types::{CarNumber, RaceId};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::warn;

/// A driver and the car they are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Driver {
    pub name: String,
    pub car: CarNumber,
}

/// Roster validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// Every car on the grid is taken.
    #[error("No cars available")]
    CapacityExceeded,

    /// Supplied car number is not on the grid.
    #[error("Car {0} is out of range")]
    OutOfRange(u8),

    /// Driver name is empty or whitespace.
    #[error("Driver name is empty")]
    EmptyName,

    /// Another driver in the race has the same name.
    #[error("Driver name already registered")]
    DuplicateName,

    /// Another driver in the race holds the car.
    #[error("Car {0} is already assigned")]
    DuplicateCar(CarNumber),

    /// No driver with the given name is in the race.
    #[error("Driver not found")]
    UnknownDriver,
}

impl RosterError {
    /// Stable machine-readable code for client responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            RosterError::CapacityExceeded => "capacity",
            RosterError::OutOfRange(_) => "overflow",
            RosterError::EmptyName => "empty",
            RosterError::DuplicateName => "name",
            RosterError::DuplicateCar(_) => "car",
            RosterError::UnknownDriver => "unknown",
        }
    }
}

/// Immutable roster view sent as the `race:data` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterSnapshot {
    pub id: RaceId,
    pub drivers: Vec<Driver>,
}

/// A race aggregate: ordered driver list plus the available-car pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Race {
    id: RaceId,
    drivers: Vec<Driver>,
    available_cars: BTreeSet<CarNumber>,
}

impl Race {
    /// Create an empty race with the whole grid available.
    #[must_use]
    pub fn new(id: RaceId) -> Self {
        Self {
            id,
            drivers: Vec::new(),
            available_cars: CarNumber::all().collect(),
        }
    }

    /// Rebuild a race from persisted `(name, car)` rows.
    ///
    /// Rows are replayed in order through the normal assignment rules.
    /// Rows that would break the grid partition are skipped.
    pub fn from_drivers<I>(id: RaceId, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, u8)>,
    {
        let mut race = Self::new(id);
        for (name, car) in rows {
            if let Err(e) = race.add_driver(&name, Some(car)) {
                warn!(
                    target: "rc.roster",
                    race_id = %id,
                    car = car,
                    error = %e,
                    "Skipping inconsistent driver row"
                );
            }
        }
        race
    }

    #[must_use]
    pub fn id(&self) -> RaceId {
        self.id
    }

    /// Drivers in display (insertion) order.
    #[must_use]
    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    /// Cars not assigned to any driver.
    #[must_use]
    pub fn available_cars(&self) -> &BTreeSet<CarNumber> {
        &self.available_cars
    }

    /// Add a driver, optionally with a specific car.
    ///
    /// Without a car, the highest-numbered available car is assigned.
    ///
    /// # Errors
    ///
    /// Returns the first [`RosterError`] in validation order.
    pub fn add_driver(&mut self, name: &str, car: Option<u8>) -> Result<CarNumber, RosterError> {
        let car = self.validate(name, car)?;
        self.available_cars.remove(&car);
        self.drivers.push(Driver {
            name: name.to_string(),
            car,
        });
        Ok(car)
    }

    /// Remove a driver by name, returning their car to the pool.
    ///
    /// Returns `false` if no driver has that name.
    pub fn remove_driver(&mut self, name: &str) -> bool {
        let Some(position) = self.position(name) else {
            return false;
        };
        let driver = self.drivers.remove(position);
        self.available_cars.insert(driver.car);
        true
    }

    /// Move a named driver to another car, keeping their display position.
    ///
    /// # Errors
    ///
    /// `UnknownDriver` if the name is not in the race, otherwise the same
    /// failures as [`Race::add_driver`]. The race is unchanged on error.
    pub fn update_driver(&mut self, name: &str, car: u8) -> Result<CarNumber, RosterError> {
        let position = self.position(name).ok_or(RosterError::UnknownDriver)?;
        let previous = self.drivers.remove(position);
        self.available_cars.insert(previous.car);

        match self.validate(&previous.name, Some(car)) {
            Ok(car) => {
                self.available_cars.remove(&car);
                self.drivers.insert(
                    position,
                    Driver {
                        name: previous.name,
                        car,
                    },
                );
                Ok(car)
            }
            Err(e) => {
                self.available_cars.remove(&previous.car);
                self.drivers.insert(position, previous);
                Err(e)
            }
        }
    }

    /// Copy of the current roster in display order.
    #[must_use]
    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            id: self.id,
            drivers: self.drivers.clone(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.drivers.iter().position(|d| d.name == name)
    }

    fn validate(&self, name: &str, car: Option<u8>) -> Result<CarNumber, RosterError> {
        let greatest = self
            .available_cars
            .last()
            .copied()
            .ok_or(RosterError::CapacityExceeded)?;

        let car = match car {
            None => greatest,
            Some(raw) => CarNumber::new(raw).ok_or(RosterError::OutOfRange(raw))?,
        };

        if name.trim().is_empty() {
            return Err(RosterError::EmptyName);
        }

        if self.drivers.iter().any(|d| d.name == name) {
            return Err(RosterError::DuplicateName);
        }

        if self.drivers.iter().any(|d| d.car == car) {
            return Err(RosterError::DuplicateCar(car));
        }

        Ok(car)
    }
}
