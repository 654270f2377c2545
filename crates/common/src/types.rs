//! Common data types for Paddock components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Externally assigned race identifier.
///
/// Ordering is numeric; the smallest pending id is the next race to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaceId(pub i64);

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RaceId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A car number on the fixed 8-car grid.
///
/// Only values in `1..=8` can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CarNumber(u8);

impl CarNumber {
    /// Lowest car number on the grid.
    pub const MIN: u8 = 1;
    /// Highest car number on the grid.
    pub const MAX: u8 = 8;

    /// Returns the car number if `value` lies on the grid.
    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Every car on the grid, lowest first.
    pub fn all() -> impl DoubleEndedIterator<Item = CarNumber> {
        (Self::MIN..=Self::MAX).map(CarNumber)
    }

    /// The raw car number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for CarNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for CarNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        CarNumber::new(raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "car number {raw} is outside {}..={}",
                CarNumber::MIN,
                CarNumber::MAX
            ))
        })
    }
}

/// A station role that can be granted to a session or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Registers races and drivers.
    FrontDesk,
    /// Starts and finishes races and changes flags.
    RaceControl,
    /// Records laps at the finish line.
    LapLineTracker,
}

impl Role {
    /// Every role, in a stable order.
    pub const ALL: [Role; 3] = [Role::FrontDesk, Role::RaceControl, Role::LapLineTracker];

    /// The role identifier used in URLs and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::FrontDesk => "front-desk",
            Role::RaceControl => "race-control",
            Role::LapLineTracker => "lap-line-tracker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
