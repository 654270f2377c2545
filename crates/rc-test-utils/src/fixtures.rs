//! Test fixtures: races, configuration and a ready-made session actor.

use common::secret::SecretString;
use common::types::{CarNumber, RaceId};
use race_controller::actors::{RaceSessionActor, RaceSessionHandle, SessionSettings};
use race_controller::config::Config;
use race_controller::directory::RaceDirectory;
use race_controller::hub::AccessCodes;
use race_controller::store::RaceStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const FRONT_DESK_CODE: &str = "fd-test-code";
pub const RACE_CONTROL_CODE: &str = "rc-test-code";
pub const LAP_LINE_TRACKER_CODE: &str = "llt-test-code";

/// Countdown length used by test sessions.
pub const TEST_RACE_DURATION_SECS: u64 = 3;

/// A race to seed into a store.
#[derive(Debug, Clone)]
pub struct TestRace {
    id: RaceId,
    drivers: Vec<(String, u8)>,
}

impl TestRace {
    pub fn new(id: i64) -> Self {
        Self {
            id: RaceId(id),
            drivers: Vec::new(),
        }
    }

    pub fn id(&self) -> RaceId {
        self.id
    }

    pub fn driver(mut self, name: &str, car: u8) -> Self {
        self.drivers.push((name.to_string(), car));
        self
    }

    /// Write the race and its drivers straight to the store.
    pub async fn seed(&self, store: &dyn RaceStore) {
        store.insert_race(self.id).await.unwrap();
        for (name, car) in &self.drivers {
            let car = CarNumber::new(*car).expect("fixture car must be on the grid");
            store.insert_driver(self.id, name, car).await.unwrap();
        }
    }
}

pub fn test_access_codes() -> AccessCodes {
    AccessCodes::new(
        SecretString::from(FRONT_DESK_CODE),
        SecretString::from(RACE_CONTROL_CODE),
        SecretString::from(LAP_LINE_TRACKER_CODE),
    )
}

pub fn test_settings(dev_mode: bool) -> SessionSettings {
    SessionSettings {
        access_codes: test_access_codes(),
        dev_mode,
        race_duration_secs: TEST_RACE_DURATION_SECS,
    }
}

/// Environment for `Config::from_vars` with the test access codes.
pub fn test_config_vars() -> HashMap<String, String> {
    HashMap::from([
        ("FRONT_DESK_KEY".to_string(), FRONT_DESK_CODE.to_string()),
        ("RACE_CONTROL_KEY".to_string(), RACE_CONTROL_CODE.to_string()),
        (
            "LAP_LINE_TRACKER_KEY".to_string(),
            LAP_LINE_TRACKER_CODE.to_string(),
        ),
        (
            "RC_RACE_DURATION_SECONDS".to_string(),
            TEST_RACE_DURATION_SECS.to_string(),
        ),
        ("RC_LOGIN_FAILURE_DELAY_MS".to_string(), "20".to_string()),
    ])
}

pub fn test_config() -> Config {
    Config::from_vars(&test_config_vars()).expect("test config should load")
}

/// Spawn a session actor over `store` with the test settings.
pub fn spawn_test_session(
    store: Arc<dyn RaceStore>,
    dev_mode: bool,
) -> (RaceSessionHandle, JoinHandle<()>) {
    RaceSessionActor::spawn(
        RaceDirectory::new(store),
        test_settings(dev_mode),
        CancellationToken::new(),
    )
}
