//! Race Controller configuration.
//!
//! Configuration is loaded from environment variables. Access codes are
//! redacted in Debug output.

use crate::hub::AccessCodes;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default HTTP + WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default production race length in seconds.
pub const DEFAULT_RACE_DURATION_SECONDS: u64 = 600;

/// Default dev-mode race length in seconds.
pub const DEFAULT_DEV_RACE_DURATION_SECONDS: u64 = 60;

/// Default directory holding the role view pages.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Default delay before answering a failed login.
pub const DEFAULT_LOGIN_FAILURE_DELAY_MS: u64 = 500;

/// Access code used for unset keys in dev mode.
pub const DEV_DEFAULT_ACCESS_CODE: &str = "default-key";

/// Environment variables holding the role access codes.
pub const ACCESS_KEY_VARS: [&str; 3] = ["FRONT_DESK_KEY", "RACE_CONTROL_KEY", "LAP_LINE_TRACKER_KEY"];

/// Race Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Access codes for the three station roles.
    pub access_codes: AccessCodes,

    /// Disables role checks and selects the dev race duration.
    pub dev_mode: bool,

    /// HTTP + WebSocket bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Production race length (default: 600).
    pub race_duration_seconds: u64,

    /// Dev-mode race length (default: 60).
    pub dev_race_duration_seconds: u64,

    /// SQLite URL. Unset selects the in-memory store.
    pub database_url: Option<String>,

    /// Directory of `{role}.html` and `login.html` pages.
    pub static_dir: PathBuf,

    /// Delay before a failed login is answered.
    pub login_failure_delay: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_codes", &"[REDACTED]")
            .field("dev_mode", &self.dev_mode)
            .field("bind_address", &self.bind_address)
            .field("race_duration_seconds", &self.race_duration_seconds)
            .field("dev_race_duration_seconds", &self.dev_race_duration_seconds)
            .field("database_url", &self.database_url)
            .field("static_dir", &self.static_dir)
            .field("login_failure_delay", &self.login_failure_delay)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingEnvVar` naming every access key that is unset or
    /// still the default key outside dev mode, or `ConfigError::InvalidValue` for unparseable values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let dev_mode = parse_bool(vars, "RC_DEV_MODE")?.unwrap_or(false);

        // Empty values count as unset.
        let key = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

        // Outside dev mode the shared default key is as good as no key.
        let missing: Vec<&str> = ACCESS_KEY_VARS
            .into_iter()
            .filter(|name| {
                key(*name).map_or(true, |v| !dev_mode && v == DEV_DEFAULT_ACCESS_CODE)
            })
            .collect();

        if !missing.is_empty() {
            if dev_mode {
                for name in &missing {
                    warn!(
                        target: "rc.config",
                        variable = %name,
                        "Access key unset, using the default key (dev mode only)"
                    );
                }
            } else {
                return Err(ConfigError::MissingEnvVar(missing.join(", ")));
            }
        }

        let code = |name: &str| {
            SecretString::from(key(name).unwrap_or_else(|| DEV_DEFAULT_ACCESS_CODE.to_string()))
        };
        let access_codes = AccessCodes::new(
            code("FRONT_DESK_KEY"),
            code("RACE_CONTROL_KEY"),
            code("LAP_LINE_TRACKER_KEY"),
        );

        let bind_address = vars
            .get("RC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let race_duration_seconds = parse_u64(vars, "RC_RACE_DURATION_SECONDS")?
            .unwrap_or(DEFAULT_RACE_DURATION_SECONDS);

        let dev_race_duration_seconds = parse_u64(vars, "RC_DEV_RACE_DURATION_SECONDS")?
            .unwrap_or(DEFAULT_DEV_RACE_DURATION_SECONDS);

        let database_url = vars.get("RC_DATABASE_URL").filter(|v| !v.is_empty()).cloned();

        let static_dir = PathBuf::from(
            vars.get("RC_STATIC_DIR")
                .map_or(DEFAULT_STATIC_DIR, String::as_str),
        );

        let login_failure_delay = Duration::from_millis(
            parse_u64(vars, "RC_LOGIN_FAILURE_DELAY_MS")?.unwrap_or(DEFAULT_LOGIN_FAILURE_DELAY_MS),
        );

        Ok(Config {
            access_codes,
            dev_mode,
            bind_address,
            race_duration_seconds,
            dev_race_duration_seconds,
            database_url,
            static_dir,
            login_failure_delay,
        })
    }

    /// Countdown length for the current mode.
    #[must_use]
    pub fn race_duration(&self) -> u64 {
        if self.dev_mode {
            self.dev_race_duration_seconds
        } else {
            self.race_duration_seconds
        }
    }
}

fn parse_u64(vars: &HashMap<String, String>, name: &str) -> Result<Option<u64>, ConfigError> {
    vars.get(name)
        .map(|raw| {
            raw.parse()
                .map_err(|e| ConfigError::InvalidValue(format!("{name}={raw}: {e}")))
        })
        .transpose()
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ConfigError> {
    vars.get(name)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{name}={raw}: expected true or false"
            ))),
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::Role;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("FRONT_DESK_KEY".to_string(), "fd-secret".to_string()),
            ("RACE_CONTROL_KEY".to_string(), "rc-secret".to_string()),
            ("LAP_LINE_TRACKER_KEY".to_string(), "llt-secret".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert!(!config.dev_mode);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.race_duration_seconds, DEFAULT_RACE_DURATION_SECONDS);
        assert_eq!(config.dev_race_duration_seconds, DEFAULT_DEV_RACE_DURATION_SECONDS);
        assert_eq!(config.race_duration(), 600);
        assert_eq!(config.database_url, None);
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.login_failure_delay, Duration::from_millis(500));
        assert!(config.access_codes.verify(Role::RaceControl, "rc-secret"));
        assert!(config.access_codes.verify(Role::FrontDesk, "fd-secret"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("RC_BIND_ADDRESS".to_string(), "127.0.0.1:8080".to_string());
        vars.insert("RC_RACE_DURATION_SECONDS".to_string(), "300".to_string());
        vars.insert("RC_DATABASE_URL".to_string(), "sqlite://races.db".to_string());
        vars.insert("RC_STATIC_DIR".to_string(), "/srv/paddock".to_string());
        vars.insert("RC_LOGIN_FAILURE_DELAY_MS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.race_duration(), 300);
        assert_eq!(config.database_url.as_deref(), Some("sqlite://races.db"));
        assert_eq!(config.static_dir, PathBuf::from("/srv/paddock"));
        assert_eq!(config.login_failure_delay, Duration::ZERO);
    }

    #[test]
    fn test_missing_keys_listed_together() {
        let mut vars = base_vars();
        vars.remove("FRONT_DESK_KEY");
        vars.insert("LAP_LINE_TRACKER_KEY".to_string(), String::new());

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(v)) if v == "FRONT_DESK_KEY, LAP_LINE_TRACKER_KEY"
        ));
    }

    #[test]
    fn test_dev_mode_defaults_missing_keys() {
        let vars = HashMap::from([("RC_DEV_MODE".to_string(), "true".to_string())]);

        let config = Config::from_vars(&vars).expect("Dev config should load");
        assert!(config.dev_mode);
        assert_eq!(config.race_duration(), 60);
        for role in Role::ALL {
            assert!(config.access_codes.verify(role, DEV_DEFAULT_ACCESS_CODE));
        }
    }

    #[test]
    fn test_default_key_rejected_outside_dev_mode() {
        let mut vars = base_vars();
        vars.insert(
            "RACE_CONTROL_KEY".to_string(),
            DEV_DEFAULT_ACCESS_CODE.to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(v)) if v == "RACE_CONTROL_KEY"
        ));
    }

    #[test]
    fn test_dev_mode_accepts_explicit_default_key() {
        let mut vars = base_vars();
        vars.insert("RC_DEV_MODE".to_string(), "true".to_string());
        vars.insert(
            "RACE_CONTROL_KEY".to_string(),
            DEV_DEFAULT_ACCESS_CODE.to_string(),
        );

        let config = Config::from_vars(&vars).expect("Dev config should load");
        assert!(config.access_codes.verify(Role::RaceControl, DEV_DEFAULT_ACCESS_CODE));
        assert!(config.access_codes.verify(Role::FrontDesk, "fd-secret"));
    }

    #[test]
    fn test_dev_mode_keeps_supplied_keys() {
        let mut vars = base_vars();
        vars.insert("RC_DEV_MODE".to_string(), "1".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.access_codes.verify(Role::RaceControl, "rc-secret"));
        assert!(!config.access_codes.verify(Role::RaceControl, DEV_DEFAULT_ACCESS_CODE));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut vars = base_vars();
        vars.insert("RC_RACE_DURATION_SECONDS".to_string(), "ten".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(v)) if v.starts_with("RC_RACE_DURATION_SECONDS")
        ));

        let mut vars = base_vars();
        vars.insert("RC_DEV_MODE".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_access_codes() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("rc-secret"));
        assert!(!debug_output.contains("fd-secret"));
    }
}
