//! Session configuration.
//!
//! Poll intervals default to two seconds and can be overridden from the
//! environment.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default interval between polls of either resource (2 seconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Environment variable overriding the game poll interval.
pub const ENV_GAME_POLL_MS: &str = "DIXIT_GAME_POLL_MS";

/// Environment variable overriding the turn-phase poll interval.
pub const ENV_PHASE_POLL_MS: &str = "DIXIT_PHASE_POLL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between game polls, in milliseconds
    pub game_poll_interval_ms: u64,

    /// Interval between turn-phase polls, in milliseconds
    pub phase_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            phase_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Build from process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            game_poll_interval_ms: millis(&lookup, ENV_GAME_POLL_MS)?
                .unwrap_or(defaults.game_poll_interval_ms),
            phase_poll_interval_ms: millis(&lookup, ENV_PHASE_POLL_MS)?
                .unwrap_or(defaults.phase_poll_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject intervals a timer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "game_poll_interval_ms",
            });
        }
        if self.phase_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "phase_poll_interval_ms",
            });
        }
        Ok(())
    }

    pub fn game_poll_interval(&self) -> Duration {
        Duration::from_millis(self.game_poll_interval_ms)
    }

    pub fn phase_poll_interval(&self) -> Duration {
        Duration::from_millis(self.phase_poll_interval_ms)
    }
}

fn millis<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidVar {
                var,
                message: format!("'{raw}' is not a millisecond count ({e})"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.game_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.phase_poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_GAME_POLL_MS, "5000"),
            (ENV_PHASE_POLL_MS, " 750 "),
        ]))
        .unwrap();
        assert_eq!(config.game_poll_interval_ms, 5_000);
        assert_eq!(config.phase_poll_interval_ms, 750);
    }

    #[test]
    fn test_invalid_values() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_GAME_POLL_MS, "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                var: ENV_GAME_POLL_MS,
                ..
            }
        ));

        let err = SessionConfig::from_lookup(lookup(&[(ENV_PHASE_POLL_MS, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroInterval {
                field: "phase_poll_interval_ms"
            }
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"phase_poll_interval_ms": 1000}"#).unwrap();
        assert_eq!(config.game_poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.phase_poll_interval_ms, 1_000);
    }
}
