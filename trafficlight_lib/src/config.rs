//! Timing configuration for a [`PhaseController`](crate::PhaseController).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::policy::RandomCycle;

/// Cycle bounds and polling granularity.
///
/// Durations are written as humantime strings when (de)serialized:
///
/// ```
/// use trafficlight_lib::ControllerConfig;
///
/// let config = ControllerConfig::from_json_str(r#"{ "min_cycle": "40ms", "max_cycle": "60ms" }"#).unwrap();
/// assert_eq!(config.poll_interval, std::time::Duration::from_millis(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Shortest cycle.
    #[serde(with = "humantime_serde")]
    pub min_cycle: Duration,
    /// Longest cycle.
    #[serde(with = "humantime_serde")]
    pub max_cycle: Duration,
    /// How often the toggler checks elapsed time.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            min_cycle: Duration::from_millis(4000),
            max_cycle: Duration::from_millis(6000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl ControllerConfig {
    /// Config with the given cycle bounds and the default poll interval.
    pub fn with_cycle(min_cycle: Duration, max_cycle: Duration) -> Self {
        ControllerConfig {
            min_cycle,
            max_cycle,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the bounds form a non-empty range and the poll interval is non-zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval must be non-zero".into()));
        }
        if self.max_cycle.is_zero() {
            return Err(Error::InvalidConfig("max_cycle must be non-zero".into()));
        }
        if self.min_cycle > self.max_cycle {
            return Err(Error::InvalidConfig(format!(
                "min_cycle {:?} exceeds max_cycle {:?}",
                self.min_cycle, self.max_cycle
            )));
        }
        Ok(())
    }

    /// The uniform random policy over `[min_cycle, max_cycle]`.
    pub fn random_policy(&self) -> RandomCycle {
        RandomCycle::new(self.min_cycle, self.max_cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.min_cycle, Duration::from_secs(4));
        assert_eq!(config.max_cycle, Duration::from_secs(6));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_humantime() {
        let config = ControllerConfig::from_json_str(
            r#"{ "min_cycle": "2s", "max_cycle": "3s 500ms", "poll_interval": "5ms" }"#,
        )
        .unwrap();
        assert_eq!(config.min_cycle, Duration::from_secs(2));
        assert_eq!(config.max_cycle, Duration::from_millis(3500));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_empty_object_is_default() {
        let config = ControllerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = ControllerConfig::from_json_str(r#"{ "min_cycle": "7s" }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_poll() {
        let config = ControllerConfig {
            poll_interval: Duration::ZERO,
            ..ControllerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_json() {
        let err = ControllerConfig::from_json_str(r#"{ "min_cycle": 4 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = ControllerConfig::from_json_str(r#"{ "cycle": "4s" }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
