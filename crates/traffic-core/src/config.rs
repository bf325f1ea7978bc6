//! Engine configuration
//!
//! Configuration is read once at process start, either from defaults or from a
//! TOML/JSON file, and validated before any component is built.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::call::scaled_hold;
use crate::error::{Result, TrafficError};
use crate::outcome::{OutcomeTable, OutcomeType};

/// Settings for one call direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionConfig {
    /// Direction name used in stats and logs
    pub name: String,
    /// Number of calls that may be in progress at once
    pub workers: usize,
    /// Outcome table; likelihoods must sum to 100
    #[serde(default = "OutcomeType::defaults")]
    pub outcomes: Vec<OutcomeType>,
}

impl DirectionConfig {
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
            outcomes: OutcomeType::defaults(),
        }
    }

    fn validate(&self, time_multiplier: f64) -> Result<()> {
        if self.workers == 0 {
            return Err(TrafficError::config(format!(
                "'{}' calls need at least one worker",
                self.name
            )));
        }
        let table = OutcomeTable::new(self.outcomes.clone()).map_err(|e| match e {
            TrafficError::Configuration(msg) => {
                TrafficError::config(format!("'{}' calls: {}", self.name, msg))
            }
            other => other,
        })?;

        let longest = table.longest_duration_ms();
        if scaled_hold(longest, time_multiplier).is_none() {
            return Err(TrafficError::config(format!(
                "'{}' calls: time multiplier {} stretches the {}ms hold past the timer range",
                self.name, time_multiplier, longest
            )));
        }
        Ok(())
    }
}

/// Settings for the CDR stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdrConfig {
    pub name: String,
    pub workers: usize,
}

impl Default for CdrConfig {
    fn default() -> Self {
        Self {
            name: "cdr".to_string(),
            workers: 50,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub incoming: DirectionConfig,
    pub outgoing: DirectionConfig,
    pub cdr: CdrConfig,
    /// Divisor applied to every simulated hold time
    pub time_multiplier: f64,
    /// How often each component's stats are sampled
    pub stats_interval_ms: u64,
    /// Seed for reproducible runs; outgoing calls use `seed + 1`
    pub seed: Option<u64>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            incoming: DirectionConfig::new("incoming", 30),
            outgoing: DirectionConfig::new("outgoing", 300),
            cdr: CdrConfig::default(),
            time_multiplier: 1000.0,
            stats_interval_ms: 1000,
            seed: None,
        }
    }
}

impl TrafficConfig {
    /// Load a configuration file; `.json` files are parsed as JSON, anything
    /// else as TOML. Missing fields fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TrafficError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let config: Self = if path.extension().map_or(false, |ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| {
                TrafficError::config(format!("Cannot parse {}: {}", path.display(), e))
            })?
        } else {
            toml::from_str(&contents).map_err(|e| {
                TrafficError::config(format!("Cannot parse {}: {}", path.display(), e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the engine relies on
    pub fn validate(&self) -> Result<()> {
        if !(self.time_multiplier.is_finite() && self.time_multiplier > 0.0) {
            return Err(TrafficError::config(format!(
                "Time multiplier must be positive, got {}",
                self.time_multiplier
            )));
        }
        self.incoming.validate(self.time_multiplier)?;
        self.outgoing.validate(self.time_multiplier)?;

        if self.cdr.workers == 0 {
            return Err(TrafficError::config("The cdr stage needs at least one worker"));
        }
        if self.stats_interval_ms == 0 {
            return Err(TrafficError::config("Stats interval must be at least 1ms"));
        }
        Ok(())
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TrafficConfig::default();
        assert_eq!(config.incoming.name, "incoming");
        assert_eq!(config.incoming.workers, 30);
        assert_eq!(config.outgoing.workers, 300);
        assert_eq!(config.cdr.workers, 50);
        assert_eq!(config.time_multiplier, 1000.0);
        assert_eq!(config.stats_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrafficConfig::default();
        config.outgoing.outcomes[0].likelihood = 39;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("outgoing"));
        assert!(err.to_string().contains("99"));

        let mut config = TrafficConfig::default();
        config.cdr.workers = 0;
        assert!(config.validate().is_err());

        let mut config = TrafficConfig::default();
        config.incoming.workers = 0;
        assert!(config.validate().is_err());

        let mut config = TrafficConfig::default();
        config.time_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrafficConfig::default();
        config.stats_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_multiplier_overflowing_hold() {
        let mut config = TrafficConfig::default();
        config.time_multiplier = 1e-300;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("incoming"));

        config.time_multiplier = 1e-3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_oversized_likelihood() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[incoming]
name = "incoming"
workers = 1

[[incoming.outcomes]]
name = "huge"
likelihood = 4294967295
min_duration_ms = 1
max_duration_ms = 2

[[incoming.outcomes]]
name = "rest"
likelihood = 101
min_duration_ms = 1
max_duration_ms = 2
"#
        )
        .unwrap();

        let err = TrafficConfig::from_file(file.path()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_toml_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
time_multiplier = 50.0
seed = 7

[incoming]
name = "inbound"
workers = 4

[[incoming.outcomes]]
name = "answered"
likelihood = 100
min_duration_ms = 10
max_duration_ms = 20
"#
        )
        .unwrap();

        let config = TrafficConfig::from_file(file.path()).unwrap();
        assert_eq!(config.incoming.name, "inbound");
        assert_eq!(config.incoming.outcomes.len(), 1);
        assert_eq!(config.time_multiplier, 50.0);
        assert_eq!(config.seed, Some(7));
        // Untouched sections keep their defaults.
        assert_eq!(config.outgoing, DirectionConfig::new("outgoing", 300));
        assert_eq!(config.cdr, CdrConfig::default());
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"cdr": {{"name": "billing", "workers": 2}}}}"#).unwrap();

        let config = TrafficConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cdr.name, "billing");
        assert_eq!(config.cdr.workers, 2);
    }

    #[test]
    fn test_load_rejects_invalid_table() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[outgoing]
name = "outgoing"
workers = 1

[[outgoing.outcomes]]
name = "half"
likelihood = 50
min_duration_ms = 1
max_duration_ms = 2
"#
        )
        .unwrap();

        let err = TrafficConfig::from_file(file.path()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_missing_file() {
        let err = TrafficConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.is_configuration());
    }
}
