use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// シミュレーション設定
///
/// The temporal bound and replication plan of a run. The deadline is the
/// only temporal bound the scheduler enforces; the core never inspects
/// wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_deadline")]
    pub deadline: f64,

    #[serde(default = "default_replications")]
    pub replications: u64,

    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deadline: default_deadline(),
            replications: default_replications(),
            seed: 0,
        }
    }
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn default_deadline() -> f64 {
    100.0
}

fn default_replications() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.deadline, 100.0);
        assert_eq!(config.replications, 1);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"deadline": 10.0}"#).unwrap();
        assert_eq!(config.deadline, 10.0);
        assert_eq!(config.replications, 1);
    }
}
