use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigWarning};
use crate::failure::{DurationDistribution, MAX_PLANNED_FAILURES};
use crate::routing::RoutingAlgorithm;
use crate::{DEFAULT_BUFFER_SIZE, DEFAULT_PACKET_SIZE};

/// Scalar knobs for one run. Times are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub horizon: f64,
    pub failure_rate: f64, // outages per second
    pub failure_distribution: String,
    pub routing_algorithm: String,
    /// Absent means entropy-seeded.
    pub seed: Option<u64>,
    pub packet_size: u32, // bytes
    pub buffer_size: u64, // default per-node buffer, bytes
    /// Gap between consecutive packets a source injects for one flow.
    pub packet_interval: f64,
    pub sample_interval: Option<f64>,
    /// Flows generated when no scenario is supplied.
    pub random_flows: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            horizon: 1000.0,
            failure_rate: 0.0,
            failure_distribution: "uniform".to_string(),
            routing_algorithm: "shortest-path".to_string(),
            seed: None,
            packet_size: DEFAULT_PACKET_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            packet_interval: 0.001,
            sample_interval: None,
            random_flows: 100,
        }
    }
}

/// A config with its names resolved.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub algorithm: RoutingAlgorithm,
    pub distribution: DurationDistribution,
    pub warnings: Vec<ConfigWarning>,
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.horizon = horizon;
        self
    }

    /// Validates scalars and resolves names. An unknown routing algorithm is
    /// an error; an unknown duration distribution only warns.
    pub fn resolve(&self) -> Result<Resolved, ConfigError> {
        non_negative("horizon", self.horizon)?;
        non_negative("failure_rate", self.failure_rate)?;
        non_negative("packet_interval", self.packet_interval)?;
        if let Some(interval) = self.sample_interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "sample_interval",
                    value: interval,
                });
            }
        }
        if self.packet_size == 0 {
            return Err(ConfigError::ZeroPacketSize);
        }
        let planned = self.failure_rate * self.horizon;
        if planned > MAX_PLANNED_FAILURES as f64 {
            return Err(ConfigError::TooManyFailures {
                planned,
                limit: MAX_PLANNED_FAILURES,
            });
        }

        let algorithm = self.routing_algorithm.parse()?;
        let (distribution, warning) = DurationDistribution::parse_lenient(&self.failure_distribution);
        Ok(Resolved {
            algorithm,
            distribution,
            warnings: warning.into_iter().collect(),
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}
