use std::{
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::simulation::SimulationParams;

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("data/simulation_config.json");
pub const SIMULATION_CONFIG_ENV: &str = "SIM_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub bind: SocketAddr,
    pub tick_hz: f64,
    pub molecule_limit: u32,
    /// Percent chance per tick of seeding an empty world.
    pub spawn_rate: f64,
    /// Largest drift a mutated rate can take.
    pub variation: f64,
    pub seed: Option<u64>,
    /// Per-tick velocity bound, as a fraction of the world.
    pub speed: f64,
    /// Recorder output directory; recording is off when unset.
    pub output_dir: Option<PathBuf>,
    pub broadcast_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            tick_hz: 30.0,
            molecule_limit: 1000,
            spawn_rate: 50.0,
            variation: 0.5,
            seed: None,
            speed: 0.004,
            output_dir: None,
            broadcast_capacity: 16,
        }
    }
}

impl SimulationConfig {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_SIMULATION_CONFIG)
            .expect("builtin simulation config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, SimulationConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SimulationConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| SimulationConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            molecule_limit: self.molecule_limit,
            spawn_rate: self.spawn_rate,
            variation: self.variation,
            speed: self.speed,
        }
    }

    fn validate(&self) -> Result<(), SimulationConfigError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(SimulationConfigError::Invalid("tick_hz must be positive"));
        }
        match Duration::try_from_secs_f64(1.0 / self.tick_hz) {
            Ok(interval) if !interval.is_zero() => {}
            _ => {
                return Err(SimulationConfigError::Invalid(
                    "tick_hz must give a representable non-zero tick interval",
                ))
            }
        }
        if self.molecule_limit == 0 {
            return Err(SimulationConfigError::Invalid(
                "molecule_limit must be positive",
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(SimulationConfigError::Invalid(
                "broadcast_capacity must be positive",
            ));
        }
        if self.spawn_rate < 0.0 || self.variation < 0.0 || self.speed < 0.0 {
            return Err(SimulationConfigError::Invalid(
                "rates and speed must not be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SimulationConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid simulation config: {0}")]
    Invalid(&'static str),
}

/// Load the config named by `SIM_CONFIG_PATH`, falling back to the builtin.
pub fn load_simulation_config_from_env() -> SimulationConfig {
    let Some(path) = env::var(SIMULATION_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::debug!(target: "petri::config", "simulation_config.loaded=builtin");
        return SimulationConfig::builtin();
    };
    match SimulationConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "petri::config",
                path = %path.display(),
                "simulation_config.loaded=file"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                target: "petri::config",
                path = %path.display(),
                error = %err,
                "simulation_config.load_failed; using builtin"
            );
            SimulationConfig::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        assert_eq!(SimulationConfig::builtin(), SimulationConfig::default());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{"bind":"0.0.0.0:9000","seed":42,"output_dir":"out"}"#,
        )
        .expect("valid config");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
        assert_eq!(config.molecule_limit, 1000);
        assert_eq!(config.tick_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn rejects_nonsense_values() {
        for json in [
            r#"{"tick_hz":0}"#,
            r#"{"tick_hz":1e10}"#,
            r#"{"tick_hz":1e-300}"#,
            r#"{"molecule_limit":0}"#,
            r#"{"broadcast_capacity":0}"#,
            r#"{"spawn_rate":-1}"#,
        ] {
            assert!(
                matches!(
                    SimulationConfig::from_json_str(json),
                    Err(SimulationConfigError::Invalid(_))
                ),
                "{json} should be rejected"
            );
        }
        assert!(matches!(
            SimulationConfig::from_json_str("{"),
            Err(SimulationConfigError::Parse(_))
        ));
    }
}
