use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const BUILTIN_VIEWER_CONFIG: &str = include_str!("data/viewer_config.json");
pub const VIEWER_CONFIG_ENV: &str = "VIEWER_CONFIG_PATH";

/// Tunables for the viewer side of the control channel.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub endpoint: String,
    pub retry_interval_ms: u64,
    pub max_retries: u32,
    pub debounce_ms: u64,
    pub draw_radius_px: u32,
    pub initial_molecule_limit: u32,
    pub molecule_limit_step: u32,
    pub max_molecule_limit: u32,
    pub reconnect_delay_ms: u64,
    pub redraw_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws".to_string(),
            retry_interval_ms: 250,
            max_retries: 5,
            debounce_ms: 300,
            draw_radius_px: 3,
            initial_molecule_limit: 1000,
            molecule_limit_step: 100,
            max_molecule_limit: 20_000,
            reconnect_delay_ms: 2000,
            redraw_interval_ms: 100,
        }
    }
}

impl ViewerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.retry_interval_ms),
            max_attempts: self.max_retries,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }

    /// Clamp a requested cap into `1..=max_molecule_limit`.
    pub fn clamp_molecule_limit(&self, value: u32) -> u32 {
        value.clamp(1, self.max_molecule_limit.max(1))
    }

    pub fn from_json_str(data: &str) -> Result<Self, ViewerConfigError> {
        let config: ViewerConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ViewerConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ViewerConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_VIEWER_CONFIG).expect("builtin viewer config should parse")
    }

    fn validate(&self) -> Result<(), ViewerConfigError> {
        if self.retry_interval_ms == 0 {
            return Err(ViewerConfigError::Invalid("retry_interval_ms must be positive"));
        }
        if self.initial_molecule_limit == 0 || self.max_molecule_limit == 0 {
            return Err(ViewerConfigError::Invalid("molecule limits must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ViewerConfigError {
    #[error("failed to parse viewer config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read viewer config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid viewer config: {0}")]
    Invalid(&'static str),
}

/// Load the config named by `VIEWER_CONFIG_PATH`, falling back to the builtin.
pub fn load_viewer_config_from_env() -> ViewerConfig {
    let Some(path) = env::var(VIEWER_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::debug!(target: "petri::config", "viewer_config.loaded=builtin");
        return ViewerConfig::builtin();
    };

    match ViewerConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "petri::config",
                path = %path.display(),
                "viewer_config.loaded=file"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                target: "petri::config",
                path = %path.display(),
                error = %err,
                "viewer_config.load_failed"
            );
            ViewerConfig::builtin()
        }
    }
}
