//! Engine configuration.
//!
//! Stored as TOML. Every key has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! [graph]
//! buffer_size = 256
//! sample_rate = 48000
//! tempo = 120.0
//! master_tune = 440.0
//! event_capacity = 512
//!
//! [workers]
//! high_priority = 2
//! low_priority = 1
//!
//! [backend]
//! client_name = "klangnetz"
//! audio_inputs = 2
//! audio_outputs = 2
//! event_inputs = 1
//! event_outputs = 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_EVENT_CAPACITY;
use crate::error::ConfigError;
use crate::graph::GraphParams;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphSettings,
    pub workers: WorkerSettings,
    pub backend: BackendSettings,
}

/// Initial graph parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub buffer_size: usize,
    pub sample_rate: u32,
    pub tempo: f32,
    pub master_tune: f32,
    /// Events each event port holds per round.
    pub event_capacity: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        let params = GraphParams::default();
        Self {
            buffer_size: params.buffer_size,
            sample_rate: params.sample_rate,
            tempo: params.tempo,
            master_tune: params.master_tune,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl GraphSettings {
    pub fn params(&self) -> GraphParams {
        GraphParams {
            buffer_size: self.buffer_size,
            sample_rate: self.sample_rate,
            tempo: self.tempo,
            master_tune: self.master_tune,
        }
    }
}

/// Thread counts of the background worker pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub high_priority: usize,
    pub low_priority: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            high_priority: 2,
            low_priority: 1,
        }
    }
}

/// How the engine presents itself to the real-time server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub client_name: String,
    pub audio_inputs: usize,
    pub audio_outputs: usize,
    pub event_inputs: usize,
    pub event_outputs: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            client_name: "klangnetz".to_owned(),
            audio_inputs: 2,
            audio_outputs: 2,
            event_inputs: 1,
            event_outputs: 1,
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.params().validate()?;
        if self.graph.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph.event_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.workers.high_priority == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.high_priority",
                reason: "must be at least 1".into(),
            });
        }
        if self.workers.low_priority == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.low_priority",
                reason: "must be at least 1".into(),
            });
        }
        if self.backend.client_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "backend.client_name",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.graph.params(), GraphParams::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graph]
            buffer_size = 64

            [backend]
            client_name = "studio"
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.buffer_size, 64);
        assert_eq!(config.graph.sample_rate, 48000);
        assert_eq!(config.backend.client_name, "studio");
        assert_eq!(config.backend.audio_outputs, 2);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = Config::from_toml_str("[graph]\nbuffer_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Graph(GraphError::InvalidBufferSize(0))));

        let err = Config::from_toml_str("[workers]\nlow_priority = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "workers.low_priority", .. }));

        let err = Config::from_toml_str("[graph]\nbuffer_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut config = Config::default();
        config.graph.tempo = 96.0;
        config.workers.high_priority = 4;

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load("/nonexistent/klangnetz.toml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.to_string().contains("/nonexistent/klangnetz.toml"));
    }
}
