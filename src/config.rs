use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::instances::Instance;
use crate::stream::LogsStreamOptions;
use crate::transport::TransportOptions;
use crate::viewer::ViewerOptions;

pub const DEFAULT_CONFIG_PATH: &str = ".lsv.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub instances: InstancesConfig,

    // This field is not serialized, just used at runtime
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub batch_window_ms: u64,
    pub waiting_timeout_live_ms: u64,
    pub waiting_timeout_bounded_ms: u64,
    pub overflow_watermark: u64,
    pub max_retry_count: u32,
    pub throttle_elements: usize,
    pub throttle_per_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 500,
            waiting_timeout_live_ms: 2_000,
            waiting_timeout_bounded_ms: 16_000,
            overflow_watermark: 10_000,
            max_retry_count: 6,
            throttle_elements: 1_000,
            throttle_per_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Display cap, independent from the stream's overflow watermark
    pub limit: usize,
    pub ansi_cache_size: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            limit: 10_000,
            ansi_cache_size: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    pub refresh_interval_ms: u64,
    /// Instances records may reference, used to add readable names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub known: Vec<Instance>,
}

impl Default for InstancesConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2_000,
            known: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
        let mut config: Config = toml::from_str(&content).with_context(|| format!("failed to parse config {}", path))?;
        config.config_path = Some(PathBuf::from(path));
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("failed to write config {}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream.batch_window_ms == 0 {
            bail!("stream.batch_window_ms must be greater than zero");
        }
        if self.stream.overflow_watermark == 0 {
            bail!("stream.overflow_watermark must be greater than zero");
        }
        if self.stream.throttle_elements == 0 || self.stream.throttle_per_ms == 0 {
            bail!("stream.throttle_elements and stream.throttle_per_ms must be greater than zero");
        }
        if self.viewer.limit == 0 {
            bail!("viewer.limit must be greater than zero");
        }
        if self.viewer.ansi_cache_size == 0 {
            bail!("viewer.ansi_cache_size must be greater than zero");
        }
        if self.instances.refresh_interval_ms == 0 {
            bail!("instances.refresh_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn stream_options(&self) -> LogsStreamOptions {
        let stream = &self.stream;
        LogsStreamOptions {
            buffer_window: Duration::from_millis(stream.batch_window_ms),
            waiting_timeout_live: Duration::from_millis(stream.waiting_timeout_live_ms),
            waiting_timeout_bounded: Duration::from_millis(stream.waiting_timeout_bounded_ms),
            overflow_watermark: stream.overflow_watermark,
            transport: TransportOptions {
                max_retry_count: stream.max_retry_count,
                throttle_elements: stream.throttle_elements,
                throttle_per: Duration::from_millis(stream.throttle_per_ms),
            },
        }
    }

    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            limit: Some(self.viewer.limit),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.instances.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[stream]
overflow_watermark = 500

[viewer]
limit = 200
"#
        )
        .unwrap();

        let config = Config::from_file(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.stream.overflow_watermark, 500);
        assert_eq!(config.stream.batch_window_ms, 500);
        assert_eq!(config.viewer.limit, 200);
        assert_eq!(config.viewer.ansi_cache_size, 1_000);
        assert_eq!(config.instances, InstancesConfig::default());
        assert!(config.config_path.is_some());
    }

    #[test]
    fn test_known_instances_load() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[[instances.known]]
id = "i-1"
name = "web-1"
deployment_id = "d-7"
"#
        )
        .unwrap();

        let config = Config::from_file(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.instances.known.len(), 1);
        assert_eq!(config.instances.known[0].name, "web-1");
        assert_eq!(config.instances.refresh_interval_ms, 2_000);
    }

    #[test]
    fn test_empty_file_is_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::from_file(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.stream, StreamConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        let mut config = Config::default();
        config.stream.waiting_timeout_live_ms = 50;
        config.save(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.stream.waiting_timeout_live_ms, 50);
        assert_eq!(loaded.viewer, config.viewer);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[stream\nlimit = ").unwrap();
        let err = Config::from_file(temp_file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.stream.overflow_watermark = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.viewer.limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.batch_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_runtime_options() {
        let mut config = Config::default();
        config.stream.batch_window_ms = 250;
        config.stream.throttle_per_ms = 20;
        config.viewer.limit = 42;

        let stream = config.stream_options();
        assert_eq!(stream.buffer_window, Duration::from_millis(250));
        assert_eq!(stream.transport.throttle_per, Duration::from_millis(20));
        assert_eq!(stream.overflow_watermark, 10_000);
        assert_eq!(config.viewer_options().limit, Some(42));
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
    }
}
