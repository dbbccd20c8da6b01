//! Configuration builder
//!
//! Merges configuration from files and CLI arguments. Later sources win;
//! a CLI flag that was not given leaves the file value untouched.

use crate::config::{Config, ConfigFile, FanConfig, GpuConfig};
use crate::domain::FanCurvePoint;
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file
    ///
    /// An explicit path must exist; without one the default locations are
    /// searched and a missing file is not an error.
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI dry-run flag
    pub fn with_dry_run(mut self, dry_run: Option<bool>) -> Self {
        if let Some(d) = dry_run {
            self.config.general.dry_run = d;
        }
        self
    }

    /// Override with CLI interval
    pub fn with_interval(mut self, interval: Option<f64>) -> Self {
        if let Some(i) = interval {
            self.config.general.interval_seconds = i;
        }
        self
    }

    pub fn with_retry_interval(mut self, interval: Option<f64>) -> Self {
        if let Some(i) = interval {
            self.config.general.retry_interval_seconds = i;
        }
        self
    }

    pub fn with_retry(mut self, retry: Option<bool>) -> Self {
        if let Some(r) = retry {
            self.config.general.retry = r;
        }
        self
    }

    pub fn with_single_use(mut self, single_use: Option<bool>) -> Self {
        if let Some(s) = single_use {
            self.config.general.single_use = s;
        }
        self
    }

    /// Override GPU selection
    ///
    /// Any selector given on the command line replaces the file's selection
    /// as a whole, so a UUID in the file cannot outrank `--gpu 1`.
    pub fn with_gpu(
        mut self,
        index: Option<u32>,
        name: Option<String>,
        uuid: Option<String>,
    ) -> Self {
        let gpu = GpuConfig { index, name, uuid };
        if !gpu.is_empty() {
            self.config.gpu = gpu;
        }
        self
    }

    /// Override the fan curve and default speed
    ///
    /// Either one activates the fan domain.
    pub fn with_fan_curve(
        mut self,
        points: Vec<FanCurvePoint>,
        default_speed: Option<u8>,
    ) -> Self {
        if points.is_empty() && default_speed.is_none() {
            return self;
        }

        let fan = self.config.fan.get_or_insert_with(FanConfig::default);
        if !points.is_empty() {
            fan.curve = points.into_iter().map(Into::into).collect();
        }
        if let Some(speed) = default_speed {
            fan.default_speed = speed;
        }
        self
    }

    /// Override with CLI power limit
    pub fn with_power_limit(mut self, limit: Option<u32>) -> Self {
        if let Some(l) = limit {
            self.config.power.limit_watts = Some(l);
        }
        self
    }

    pub fn with_acoustic_limit(mut self, limit: Option<i32>) -> Self {
        if let Some(l) = limit {
            self.config.thermal.acoustic_limit_celsius = Some(l);
        }
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
