use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

/// Environment variables that override file settings.
pub const ENV_STORE_URL: &str = "OCCUPANCY_STORE_URL";
pub const ENV_ZONE_NAME: &str = "OCCUPANCY_ZONE_NAME";

impl Config {
    /// Read, override from the environment and validate. Returns the names of
    /// the variables that were applied so the caller can log them once
    /// logging is up.
    pub fn load(path: &str) -> Result<(Self, Vec<&'static str>)> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let mut config = Self::from_yaml(&contents)?;
        let applied = config.apply_env_overrides();
        config.validate()?;
        Ok((config, applied))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("Invalid config YAML")?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<&'static str> {
        let mut applied = Vec::new();
        if let Some(url) = lookup(ENV_STORE_URL) {
            self.store.url = url;
            applied.push(ENV_STORE_URL);
        }
        if let Some(name) = lookup(ENV_ZONE_NAME) {
            self.zone.name = name;
            applied.push(ENV_ZONE_NAME);
        }
        applied
    }

    /// API key for the REST store, read from the configured env var.
    pub fn store_api_key(&self) -> Option<String> {
        std::env::var(&self.store.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.zone.name.trim().is_empty() {
            bail!("zone.name must not be empty");
        }
        if self.zone.max_capacity == 0 {
            bail!("zone.max_capacity must be at least 1");
        }
        if self.line.buffer < 0 || self.line.offset < 0 {
            bail!(
                "line.buffer and line.offset must be non-negative (got {} / {})",
                self.line.buffer,
                self.line.offset
            );
        }

        let positive = [
            ("tracking.stale_ttl_secs", self.tracking.stale_ttl_secs),
            ("tracking.active_window_secs", self.tracking.active_window_secs),
            ("sync.min_push_interval_secs", self.sync.min_push_interval_secs),
            ("sync.pulse_interval_secs", self.sync.pulse_interval_secs),
            ("sync.push_interval_secs", self.sync.push_interval_secs),
            ("alerts.cooldown_secs", self.alerts.cooldown_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                bail!("{} must be a positive number of seconds (got {})", name, value);
            }
        }
        if let Some(ttl) = self.tracking.counted_ttl_secs {
            if !(ttl.is_finite() && ttl > 0.0) {
                bail!("tracking.counted_ttl_secs must be positive when set (got {})", ttl);
            }
        }

        if self.sync.queue_capacity == 0 {
            bail!("sync.queue_capacity must be at least 1");
        }
        if self.input.event_bus_capacity == 0 {
            bail!("input.event_bus_capacity must be at least 1");
        }
        if self.input.housekeeping_interval_ms == 0 {
            bail!("input.housekeeping_interval_ms must be at least 1");
        }
        Ok(())
    }
}
