use std::{path::Path, time::Duration};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for a [crate::Coordinator]
pub struct LocatorSettings {
    /// When false every request fails with [crate::LocationError::Disabled]
    pub enabled: bool,
    /// Time to wait for a fix when a request doesn't specify its own timeout
    pub timeout_millis: u64,
    /// Reuse the last fix if it's at most this old instead of asking the platform again
    pub max_fix_age_millis: Option<u64>,
}

impl LocatorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    pub fn max_fix_age(&self) -> Option<Duration> {
        self.max_fix_age_millis.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result {
        if self.timeout_millis == 0 {
            bail!("timeout_millis must be greater than zero");
        }
        Ok(())
    }

    /// Read settings from a JSON file, missing fields use their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = serde_json::from_str::<Self>(&raw).context("Failed to parse settings")?;
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_millis: 10000,
            max_fix_age_millis: None,
        }
    }
}
