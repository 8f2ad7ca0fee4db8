//! Memory guard thresholds

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

fn default_warn_ratio() -> f64 {
    0.7
}

fn default_fail_ratio() -> f64 {
    0.8
}

/// Raw guard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Fraction of available memory above which a warning is logged
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,
    /// Fraction of available memory above which the run aborts
    #[serde(default = "default_fail_ratio")]
    pub fail_ratio: f64,
    /// Fixed available-memory ceiling in bytes, replacing host introspection
    #[serde(default)]
    pub available_memory_bytes: Option<u64>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            warn_ratio: default_warn_ratio(),
            fail_ratio: default_fail_ratio(),
            available_memory_bytes: None,
        }
    }
}

impl GuardSettings {
    /// Range-check and freeze
    pub fn validate(self) -> ConfigResult<GuardConfig> {
        if !(self.fail_ratio > 0.0 && self.fail_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "fail_ratio",
                format!("{} is outside (0, 1]", self.fail_ratio),
            ));
        }
        if !(self.warn_ratio > 0.0 && self.warn_ratio < self.fail_ratio) {
            return Err(ConfigError::invalid(
                "warn_ratio",
                format!(
                    "{} must be positive and below fail_ratio {}",
                    self.warn_ratio, self.fail_ratio
                ),
            ));
        }
        if self.available_memory_bytes == Some(0) {
            return Err(ConfigError::invalid(
                "available_memory_bytes",
                "must be greater than 0 when set",
            ));
        }

        Ok(GuardConfig {
            warn_ratio: self.warn_ratio,
            fail_ratio: self.fail_ratio,
            available_memory_bytes: self.available_memory_bytes,
        })
    }
}

/// Validated guard thresholds. Invariant: `0 < warn_ratio < fail_ratio <= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    warn_ratio: f64,
    fail_ratio: f64,
    available_memory_bytes: Option<u64>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warn_ratio: default_warn_ratio(),
            fail_ratio: default_fail_ratio(),
            available_memory_bytes: None,
        }
    }
}

impl GuardConfig {
    /// Warning threshold as a fraction of available memory
    pub fn warn_ratio(&self) -> f64 {
        self.warn_ratio
    }

    /// Failure threshold as a fraction of available memory
    pub fn fail_ratio(&self) -> f64 {
        self.fail_ratio
    }

    /// Fixed ceiling that replaces host introspection, if configured
    pub fn available_memory_bytes(&self) -> Option<u64> {
        self.available_memory_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = GuardSettings::default().validate().unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_warn_above_fail_rejected() {
        let settings = GuardSettings {
            warn_ratio: 0.9,
            fail_ratio: 0.8,
            available_memory_bytes: None,
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field(), Some("warn_ratio"));
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let settings = GuardSettings {
            available_memory_bytes: Some(0),
            ..GuardSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
