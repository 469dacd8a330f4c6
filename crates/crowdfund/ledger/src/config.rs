//! Ledger configuration

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LedgerError};

/// When success funds leave escrow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// Transfer to the creator inside the operation that reaches success.
    /// A failed transfer rolls the whole operation back.
    #[default]
    Immediate,
    /// Record a pending release; the creator collects it with `withdraw`.
    Deferred,
}

/// Title and description rules applied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPolicy {
    pub require_title: bool,
    pub require_description: bool,
    pub max_title_len: usize,
    pub max_description_len: usize,
}

impl Default for TextPolicy {
    fn default() -> Self {
        Self {
            require_title: true,
            require_description: false,
            max_title_len: 100,
            max_description_len: 1000,
        }
    }
}

impl TextPolicy {
    pub fn check(&self, title: &str, description: &str) -> Result<(), LedgerError> {
        if self.require_title && title.trim().is_empty() {
            return Err(LedgerError::InvalidTitle {
                reason: "title must not be empty".into(),
            });
        }
        let title_len = title.chars().count();
        if title_len > self.max_title_len {
            return Err(LedgerError::InvalidTitle {
                reason: format!("{} characters exceeds limit {}", title_len, self.max_title_len),
            });
        }

        if self.require_description && description.trim().is_empty() {
            return Err(LedgerError::InvalidDescription {
                reason: "description must not be empty".into(),
            });
        }
        let description_len = description.chars().count();
        if description_len > self.max_description_len {
            return Err(LedgerError::InvalidDescription {
                reason: format!(
                    "{} characters exceeds limit {}",
                    description_len, self.max_description_len
                ),
            });
        }
        Ok(())
    }
}

/// Complete ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub payout_mode: PayoutMode,
    /// Upper bound on campaign duration; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<i64>,
    /// Capacity of the broadcast channel used for event subscribers.
    pub event_buffer: usize,
    pub text: TextPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payout_mode: PayoutMode::Immediate,
            max_duration_secs: None,
            event_buffer: 1024,
            text: TextPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn deferred() -> Self {
        Self {
            payout_mode: PayoutMode::Deferred,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.max_duration_secs {
            if max <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "max_duration_secs must be positive, got {}",
                    max
                )));
            }
            if Duration::try_seconds(max).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "max_duration_secs {} is out of range",
                    max
                )));
            }
        }
        if self.text.max_title_len == 0 && self.text.require_title {
            return Err(ConfigError::Invalid(
                "max_title_len of 0 rejects every required title".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be at least 1".into()));
        }
        Ok(())
    }

    /// `None` when unbounded, or when `max_duration_secs` is out of range
    /// (which `validate` rejects).
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.and_then(Duration::try_seconds)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
