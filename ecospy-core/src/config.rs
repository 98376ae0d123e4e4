//! Kiosk settings shared by every front-end.

use std::path::PathBuf;

use serde::Deserialize;

use crate::classifier::RecyclabilityClassifier;
use crate::ledger::HistoryTemplate;

/// Seconds the camera view stays open without a capture.
pub const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 30;
/// Seconds the result screen is shown before returning home.
pub const DEFAULT_RETURN_COUNTDOWN_SECS: u64 = 10;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Invalid kiosk settings.
pub enum ConfigError {
    /// The recyclable allow-list has no usable entries.
    #[error("allow_list must name at least one recyclable label")]
    EmptyAllowList,
    /// A timer was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
/// The `[kiosk]` configuration table.
pub struct KioskConfig {
    /// Labels that count as recyclable. Required; there is no built-in list.
    pub allow_list: Vec<String>,
    /// Directory captured frames are archived in.
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
    /// Camera view timeout.
    #[serde(default = "default_camera_timeout")]
    pub camera_timeout_secs: u64,
    /// Result screen countdown.
    #[serde(default = "default_return_countdown")]
    pub return_countdown_secs: u64,
    /// Fields stamped on history records.
    #[serde(default)]
    pub history: HistoryTemplate,
}

impl KioskConfig {
    /// Check the settings for values the kiosk cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allow_list.iter().all(|label| label.trim().is_empty()) {
            return Err(ConfigError::EmptyAllowList);
        }
        if self.camera_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("camera_timeout_secs"));
        }
        if self.return_countdown_secs == 0 {
            return Err(ConfigError::ZeroDuration("return_countdown_secs"));
        }
        Ok(())
    }

    /// Classifier built from the allow-list.
    #[must_use]
    pub fn classifier(&self) -> RecyclabilityClassifier {
        RecyclabilityClassifier::new(&self.allow_list)
    }
}

fn default_capture_dir() -> PathBuf {
    PathBuf::from("waste_collected")
}

fn default_camera_timeout() -> u64 {
    DEFAULT_CAMERA_TIMEOUT_SECS
}

fn default_return_countdown() -> u64 {
    DEFAULT_RETURN_COUNTDOWN_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allow_list: &[&str]) -> KioskConfig {
        KioskConfig {
            allow_list: allow_list.iter().map(|label| (*label).to_owned()).collect(),
            capture_dir: default_capture_dir(),
            camera_timeout_secs: DEFAULT_CAMERA_TIMEOUT_SECS,
            return_countdown_secs: DEFAULT_RETURN_COUNTDOWN_SECS,
            history: HistoryTemplate::default(),
        }
    }

    #[test]
    fn blank_allow_list_is_rejected() {
        assert_eq!(config(&[]).validate(), Err(ConfigError::EmptyAllowList));
        assert_eq!(config(&["  "]).validate(), Err(ConfigError::EmptyAllowList));
    }

    #[test]
    fn zero_timers_are_rejected() {
        let mut settings = config(&["bottle"]);
        settings.return_countdown_secs = 0;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::ZeroDuration("return_countdown_secs"))
        );
    }

    #[test]
    fn classifier_uses_the_allow_list() {
        let settings = config(&["Bottle"]);
        assert_eq!(settings.validate(), Ok(()));
        assert!(settings.classifier().is_recyclable("bottle"), "case-insensitive");
        assert!(!settings.classifier().is_recyclable("can"), "not listed");
    }
}
