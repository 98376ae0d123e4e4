//! `ecospy.toml` loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ecospy_core::config::KioskConfig;
use ecospy_provider_firestore::FirestoreSettings;
use ecospy_provider_vision::VisionSettings;
use serde::Deserialize;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "ecospy.toml";

/// Used when demo mode runs without a config file.
const DEMO_CONFIG: &str = r#"
[kiosk]
allow_list = ["bottle", "cup", "can", "paper", "cardboard", "plastic"]
capture_dir = "waste_collected"
"#;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AppConfig {
    pub kiosk: KioskConfig,
    #[serde(default)]
    pub firestore: Option<FirestoreSettings>,
    #[serde(default)]
    pub vision: Option<VisionSettings>,
}

impl AppConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.kiosk.validate()?;
        Ok(config)
    }

    /// Settings for demo mode when no config file exists.
    pub(crate) fn demo() -> Result<Self> {
        Self::parse(DEMO_CONFIG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = AppConfig::parse(
            r#"
            [kiosk]
            allow_list = ["bottle", "can"]
            capture_dir = "/var/lib/ecospy/frames"
            camera_timeout_secs = 45

            [kiosk.history]
            status = "Collected"
            location = { latitude = 12.97, longitude = 77.59 }

            [firestore]
            project_id = "ecospy-prod"
            access_token_env = "ECOSPY_FIRESTORE_TOKEN"

            [vision]
            snapshot_url = "http://127.0.0.1:8080/?action=snapshot"
            detector_url = "http://127.0.0.1:8000/detect"
            min_confidence = 0.4
            "#,
        )
        .expect("valid config");

        assert_eq!(config.kiosk.allow_list, vec!["bottle", "can"]);
        assert_eq!(config.kiosk.camera_timeout_secs, 45);
        assert_eq!(config.kiosk.return_countdown_secs, 10, "default countdown");
        assert_eq!(config.kiosk.history.status, "Collected");
        let firestore = config.firestore.expect("firestore table");
        assert_eq!(firestore.database, "(default)");
        assert!(config.vision.is_some(), "vision table");
    }

    #[test]
    fn allow_list_is_required() {
        let result = AppConfig::parse("[kiosk]\ncapture_dir = \"frames\"\n");
        assert!(result.is_err(), "missing allow_list must not parse");
    }

    #[test]
    fn empty_allow_list_is_rejected() {
        let result = AppConfig::parse("[kiosk]\nallow_list = []\n");
        assert!(result.is_err(), "empty allow_list must fail validation");
    }

    #[test]
    fn demo_config_accepts_common_items() {
        let config = AppConfig::demo().expect("demo config");
        let classifier = config.kiosk.classifier();
        assert!(classifier.is_recyclable("bottle"));
        assert!(!classifier.is_recyclable("person"));
        assert!(config.firestore.is_none() && config.vision.is_none());
    }
}
