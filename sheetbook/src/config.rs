//! Engine configuration
//!
//! Loaded from TOML (or built in code) and shared by every workbook created
//! with it. All fields have spreadsheet defaults, so an empty file is valid.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Author recorded on notes and comments when none is given
    pub author: String,
    pub default_font_name: String,
    /// Points
    pub default_font_size: f64,
    /// Characters of the default font
    pub default_column_width: f64,
    /// Points
    pub default_row_height: f64,
    pub url_timeout_seconds: u64,
    /// New workbooks use the 1904 date system
    pub date1904: bool,
    pub license_key: Option<String>,
    pub autofit: AutoFitConfig,
}

/// Tuning of the autofit width estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFitConfig {
    /// Extra characters added to every measured column
    pub padding: f64,
    /// Width multiplier for bold text
    pub bold_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: "sheetbook".to_string(),
            default_font_name: "Calibri".to_string(),
            default_font_size: 11.0,
            default_column_width: 8.43,
            default_row_height: 15.0,
            url_timeout_seconds: 30,
            date1904: false,
            license_key: None,
            autofit: AutoFitConfig::default(),
        }
    }
}

impl Default for AutoFitConfig {
    fn default() -> Self {
        Self {
            padding: 0.71,
            bold_factor: 1.1,
        }
    }
}

fn license_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z0-9]{5}-[A-Z0-9]{5}-[A-Z0-9]{5}-[A-Z0-9]{4}$")
            .expect("license pattern is valid")
    })
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the license key format
    pub fn validate(&self) -> Result<()> {
        if !(self.default_font_size > 0.0 && self.default_font_size <= 409.0) {
            return Err(Error::Config(format!(
                "default_font_size must be in (0, 409], got {}",
                self.default_font_size
            )));
        }
        if !(0.0..=255.0).contains(&self.default_column_width) {
            return Err(Error::Config(format!(
                "default_column_width must be in [0, 255], got {}",
                self.default_column_width
            )));
        }
        if !(0.0..=409.0).contains(&self.default_row_height) {
            return Err(Error::Config(format!(
                "default_row_height must be in [0, 409], got {}",
                self.default_row_height
            )));
        }
        if self.default_font_name.trim().is_empty() {
            return Err(Error::Config("default_font_name is empty".to_string()));
        }
        if self.autofit.bold_factor <= 0.0 || self.autofit.padding < 0.0 {
            return Err(Error::Config(
                "autofit.bold_factor must be positive and autofit.padding non-negative"
                    .to_string(),
            ));
        }
        self.check_license()
    }

    pub(crate) fn check_license(&self) -> Result<()> {
        match &self.license_key {
            Some(key) if !license_pattern().is_match(key.trim()) => Err(Error::License(format!(
                "malformed license key '{}'",
                key
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn url_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.url_timeout_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.default_font_name, "Calibri");
        assert_eq!(config.default_column_width, 8.43);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
author = "Finance"
date1904 = true

[autofit]
padding = 1.5
"#;
        let config = EngineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.author, "Finance");
        assert!(config.date1904);
        assert_eq!(config.autofit.padding, 1.5);
        assert_eq!(config.autofit.bold_factor, 1.1);
        assert_eq!(config.default_row_height, 15.0);
    }

    #[test]
    fn test_license_key_format() {
        let ok = EngineConfig {
            license_key: Some("XLS12-ABCDE-FGHIJ-KLMN".to_string()),
            ..EngineConfig::default()
        };
        assert!(ok.validate().is_ok());

        let bad = EngineConfig {
            license_key: Some("not-a-key".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::License(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("default_font_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = EngineConfig::from_toml_str("default_font_size = \"big\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheetbook.toml");
        std::fs::write(&path, "default_font_name = \"Arial\"\ndefault_font_size = 10\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.default_font_name, "Arial");
        assert_eq!(config.default_font_size, 10.0);
    }
}
