use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows_preview: usize,
}

fn default_max_rows() -> usize {
    100
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_rows_preview: default_max_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(default = "default_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_top_n")]
    pub frequency_top_n: usize,
    #[serde(default = "default_large_dataset_rows")]
    pub large_dataset_rows: usize,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

fn default_bins() -> usize {
    50
}
fn default_top_n() -> usize {
    20
}
fn default_large_dataset_rows() -> usize {
    500_000
}
fn default_sample_rows() -> usize {
    50_000
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            histogram_bins: default_bins(),
            frequency_top_n: default_top_n(),
            large_dataset_rows: default_large_dataset_rows(),
            sample_rows: default_sample_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_format() -> String {
    "csv".into()
}
fn default_output_dir() -> String {
    ".".into()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub qa: QaConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geolens")
            .join("config.toml")
    }

    pub fn load() -> crate::Result<Self> {
        let path = if let Ok(env_path) = std::env::var("GEOLENS_CONFIG") {
            PathBuf::from(env_path) // $GEOLENS_CONFIG overrides default config path
        } else {
            Self::config_path()
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let cfg: Self =
            toml::from_str(&content).map_err(|e| crate::GeoLensError::Other(e.to_string()))?;
        Ok(cfg)
    }

    pub fn save(&self) -> crate::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::GeoLensError::Other(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.qa.large_dataset_rows, 500_000);
        assert_eq!(cfg.qa.sample_rows, 50_000);
        assert!(cfg.qa.histogram_bins > 0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("[qa]\nhistogram_bins = 12\n").unwrap();
        assert_eq!(cfg.qa.histogram_bins, 12);
        assert_eq!(cfg.qa.frequency_top_n, 20);
        assert_eq!(cfg.export.format, "csv");
    }
}
