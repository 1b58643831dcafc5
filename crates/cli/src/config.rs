use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pagescribe_core::{CompressionProfile, CompressionTier, TierTable};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "pagescribe.toml";
const DEFAULT_STORE_PATH: &str = "pagescribe.sqlite";
const DEFAULT_UPLOAD_ROOT: &str = "uploads";
const DEFAULT_PROVIDER: &str = "openai";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub uploads: UploadSection,
    #[serde(default)]
    pub compression: CompressionSection,
    #[serde(default)]
    pub vision: VisionSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadSection {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompressionSection {
    pub tier: Option<String>,
    #[serde(default)]
    pub tiers: HashMap<String, ProfileOverride>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileOverride {
    pub max_width: u32,
    pub quality: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisionSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub ocr_langs: Option<Vec<String>>,
}

impl AppConfig {
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    pub fn upload_root(&self) -> PathBuf {
        self.uploads
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_ROOT))
    }

    pub fn default_tier(&self) -> Result<CompressionTier> {
        match &self.compression.tier {
            Some(name) => name
                .parse()
                .map_err(|e| anyhow!("invalid [compression] tier: {e}")),
            None => Ok(CompressionTier::default()),
        }
    }

    pub fn tier_table(&self) -> Result<TierTable> {
        let mut table = TierTable::default();
        for (name, profile) in &self.compression.tiers {
            let tier: CompressionTier = name
                .parse()
                .map_err(|e| anyhow!("invalid [compression.tiers] key: {e}"))?;
            table
                .set_profile(
                    tier,
                    CompressionProfile {
                        max_width: profile.max_width,
                        quality: profile.quality,
                    },
                )
                .with_context(|| format!("invalid profile for tier {tier}"))?;
        }
        Ok(table)
    }

    /// Provider name, with `PAGESCRIBE_PROVIDER` taking precedence.
    pub fn provider(&self) -> String {
        env::var("PAGESCRIBE_PROVIDER")
            .ok()
            .or_else(|| self.vision.provider.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
    }

    /// Model name, with `PAGESCRIBE_MODEL` taking precedence.
    pub fn model(&self) -> Option<String> {
        env::var("PAGESCRIBE_MODEL")
            .ok()
            .or_else(|| self.vision.model.clone())
    }

    pub fn ocr_langs(&self) -> Vec<String> {
        self.vision
            .ocr_langs
            .clone()
            .filter(|langs| !langs.is_empty())
            .unwrap_or_else(|| vec!["eng".to_string()])
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))?;
    config.default_tier()?;
    config.tier_table()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store_path(), PathBuf::from("pagescribe.sqlite"));
        assert_eq!(config.upload_root(), PathBuf::from("uploads"));
        assert_eq!(config.default_tier().unwrap(), CompressionTier::Medium);
        assert_eq!(config.tier_table().unwrap(), TierTable::default());
        assert_eq!(config.ocr_langs(), vec!["eng".to_string()]);
    }

    #[test]
    fn sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagescribe.toml");
        fs::write(
            &path,
            r#"
[store]
path = "/data/journal.sqlite"

[compression]
tier = "High"

[compression.tiers.high]
max_width = 800
quality = 0.4

[vision]
model = "gpt-4o"
ocr_langs = ["eng", "deu"]
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/data/journal.sqlite"));
        assert_eq!(config.default_tier().unwrap(), CompressionTier::High);
        let high = config
            .tier_table()
            .unwrap()
            .profile(CompressionTier::High)
            .unwrap();
        assert_eq!(high.max_width, 800);
        assert_eq!(config.ocr_langs().len(), 2);
    }

    #[test]
    fn out_of_range_quality_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(
            &path,
            "[compression.tiers.low]\nmax_width = 1000\nquality = 0.0\n",
        )
        .unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[compression]\ntier = \"extreme\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
