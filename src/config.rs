//! Configuration file support.
//!
//! Loads `.clinlens.toml` files specifying where reference data lives and
//! how annotation output is shaped.
//!
//! # Example Configuration
//!
//! ```toml
//! [reference]
//! data-dir = "/var/lib/clinlens"
//!
//! [output]
//! sample-name = "SAMPLE"
//! matched-only = false
//! ```
//!
//! # Config File Locations
//!
//! Configuration is searched in this order (first found wins):
//! 1. `.clinlens.toml` in current directory
//! 2. `~/.config/clinlens/config.toml`
//!
//! CLI flags take precedence over config file settings.

use std::fs;
use std::path::{Path, PathBuf};

/// Parsed configuration from a .clinlens.toml file.
#[derive(Debug, Clone, Default)]
pub struct ClinLensConfig {
    /// Directory probed for reference data files.
    pub data_dir: Option<PathBuf>,
    /// Sample name used in VCF output.
    pub sample_name: Option<String>,
    /// Emit only matched variants in output.
    pub matched_only: bool,
}

impl ClinLensConfig {
    /// Load configuration from the default locations.
    pub fn load() -> Option<Self> {
        let cwd_config = PathBuf::from(".clinlens.toml");
        if cwd_config.exists() {
            if let Ok(config) = Self::load_from_path(&cwd_config) {
                return Some(config);
            }
        }

        if let Some(home) = std::env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("clinlens")
                .join("config.toml");
            if home_config.exists() {
                if let Ok(config) = Self::load_from_path(&home_config) {
                    return Some(config);
                }
            }
        }

        None
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse configuration content. Line-based TOML subset: sections,
    /// quoted strings, and booleans.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        let mut section = String::new();

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');

            match (section.as_str(), key) {
                ("reference", "data-dir") => config.data_dir = Some(PathBuf::from(value)),
                ("output", "sample-name") => config.sample_name = Some(value.to_string()),
                ("output", "matched-only") => config.matched_only = value == "true",
                _ => {}
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = ClinLensConfig::parse("");
        assert!(config.data_dir.is_none());
        assert!(!config.matched_only);
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
# reference location
[reference]
data-dir = "/var/lib/clinlens"

[output]
sample-name = "NA12878"
matched-only = true
"#;
        let config = ClinLensConfig::parse(content);
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/var/lib/clinlens")));
        assert_eq!(config.sample_name.as_deref(), Some("NA12878"));
        assert!(config.matched_only);
    }

    #[test]
    fn test_keys_require_their_section() {
        let config = ClinLensConfig::parse("data-dir = \"/x\"\n");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reference]\ndata-dir = \"/data\"\n").unwrap();
        let config = ClinLensConfig::load_from_path(&path).unwrap();
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/data")));
    }
}
