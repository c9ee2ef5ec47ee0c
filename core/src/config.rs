use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Tool configuration, loadable from a `stigforge.toml` file. Every field is
/// optional in the file; omitted fields keep their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Catalog database location.
    pub db_path: PathBuf,
    /// Playbook template the output document is seeded from.
    pub template_path: PathBuf,
    /// Directory generated playbooks are written into.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("fixes.db"),
            template_path: PathBuf::from("stig_template.yaml"),
            output_dir: PathBuf::from("playbook_output"),
        }
    }
}

impl Config {
    /// Load configuration. Resolution order: an explicit path (missing file
    /// is an error), `./stigforge.toml`, the user config dir
    /// (`<config>/stigforge/config.toml`), then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = Path::new("stigforge.toml");
        if local.exists() {
            return Self::from_file(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("stigforge").join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}
