use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::profiles::DEFAULT_PROFILE;

/// Region exported as `AWS_REGION` alongside assumed credentials.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Tool settings, read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub region: String,
    pub source_profile: String,
    pub duration_seconds: Option<i32>,
    pub clipboard_command: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            source_profile: DEFAULT_PROFILE.to_string(),
            duration_seconds: None,
            clipboard_command: None,
        }
    }
}

impl Settings {
    /// `$AWSP_CONFIG`, else `<config dir>/awsp/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = env::var_os("AWSP_CONFIG").filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("awsp").join("config.toml"))
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text)
                .with_context(|| format!("Failed to parse settings file {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
