use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use ini::Ini;
use regex::Regex;
use tracing::{debug, warn};

use crate::Error;

pub const DEFAULT_PROFILE: &str = "default";

/// Location of the AWS CLI config file, honouring `AWS_CONFIG_FILE`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("AWS_CONFIG_FILE").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".aws").join("config"))
}

/// Location of the shared credentials file, honouring `AWS_SHARED_CREDENTIALS_FILE`.
pub fn credentials_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("AWS_SHARED_CREDENTIALS_FILE").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".aws").join("credentials"))
}

/// The profile preselected in the prompt: `AWS_DEFAULT_PROFILE`, then `AWS_PROFILE`,
/// then "default".
pub fn default_selection() -> String {
    default_selection_from(|key| env::var(key).ok())
}

fn default_selection_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["AWS_DEFAULT_PROFILE", "AWS_PROFILE"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Extract every `[profile NAME]` heading from the raw config text, in file order, and
/// append "default". Fails with [`Error::NoProfilesFound`] when there is no heading.
pub fn profile_names(text: &str, path: &Path) -> Result<Vec<String>> {
    let heading = Regex::new(r"(?m)^[ \t]*\[[ \t]*profile[ \t]+([^\]\r\n]+?)[ \t]*\]")?;
    let mut names: Vec<String> = Vec::new();
    for cap in heading.captures_iter(text) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if names.is_empty() {
        return Err(Error::NoProfilesFound(path.to_path_buf()).into());
    }
    if !names.iter().any(|name| name == DEFAULT_PROFILE) {
        names.push(DEFAULT_PROFILE.to_string());
    }
    Ok(names)
}

/// Read a file that may legitimately be absent; a missing file reads as empty.
pub fn read_optional(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist", path.display());
            Ok(String::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    pub role_arn: String,
    pub mfa_serial: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub role_arn: Option<String>,
    pub mfa_serial: Option<String>,
    pub source_profile: Option<String>,
}

impl Profile {
    /// Both `role_arn` and `mfa_serial` present and non-empty.
    pub fn role(&self) -> Option<RoleConfig> {
        match (self.role_arn.as_deref(), self.mfa_serial.as_deref()) {
            (Some(role_arn), Some(mfa_serial))
                if !role_arn.is_empty() && !mfa_serial.is_empty() =>
            {
                Some(RoleConfig {
                    role_arn: role_arn.to_string(),
                    mfa_serial: mfa_serial.to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn is_assume_role_capable(&self) -> bool {
        self.role().is_some()
    }
}

/// The AWS config file as read for one run: its raw text for listing profiles, and the
/// key/value view used for role lookups.
#[derive(Debug, Clone)]
pub struct AwsFiles {
    pub config_path: PathBuf,
    config_text: String,
    pub store: ProfileStore,
}

impl AwsFiles {
    pub fn load(config_path: &Path, credentials_path: Option<&Path>) -> Result<Self> {
        let config = read_optional(config_path)?;
        let credentials = match credentials_path {
            Some(path) => read_optional(path)?,
            None => String::new(),
        };
        Ok(Self::from_text(config_path, &config, &credentials))
    }

    pub fn from_text(config_path: &Path, config: &str, credentials: &str) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            config_text: config.to_string(),
            store: ProfileStore::parse(config, credentials),
        }
    }

    pub fn profile_names(&self) -> Result<Vec<String>> {
        profile_names(&self.config_text, &self.config_path)
    }
}

/// Key/value store over the AWS config and shared credentials files, answering the
/// same questions as `aws configure get <profile>.<key>`.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    config: Ini,
    credentials: Ini,
}

impl ProfileStore {
    /// Unparseable input is logged and treated as empty, so lookups against it fail
    /// softly instead of aborting the run.
    pub fn parse(config: &str, credentials: &str) -> Self {
        Self {
            config: parse_ini(config, "config"),
            credentials: parse_ini(credentials, "credentials"),
        }
    }

    /// Look up `key` for `profile`. The profile being absent from both files is a
    /// [`Error::RoleLookupFailed`]; a present profile without the key is `Ok(None)`.
    pub fn get(&self, profile: &str, key: &str) -> Result<Option<String>, Error> {
        let sections = config_section_names(profile);
        let config = sections
            .iter()
            .find_map(|name| self.config.section(Some(name.as_str())));
        let credentials = self.credentials.section(Some(profile));
        if config.is_none() && credentials.is_none() {
            return Err(Error::RoleLookupFailed {
                profile: profile.to_string(),
                reason: "profile not found".to_string(),
            });
        }
        let value = config
            .and_then(|props| props.get(key))
            .or_else(|| credentials.and_then(|props| props.get(key)))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(value)
    }

    pub fn profile(&self, name: &str) -> Result<Profile, Error> {
        Ok(Profile {
            name: name.to_string(),
            role_arn: self.get(name, "role_arn")?,
            mfa_serial: self.get(name, "mfa_serial")?,
            source_profile: self.get(name, "source_profile")?,
        })
    }

    /// Lookup failures count as "not capable".
    pub fn is_assume_role_capable(&self, name: &str) -> bool {
        match self.profile(name) {
            Ok(profile) => profile.is_assume_role_capable(),
            Err(e) => {
                debug!("{e}; treating '{name}' as a plain profile");
                false
            }
        }
    }
}

fn parse_ini(text: &str, what: &str) -> Ini {
    Ini::load_from_str(text).unwrap_or_else(|e| {
        warn!("Ignoring unparseable AWS {what} file: {e}");
        Ini::new()
    })
}

fn config_section_names(profile: &str) -> Vec<String> {
    if profile == DEFAULT_PROFILE {
        vec![DEFAULT_PROFILE.to_string(), format!("profile {DEFAULT_PROFILE}")]
    } else {
        vec![format!("profile {profile}")]
    }
}
