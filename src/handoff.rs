use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{credentials::Environment, shell::Format};

/// The pair of files through which an interactive run hands its result to the parent
/// shell: the chosen profile name, and optionally the credentials as shell statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    profile_path: PathBuf,
    credentials_path: PathBuf,
}

impl Handoff {
    /// Files under `home`, suffixed with `session` when given so that concurrent shells
    /// never share a mailbox.
    pub fn new(home: &Path, session: Option<&str>) -> Self {
        let suffix = session.map(|id| format!(".{id}")).unwrap_or_default();
        Self {
            profile_path: home.join(format!(".awsp{suffix}")),
            credentials_path: home.join(format!(".awsp-credentials{suffix}")),
        }
    }

    pub fn for_session(session: Option<&str>) -> Result<Self> {
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(Self::new(&home, session))
    }

    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Remove both files if an earlier, interrupted run left them behind. A stale
    /// selection would make the wrapper treat the next direct run as interactive.
    pub fn discard_stale(&self) -> Result<()> {
        remove_if_present(&self.profile_path)?;
        remove_if_present(&self.credentials_path)
    }

    /// Record the selection. An empty name means "nothing selected".
    pub fn write_profile(&self, profile: &str) -> Result<()> {
        fs::write(&self.profile_path, profile)
            .with_context(|| format!("Failed to write {}", self.profile_path.display()))?;
        debug!("Wrote selection to {}", self.profile_path.display());
        Ok(())
    }

    /// Overwrite the credentials file with `env` rendered for the consuming shell.
    pub fn write_credentials(&self, env: &Environment, format: Format) -> Result<()> {
        let text = format.for_handoff().render(env)?;
        let mut file = create_private(&self.credentials_path)
            .with_context(|| format!("Failed to create {}", self.credentials_path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write {}", self.credentials_path.display()))?;
        debug!("Wrote credentials to {}", self.credentials_path.display());
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed stale hand-off file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
