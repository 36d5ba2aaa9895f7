use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no [profile ...] sections found in {}", .0.display())]
    NoProfilesFound(PathBuf),
    #[error("MFA code must be exactly 6 digits")]
    InvalidMfaFormat,
    #[error("could not look up role settings for profile '{profile}': {reason}")]
    RoleLookupFailed { profile: String, reason: String },
    #[error("AssumeRole failed: {0}")]
    AssumeRoleFailed(String),
    #[error("could not copy to clipboard: {0}")]
    ClipboardFailed(String),
    #[error("{0}")]
    InvalidCliOption(String),
}
