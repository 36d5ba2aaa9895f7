use anyhow::{anyhow, Context, Result};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::Error;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;

/// Accept exactly six ASCII digits.
pub fn validate_mfa_code(code: &str) -> Result<(), Error> {
    if code.len() == DIGITS && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidMfaFormat)
    }
}

/// Where an MFA code comes from when one is needed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CodeSource {
    /// Given on the command line; always used.
    Given(String),
    /// Base32 TOTP secret; a code is generated only when a role is actually assumed.
    Totp(String),
    /// Ask the user (interactive runs), or go without.
    #[default]
    Prompt,
}

impl CodeSource {
    pub fn is_given(&self) -> bool {
        matches!(self, CodeSource::Given(_))
    }

    /// The code, if one can be had without asking the user.
    pub fn code(&self) -> Result<Option<String>> {
        match self {
            CodeSource::Given(code) => Ok(Some(code.clone())),
            CodeSource::Totp(secret) => totp_code(secret).map(Some),
            CodeSource::Prompt => Ok(None),
        }
    }
}

/// Current code for a base32 TOTP secret, as a virtual MFA device would show it.
pub fn totp_code(secret: &str) -> Result<String> {
    let bytes = Secret::Encoded(secret.trim().to_string())
        .to_bytes()
        .map_err(|e| anyhow!("Invalid TOTP secret: {e:?}"))?;
    let totp = TOTP::new_unchecked(Algorithm::SHA1, DIGITS, 1, STEP_SECONDS, bytes);
    totp.generate_current()
        .context("System clock is set before the Unix epoch")
}
