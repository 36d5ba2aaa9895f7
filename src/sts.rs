use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use aws_config::{
    profile::{
        profile_file::{ProfileFileKind, ProfileFiles},
        ProfileFileCredentialsProvider,
    },
    BehaviorVersion, Region,
};
use aws_sdk_sts::{error::DisplayErrorContext, Client as StsClient};
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::{credentials::Credentials, Error};

const SESSION_NAME_PREFIX: &str = "awsp-";
const MAX_SESSION_NAME_LEN: usize = 64;

static ROLE_ARN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^arn:aws:iam::[0-9]{12}:role/.+$").expect("role ARN pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaToken {
    pub serial_number: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// Profile whose credentials make the call.
    pub source_profile: String,
    pub role_arn: String,
    pub session_name: String,
    pub mfa: Option<MfaToken>,
    pub duration_seconds: Option<i32>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AssumeRole {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<Credentials>;
}

/// Whether `target` is an IAM role ARN rather than a profile name.
pub fn is_role_arn(target: &str) -> bool {
    ROLE_ARN.is_match(target)
}

/// `awsp-<name>` restricted to the characters STS accepts in a role session name.
pub fn session_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "+=,.@_-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{SESSION_NAME_PREFIX}{sanitized}")
        .chars()
        .take(MAX_SESSION_NAME_LEN)
        .collect()
}

/// Session name for an ARN target: derived from the role name after the last `/`.
pub fn session_name_for_arn(role_arn: &str) -> String {
    let role = role_arn.rsplit('/').next().unwrap_or(role_arn);
    session_name(role)
}

/// AssumeRole through the AWS SDK, calling as the request's source profile.
#[derive(Debug, Clone)]
pub struct SdkAssumeRole {
    fallback_region: String,
    config_file: Option<PathBuf>,
}

impl SdkAssumeRole {
    pub fn new(fallback_region: impl Into<String>) -> Self {
        Self {
            fallback_region: fallback_region.into(),
            config_file: None,
        }
    }

    /// Read profiles from `path` instead of the SDK's default config file. The shared
    /// credentials file is still found the usual way.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    fn profile_files(&self) -> ProfileFiles {
        match &self.config_file {
            Some(path) => ProfileFiles::builder()
                .with_file(ProfileFileKind::Config, path.clone())
                .include_default_credentials_file(true)
                .build(),
            None => ProfileFiles::default(),
        }
    }

    async fn client(&self, source_profile: &str) -> StsClient {
        let files = self.profile_files();
        let provider = || {
            ProfileFileCredentialsProvider::builder()
                .profile_files(files.clone())
                .profile_name(source_profile)
                .build()
        };
        let loaded = aws_config::defaults(BehaviorVersion::latest())
            .profile_files(files.clone())
            .profile_name(source_profile)
            .credentials_provider(provider())
            .load()
            .await;

        let config = match loaded.region() {
            Some(region) => {
                debug!("Using region: {}", region);
                loaded
            }
            None => {
                debug!(
                    "No region configured for '{}', using {}",
                    source_profile, self.fallback_region
                );
                aws_config::defaults(BehaviorVersion::latest())
                    .profile_files(files.clone())
                    .profile_name(source_profile)
                    .credentials_provider(provider())
                    .region(Region::new(self.fallback_region.clone()))
                    .load()
                    .await
            }
        };
        StsClient::new(&config)
    }
}

#[async_trait]
impl AssumeRole for SdkAssumeRole {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<Credentials> {
        info!("Calling AWS STS AssumeRole");
        debug!("Source profile: {}", request.source_profile);
        debug!("Role ARN: {}", request.role_arn);
        debug!("Session name: {}", request.session_name);
        debug!(
            "MFA serial: {:?}",
            request.mfa.as_ref().map(|m| &m.serial_number)
        );

        let client = self.client(&request.source_profile).await;
        let (serial_number, token_code) = match request.mfa {
            Some(MfaToken {
                serial_number,
                code,
            }) => (Some(serial_number), Some(code)),
            None => (None, None),
        };

        let response = client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .set_serial_number(serial_number)
            .set_token_code(token_code)
            .set_duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|e| Error::AssumeRoleFailed(DisplayErrorContext(e).to_string()))?;

        let sts_creds = response.credentials().ok_or_else(|| {
            Error::AssumeRoleFailed("AWS STS returned no credentials".to_string())
        })?;
        let expiration = sts_creds.expiration();

        let credentials = Credentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expiration: DateTime::<Utc>::from_timestamp(
                expiration.secs(),
                expiration.subsec_nanos(),
            ),
        };

        info!("Obtained temporary credentials for {}", request.role_arn);
        Ok(credentials)
    }
}
