use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temporary credentials returned by AssumeRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    /// The `KEY=value` block placed on the clipboard.
    pub fn clipboard_text(&self, region: &str) -> String {
        format!(
            "AWS_ACCESS_KEY_ID={}\nAWS_SECRET_ACCESS_KEY={}\nAWS_SESSION_TOKEN={}\nAWS_REGION={}\n",
            self.access_key_id, self.secret_access_key, self.session_token, region
        )
    }
}

/// Environment variables handed back to the calling shell. Unset fields are neither
/// printed nor exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Environment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_default_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_expiration: Option<DateTime<Utc>>,
}

impl Environment {
    /// Just the profile selection, no credentials.
    pub fn for_profile(profile: &str) -> Self {
        Self {
            aws_profile: Some(profile.to_string()),
            aws_default_profile: Some(profile.to_string()),
            ..Default::default()
        }
    }

    /// Credentials assumed through a named profile.
    pub fn for_profile_credentials(profile: &str, creds: &Credentials, region: &str) -> Self {
        Self {
            aws_profile: Some(profile.to_string()),
            aws_default_profile: Some(profile.to_string()),
            ..Self::for_credentials(creds, region)
        }
    }

    /// Credentials assumed straight from a role ARN.
    pub fn for_credentials(creds: &Credentials, region: &str) -> Self {
        Self {
            aws_access_key_id: Some(creds.access_key_id.clone()),
            aws_secret_access_key: Some(creds.secret_access_key.clone()),
            aws_region: Some(region.to_string()),
            aws_session_token: Some(creds.session_token.clone()),
            aws_expiration: creds.expiration,
            ..Default::default()
        }
    }

    /// Shell variables in export order. The expiration is informational and only
    /// appears in JSON output.
    pub fn variables(&self) -> Vec<(&'static str, &str)> {
        [
            ("AWS_ACCESS_KEY_ID", &self.aws_access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.aws_secret_access_key),
            ("AWS_REGION", &self.aws_region),
            ("AWS_SESSION_TOKEN", &self.aws_session_token),
            ("AWS_PROFILE", &self.aws_profile),
            ("AWS_DEFAULT_PROFILE", &self.aws_default_profile),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}
