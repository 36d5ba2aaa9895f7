use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    clipboard::Clipboard,
    credentials::{Credentials, Environment},
    handoff::Handoff,
    mfa::{self, CodeSource},
    profiles::AwsFiles,
    prompt::Prompt,
    settings::Settings,
    shell::Format,
    sts::{self, AssumeRole, AssumeRoleRequest, MfaToken},
    Error,
};

/// Drives one run: profile selection, the role-capability check, AssumeRole and the
/// hand-over of the result.
pub struct Switcher<P, S, C> {
    prompt: P,
    sts: S,
    clipboard: C,
    files: AwsFiles,
    settings: Settings,
}

impl<P, S, C> Switcher<P, S, C>
where
    P: Prompt,
    S: AssumeRole,
    C: Clipboard,
{
    pub fn new(prompt: P, sts: S, clipboard: C, files: AwsFiles, settings: Settings) -> Self {
        Self {
            prompt,
            sts,
            clipboard,
            files,
            settings,
        }
    }

    /// Prompt for a profile and leave the result in `handoff` for the parent shell.
    ///
    /// The MFA prompt is skipped when `code` can supply one. Fails with
    /// [`Error::NoProfilesFound`] before writing the selection file.
    pub async fn interactive(
        &self,
        handoff: &Handoff,
        default_profile: &str,
        code: &CodeSource,
        format: Format,
    ) -> Result<()> {
        handoff.discard_stale()?;
        let profiles = self.files.profile_names()?;

        let profile = match self.prompt.select_profile(&profiles, default_profile)? {
            Some(profile) => profile,
            None => {
                info!("No profile selected");
                return handoff.write_profile("");
            }
        };
        handoff.write_profile(&profile)?;

        if !self.files.store.is_assume_role_capable(&profile) {
            info!("Profile '{}' has no role to assume", profile);
            eprintln!("Switched to profile {profile}");
            return Ok(());
        }

        let code = match code.code()? {
            Some(code) => code,
            None => self.prompt.mfa_code(&profile)?,
        };
        let creds = self.assume_profile_role(&profile, code).await?;
        let env = Environment::for_profile_credentials(&profile, &creds, &self.settings.region);
        handoff.write_credentials(&env, format)?;
        self.announce(&profile, &creds);
        Ok(())
    }

    /// Variables for a profile named on the command line. With an MFA code the profile's
    /// role is assumed; without one only the profile name is exported. A TOTP secret
    /// counts as a code only for profiles that have a role to assume.
    pub async fn direct_profile(&self, profile: &str, code: &CodeSource) -> Result<Environment> {
        if matches!(code, CodeSource::Totp(_)) && !self.files.store.is_assume_role_capable(profile)
        {
            debug!("Profile '{}' has no role to assume; TOTP secret unused", profile);
            return Ok(Environment::for_profile(profile));
        }
        let Some(code) = code.code()? else {
            return Ok(Environment::for_profile(profile));
        };
        let creds = self.assume_profile_role(profile, code).await?;
        self.announce(profile, &creds);
        Ok(Environment::for_profile_credentials(
            profile,
            &creds,
            &self.settings.region,
        ))
    }

    /// Variables for a role ARN named on the command line, assumed as `source_profile`
    /// (the configured source profile if `None`). The device is `serial_number` or the
    /// source profile's `mfa_serial`. A given code requires a device; a TOTP secret is
    /// used only when there is one.
    pub async fn direct_role_arn(
        &self,
        role_arn: &str,
        source_profile: Option<String>,
        serial_number: Option<String>,
        code: &CodeSource,
    ) -> Result<Environment> {
        let source_profile =
            source_profile.unwrap_or_else(|| self.settings.source_profile.clone());
        let serial_number = serial_number
            .or_else(|| self.files.store.get(&source_profile, "mfa_serial").ok().flatten());
        let mfa = match (code, serial_number) {
            (CodeSource::Prompt, _) => None,
            (CodeSource::Given(_), None) => {
                return Err(Error::AssumeRoleFailed(format!(
                    "no MFA serial number for source profile '{source_profile}'"
                ))
                .into())
            }
            (CodeSource::Given(code), Some(serial_number)) => Some(MfaToken {
                serial_number,
                code: code.clone(),
            }),
            (CodeSource::Totp(_), None) => {
                debug!("No MFA serial for '{}'; TOTP secret unused", source_profile);
                None
            }
            (CodeSource::Totp(secret), Some(serial_number)) => Some(MfaToken {
                serial_number,
                code: mfa::totp_code(secret)?,
            }),
        };
        let request = AssumeRoleRequest {
            source_profile,
            role_arn: role_arn.to_string(),
            session_name: sts::session_name_for_arn(role_arn),
            mfa,
            duration_seconds: self.settings.duration_seconds,
        };
        let creds = self.call_sts(request).await?;
        self.announce(role_arn, &creds);
        Ok(Environment::for_credentials(&creds, &self.settings.region))
    }

    /// Role settings are looked up again here rather than trusting the earlier
    /// capability check.
    async fn assume_profile_role(&self, profile: &str, code: String) -> Result<Credentials> {
        let role = self
            .files
            .store
            .profile(profile)
            .ok()
            .and_then(|p| p.role())
            .ok_or_else(|| {
                Error::AssumeRoleFailed(format!(
                    "profile '{profile}' needs both role_arn and mfa_serial"
                ))
            })?;
        let request = AssumeRoleRequest {
            source_profile: self.settings.source_profile.clone(),
            role_arn: role.role_arn,
            session_name: sts::session_name(profile),
            mfa: Some(MfaToken {
                serial_number: role.mfa_serial,
                code,
            }),
            duration_seconds: self.settings.duration_seconds,
        };
        self.call_sts(request).await
    }

    async fn call_sts(&self, request: AssumeRoleRequest) -> Result<Credentials> {
        self.sts.assume_role(request).await.map_err(|e| {
            if matches!(e.downcast_ref::<Error>(), Some(Error::AssumeRoleFailed(_))) {
                e
            } else {
                Error::AssumeRoleFailed(format!("{e:#}")).into()
            }
        })
    }

    /// Copy to the clipboard and tell the user. Clipboard trouble only changes the message.
    fn announce(&self, target: &str, creds: &Credentials) {
        let expiry = creds
            .expiration
            .map(|at| format!(" until {}", at.to_rfc3339()))
            .unwrap_or_default();
        match self.clipboard.copy(&creds.clipboard_text(&self.settings.region)) {
            Ok(()) => {
                eprintln!("Assumed role for {target}{expiry}; credentials copied to clipboard")
            }
            Err(e) => {
                warn!("{e}");
                eprintln!("Assumed role for {target}{expiry}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clipboard::MockClipboard, prompt::MockPrompt, sts::MockAssumeRole};
    use pretty_assertions::assert_eq;
    use std::{fs, path::Path};

    const CONFIG: &str = r#"
[default]
mfa_serial = arn:aws:iam::111111111111:mfa/alice

[profile dev]
region = us-west-2

[profile admin]
role_arn = arn:aws:iam::123456789012:role/Admin
mfa_serial = arn:aws:iam::111111111111:mfa/alice
"#;

    fn files(config: &str) -> AwsFiles {
        AwsFiles::from_text(Path::new("/home/u/.aws/config"), config, "")
    }

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "AKIA1".to_string(),
            secret_access_key: "SECRET1".to_string(),
            session_token: "TOKEN1".to_string(),
            expiration: None,
        }
    }

    fn switcher(
        prompt: MockPrompt,
        sts: MockAssumeRole,
        clipboard: MockClipboard,
    ) -> Switcher<MockPrompt, MockAssumeRole, MockClipboard> {
        Switcher::new(prompt, sts, clipboard, files(CONFIG), Settings::default())
    }

    fn quiet_clipboard() -> MockClipboard {
        let mut clipboard = MockClipboard::new();
        clipboard.expect_copy().returning(|_| Ok(()));
        clipboard
    }

    fn given() -> CodeSource {
        CodeSource::Given("123456".to_string())
    }

    fn totp() -> CodeSource {
        CodeSource::Totp("JBSWY3DPEHPK3PXP".to_string())
    }

    fn no_sts() -> MockAssumeRole {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role().never();
        sts
    }

    #[tokio::test]
    async fn assumes_role_and_writes_six_exports() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("100"));

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_profile()
            .withf(|profiles, default| {
                profiles == ["dev", "admin", "default"] && default == "dev"
            })
            .returning(|_, _| Ok(Some("admin".to_string())));
        prompt
            .expect_mfa_code()
            .withf(|profile| profile == "admin")
            .returning(|_| Ok("123456".to_string()));

        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| {
                req.source_profile == "default"
                    && req.role_arn == "arn:aws:iam::123456789012:role/Admin"
                    && req.session_name == "awsp-admin"
                    && req.mfa
                        == Some(MfaToken {
                            serial_number: "arn:aws:iam::111111111111:mfa/alice".to_string(),
                            code: "123456".to_string(),
                        })
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let mut clipboard = MockClipboard::new();
        clipboard
            .expect_copy()
            .withf(|text| text.lines().count() == 4 && text.contains("AWS_SESSION_TOKEN=TOKEN1"))
            .times(1)
            .returning(|_| Ok(()));

        let switcher = switcher(prompt, sts, clipboard);
        switcher
            .interactive(&handoff, "dev", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(handoff.profile_path()).unwrap(), "admin");
        assert_eq!(
            fs::read_to_string(handoff.credentials_path()).unwrap(),
            "export AWS_ACCESS_KEY_ID=AKIA1\n\
             export AWS_SECRET_ACCESS_KEY=SECRET1\n\
             export AWS_REGION=us-east-1\n\
             export AWS_SESSION_TOKEN=TOKEN1\n\
             export AWS_PROFILE=admin\n\
             export AWS_DEFAULT_PROFILE=admin\n"
        );
    }

    #[tokio::test]
    async fn plain_profile_writes_only_selection() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("101"));
        fs::write(handoff.credentials_path(), "export AWS_PROFILE=stale\n").unwrap();

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_profile()
            .returning(|_, _| Ok(Some("dev".to_string())));
        prompt.expect_mfa_code().never();

        let switcher = switcher(prompt, no_sts(), quiet_clipboard());
        switcher
            .interactive(&handoff, "default", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(handoff.profile_path()).unwrap(), "dev");
        assert!(!handoff.credentials_path().exists());
    }

    #[tokio::test]
    async fn aborted_selection_writes_empty_profile() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("102"));

        let mut prompt = MockPrompt::new();
        prompt.expect_select_profile().returning(|_, _| Ok(None));

        let switcher = switcher(prompt, no_sts(), quiet_clipboard());
        switcher
            .interactive(&handoff, "default", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(handoff.profile_path()).unwrap(), "");
    }

    #[tokio::test]
    async fn no_profiles_leaves_no_selection() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("103"));

        let mut prompt = MockPrompt::new();
        prompt.expect_select_profile().never();

        let switcher = Switcher::new(
            prompt,
            no_sts(),
            quiet_clipboard(),
            files("[default]\nregion = us-east-1\n"),
            Settings::default(),
        );
        let e = switcher
            .interactive(&handoff, "default", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap_err();

        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::NoProfilesFound(_))));
        assert!(!handoff.profile_path().exists());
    }

    #[tokio::test]
    async fn given_code_skips_mfa_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("104"));

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_profile()
            .returning(|_, _| Ok(Some("admin".to_string())));
        prompt.expect_mfa_code().never();

        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| req.mfa.as_ref().map(|m| m.code.as_str()) == Some("654321"))
            .returning(|_| Ok(creds()));

        let switcher = switcher(prompt, sts, quiet_clipboard());
        switcher
            .interactive(
                &handoff,
                "default",
                &CodeSource::Given("654321".to_string()),
                Format::Fish,
            )
            .await
            .unwrap();

        let text = fs::read_to_string(handoff.credentials_path()).unwrap();
        assert!(text.starts_with("set -gx AWS_ACCESS_KEY_ID AKIA1;"));
    }

    #[tokio::test]
    async fn assume_role_failure_is_surfaced_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("105"));

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_profile()
            .returning(|_, _| Ok(Some("admin".to_string())));
        prompt
            .expect_mfa_code()
            .returning(|_| Ok("000000".to_string()));

        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .times(1)
            .returning(|_| {
                Err(anyhow::anyhow!(
                    "MultiFactorAuthentication failed with invalid MFA one time pass code"
                ))
            });

        let mut clipboard = MockClipboard::new();
        clipboard.expect_copy().never();

        let switcher = switcher(prompt, sts, clipboard);
        let e = switcher
            .interactive(&handoff, "default", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap_err();

        match e.downcast_ref::<Error>() {
            Some(Error::AssumeRoleFailed(message)) => assert!(message.contains("invalid MFA")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!handoff.credentials_path().exists());
    }

    #[tokio::test]
    async fn clipboard_failure_is_not_fatal() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role().returning(|_| Ok(creds()));
        let mut clipboard = MockClipboard::new();
        clipboard
            .expect_copy()
            .returning(|_| Err(Error::ClipboardFailed("no display".to_string())));

        let switcher = switcher(MockPrompt::new(), sts, clipboard);
        let env = switcher
            .direct_profile("admin", &given())
            .await
            .unwrap();
        assert_eq!(env.aws_access_key_id.as_deref(), Some("AKIA1"));
    }

    #[tokio::test]
    async fn direct_profile_without_code_only_exports_name() {
        let switcher = switcher(MockPrompt::new(), no_sts(), quiet_clipboard());
        let env = switcher.direct_profile("admin", &CodeSource::Prompt).await.unwrap();
        assert_eq!(env, Environment::for_profile("admin"));
    }

    #[tokio::test]
    async fn direct_profile_with_code_needs_role_settings() {
        let switcher = switcher(MockPrompt::new(), no_sts(), quiet_clipboard());
        let e = switcher
            .direct_profile("dev", &given())
            .await
            .unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::AssumeRoleFailed(_))));
    }

    #[tokio::test]
    async fn direct_profile_with_code_exports_six_variables() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role().returning(|_| Ok(creds()));
        let settings = Settings {
            region: "eu-central-1".to_string(),
            ..Settings::default()
        };
        let switcher =
            Switcher::new(MockPrompt::new(), sts, quiet_clipboard(), files(CONFIG), settings);
        let env = switcher
            .direct_profile("admin", &given())
            .await
            .unwrap();
        assert_eq!(
            env,
            Environment::for_profile_credentials("admin", &creds(), "eu-central-1")
        );
    }

    #[tokio::test]
    async fn role_arn_without_code_skips_mfa() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| {
                req.source_profile == "default"
                    && req.role_arn == "arn:aws:iam::123456789012:role/MyRole"
                    && req.session_name == "awsp-MyRole"
                    && req.mfa.is_none()
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let switcher = switcher(MockPrompt::new(), sts, quiet_clipboard());
        let env = switcher
            .direct_role_arn(
                "arn:aws:iam::123456789012:role/MyRole",
                None,
                None,
                &CodeSource::Prompt,
            )
            .await
            .unwrap();
        assert_eq!(env, Environment::for_credentials(&creds(), "us-east-1"));
        assert_eq!(env.aws_profile, None);
    }

    #[tokio::test]
    async fn role_arn_with_code_uses_source_profile_serial() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| {
                req.mfa
                    == Some(MfaToken {
                        serial_number: "arn:aws:iam::111111111111:mfa/alice".to_string(),
                        code: "123456".to_string(),
                    })
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let switcher = switcher(MockPrompt::new(), sts, quiet_clipboard());
        switcher
            .direct_role_arn(
                "arn:aws:iam::123456789012:role/MyRole",
                None,
                None,
                &given(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn role_arn_with_explicit_source_and_serial() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| {
                req.source_profile == "dev"
                    && req.mfa.as_ref().map(|m| m.serial_number.as_str())
                        == Some("arn:aws:iam::222222222222:mfa/bob")
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let switcher = switcher(MockPrompt::new(), sts, quiet_clipboard());
        switcher
            .direct_role_arn(
                "arn:aws:iam::123456789012:role/MyRole",
                Some("dev".to_string()),
                Some("arn:aws:iam::222222222222:mfa/bob".to_string()),
                &given(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn role_arn_code_without_serial_fails() {
        let switcher = switcher(MockPrompt::new(), no_sts(), quiet_clipboard());
        let e = switcher
            .direct_role_arn(
                "arn:aws:iam::123456789012:role/MyRole",
                Some("dev".to_string()),
                None,
                &given(),
            )
            .await
            .unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::AssumeRoleFailed(_))));
    }

    #[tokio::test]
    async fn totp_secret_is_ignored_for_plain_profile() {
        let switcher = switcher(MockPrompt::new(), no_sts(), quiet_clipboard());
        let env = switcher.direct_profile("dev", &totp()).await.unwrap();
        assert_eq!(env, Environment::for_profile("dev"));

        let broken = CodeSource::Totp("not base32!".to_string());
        let env = switcher.direct_profile("dev", &broken).await.unwrap();
        assert_eq!(env, Environment::for_profile("dev"));
    }

    #[tokio::test]
    async fn totp_secret_generates_code_for_role_profile() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| {
                req.mfa
                    .as_ref()
                    .is_some_and(|m| mfa::validate_mfa_code(&m.code).is_ok())
            })
            .times(1)
            .returning(|_| Ok(creds()));

        let switcher = switcher(MockPrompt::new(), sts, quiet_clipboard());
        let env = switcher.direct_profile("admin", &totp()).await.unwrap();
        assert_eq!(env.aws_profile.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn totp_secret_is_not_read_for_plain_interactive_selection() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("106"));

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_profile()
            .returning(|_, _| Ok(Some("dev".to_string())));
        prompt.expect_mfa_code().never();

        let switcher = switcher(prompt, no_sts(), quiet_clipboard());
        switcher
            .interactive(
                &handoff,
                "default",
                &CodeSource::Totp("not base32!".to_string()),
                Format::Bash,
            )
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(handoff.profile_path()).unwrap(), "dev");
    }

    #[tokio::test]
    async fn interactive_run_discards_stale_selection() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(dir.path(), Some("107"));
        fs::write(handoff.profile_path(), "stale").unwrap();

        let switcher = Switcher::new(
            MockPrompt::new(),
            no_sts(),
            quiet_clipboard(),
            files("[default]\nregion = us-east-1\n"),
            Settings::default(),
        );
        let e = switcher
            .interactive(&handoff, "default", &CodeSource::Prompt, Format::Bash)
            .await
            .unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::NoProfilesFound(_))));
        assert!(!handoff.profile_path().exists());
    }

    #[tokio::test]
    async fn role_arn_with_totp_but_no_serial_skips_mfa() {
        let mut sts = MockAssumeRole::new();
        sts.expect_assume_role()
            .withf(|req| req.source_profile == "dev" && req.mfa.is_none())
            .times(1)
            .returning(|_| Ok(creds()));

        let switcher = switcher(MockPrompt::new(), sts, quiet_clipboard());
        switcher
            .direct_role_arn(
                "arn:aws:iam::123456789012:role/MyRole",
                Some("dev".to_string()),
                None,
                &CodeSource::Totp("not base32!".to_string()),
            )
            .await
            .unwrap();
    }
}
