use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::debug;

use crate::{
    clipboard::CommandClipboard,
    handoff::Handoff,
    mfa::{self, CodeSource},
    profiles,
    profiles::AwsFiles,
    prompt::TerminalPrompt,
    settings::Settings,
    shell::{Format, Shell},
    sts::{self, SdkAssumeRole},
    switcher::Switcher,
    Error,
};

/// Pick an AWS profile and, for MFA-protected roles, assume it into the current shell.
///
/// Without TARGET a picker lists the profiles of the AWS config file and the result is
/// left in hand-off files for the `awsp` shell function (see --shell-init). With TARGET
/// the variables to export are printed for `eval`.
#[derive(Debug, Clone, Parser)]
#[command(name = "awsp", version, about, long_about)]
pub struct Cli {
    /// Profile name, or a role ARN (arn:aws:iam::<account>:role/<name>) to assume directly
    #[arg(value_name = "PROFILE_OR_ROLE_ARN")]
    pub target: Option<String>,

    /// Six-digit MFA code
    #[arg(short = 'm', long, value_name = "CODE")]
    pub mfa_code: Option<String>,

    /// Base32 TOTP secret to generate the MFA code from; -m takes precedence
    #[arg(long, env = "AWSP_TOTP_SECRET", hide_env_values = true, value_name = "SECRET")]
    pub totp_secret: Option<String>,

    /// Profile whose credentials call AssumeRole (role ARN targets only)
    #[arg(short = 'p', long, value_name = "PROFILE")]
    pub source_profile: Option<String>,

    /// MFA device serial number (role ARN targets only) [default: the source profile's mfa_serial]
    #[arg(long, env = "SERIAL_NUMBER", value_name = "ARN")]
    pub serial_number: Option<String>,

    /// How variables are printed [default: bash, or the calling shell function's shell]
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<Format>,

    /// Scope the hand-off files to this id (the shell function passes its PID)
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Shell that evaluates the output and the credentials hand-off file (set by the shell function)
    #[arg(long, value_enum, value_name = "SHELL", hide = true, requires = "session")]
    pub wrapper_shell: Option<Shell>,

    /// Print the `awsp` shell function for SHELL and exit
    #[arg(long, value_enum, value_name = "SHELL", conflicts_with = "target")]
    pub shell_init: Option<Shell>,

    /// AWS CLI config file [default: $AWS_CONFIG_FILE or ~/.aws/config]
    #[arg(long, value_name = "PATH")]
    pub aws_config: Option<PathBuf>,

    /// awsp settings file [default: $AWSP_CONFIG or <config dir>/awsp/config.toml]
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.validate_arguments()?;

        if let Some(shell) = self.shell_init {
            print!("{}", shell.wrapper());
            return Ok(());
        }

        let settings = Settings::load(self.config.as_deref())?;
        let config_path = self
            .aws_config
            .clone()
            .or_else(profiles::config_path)
            .context("Failed to determine AWS config file path")?;
        debug!("AWS config file: {}", config_path.display());
        let files = AwsFiles::load(&config_path, profiles::credentials_path().as_deref())?;
        let code = self.code_source();

        let switcher = Switcher::new(
            TerminalPrompt,
            SdkAssumeRole::new(settings.region.clone()).with_config_file(config_path),
            CommandClipboard::new(settings.clipboard_command.clone()),
            files,
            settings,
        );

        match self.target.as_deref() {
            None => {
                let handoff = Handoff::for_session(self.session.as_deref())?;
                switcher
                    .interactive(
                        &handoff,
                        &profiles::default_selection(),
                        &code,
                        self.handoff_format(),
                    )
                    .await
            }
            Some(target) => {
                if self.session.is_some() {
                    Handoff::for_session(self.session.as_deref())?.discard_stale()?;
                }
                let env = if sts::is_role_arn(target) {
                    switcher
                        .direct_role_arn(
                            target,
                            self.source_profile.clone(),
                            self.serial_number.clone(),
                            &code,
                        )
                        .await?
                } else {
                    switcher.direct_profile(target, &code).await?
                };
                print!("{}", self.output_format().render(&env)?);
                Ok(())
            }
        }
    }

    /// Checks clap cannot express. Failures are [`Error::InvalidCliOption`].
    pub fn validate_arguments(&self) -> Result<()> {
        if let Some(code) = &self.mfa_code {
            mfa::validate_mfa_code(code)
                .map_err(|e| Error::InvalidCliOption(format!("-m/--mfa-code: {e}")))?;
        }
        let is_arn = self.target.as_deref().is_some_and(sts::is_role_arn);
        if self.source_profile.is_some() && !is_arn {
            return Err(Error::InvalidCliOption(
                "-p/--source-profile only applies to a role ARN target".to_string(),
            )
            .into());
        }
        if let Some(session) = &self.session {
            let valid = !session.is_empty()
                && session
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(Error::InvalidCliOption(format!(
                    "--session: '{session}' must be letters, digits, '-' or '_'"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// `-m` wins over a TOTP secret. The secret is only turned into a code once a role
    /// is actually assumed.
    pub fn code_source(&self) -> CodeSource {
        match (&self.mfa_code, &self.totp_secret) {
            (Some(code), _) => CodeSource::Given(code.clone()),
            (None, Some(secret)) => {
                debug!("MFA codes will be generated from the TOTP secret");
                CodeSource::Totp(secret.clone())
            }
            (None, None) => CodeSource::Prompt,
        }
    }

    /// Format of direct-run output: `--format`, else what the calling shell function
    /// evaluates, else bash.
    pub fn output_format(&self) -> Format {
        self.format
            .or(self.wrapper_shell.map(Shell::format))
            .unwrap_or_default()
    }

    /// Format of the credentials hand-off file. Pinned to the shell function's shell,
    /// which sources the file, whatever `--format` says.
    pub fn handoff_format(&self) -> Format {
        self.wrapper_shell
            .map(Shell::format)
            .unwrap_or_else(|| self.output_format().for_handoff())
    }
}
