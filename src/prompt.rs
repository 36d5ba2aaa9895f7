use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use dialoguer::{theme::ColorfulTheme, Input};
#[cfg(test)]
use mockall::automock;
use skim::prelude::*;
use tracing::debug;

use crate::mfa::validate_mfa_code;

/// The two questions asked in an interactive run.
#[cfg_attr(test, automock)]
pub trait Prompt {
    /// Pick one of `profiles`, starting on `default`. `None` when the user backs out.
    fn select_profile(&self, profiles: &[String], default: &str) -> Result<Option<String>>;

    /// Ask until a well-formed MFA code is entered.
    fn mfa_code(&self, profile: &str) -> Result<String>;
}

/// Move `default` to the front so the picker opens with it under the cursor; the rest
/// keep their order.
pub fn ordered_with_default(profiles: &[String], default: &str) -> Vec<String> {
    let mut ordered: Vec<String> = profiles.to_vec();
    if let Some(pos) = ordered.iter().position(|p| p == default) {
        let name = ordered.remove(pos);
        ordered.insert(0, name);
    }
    ordered
}

/// Fuzzy picker on the terminal for profiles, line input for MFA codes.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn select_profile(&self, profiles: &[String], default: &str) -> Result<Option<String>> {
        let options = SkimOptionsBuilder::default()
            .multi(false)
            .build()
            .map_err(|e| anyhow!("Failed to set up profile picker: {e}"))?;
        let input = ordered_with_default(profiles, default).join("\n");
        let items = SkimItemReader::default().of_bufread(Cursor::new(input));

        let selected = Skim::run_with(&options, Some(items))
            .filter(|out| !out.is_abort)
            .and_then(|out| {
                out.selected_items
                    .first()
                    .map(|item| item.output().to_string())
            });
        debug!("Selected profile: {:?}", selected);
        Ok(selected)
    }

    fn mfa_code(&self, profile: &str) -> Result<String> {
        let theme = ColorfulTheme::default();
        let code = Input::<String>::with_theme(&theme)
            .with_prompt(format!("MFA code for {profile}"))
            .validate_with(|input: &String| validate_mfa_code(input).map_err(|e| e.to_string()))
            .interact_text()
            .context("Failed to read MFA code")?;
        Ok(code)
    }
}
