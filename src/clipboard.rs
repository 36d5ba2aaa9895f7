use std::{
    env,
    io::Write,
    process::{Command, Stdio},
};

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::Error;

#[cfg_attr(test, automock)]
pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<(), Error>;
}

/// Pipes text into an external clipboard command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandClipboard {
    argv: Option<Vec<String>>,
}

impl CommandClipboard {
    /// Use `argv` if given, otherwise detect the platform's clipboard tool at copy time.
    pub fn new(argv: Option<Vec<String>>) -> Self {
        Self {
            argv: argv.filter(|argv| !argv.is_empty()),
        }
    }

    fn candidates(&self) -> Vec<Vec<String>> {
        if let Some(argv) = &self.argv {
            return vec![argv.clone()];
        }
        let wayland = env::var_os("WAYLAND_DISPLAY").is_some();
        default_candidates(cfg!(target_os = "macos"), wayland)
            .into_iter()
            .map(|argv| argv.iter().map(|s| s.to_string()).collect())
            .collect()
    }
}

fn default_candidates(macos: bool, wayland: bool) -> Vec<&'static [&'static str]> {
    let mut candidates: Vec<&'static [&'static str]> = Vec::new();
    if macos {
        candidates.push(&["pbcopy"]);
    }
    if wayland {
        candidates.push(&["wl-copy"]);
    }
    candidates.push(&["xclip", "-selection", "clipboard"]);
    candidates.push(&["xsel", "--clipboard", "--input"]);
    candidates
}

impl Clipboard for CommandClipboard {
    fn copy(&self, text: &str) -> Result<(), Error> {
        let mut last_error = String::from("no clipboard command available");
        for argv in self.candidates() {
            match pipe_into(&argv, text) {
                Ok(()) => {
                    debug!("Copied credentials with {}", argv[0]);
                    return Ok(());
                }
                Err(e) => {
                    debug!("{} failed: {e}", argv[0]);
                    last_error = format!("{}: {e}", argv[0]);
                }
            }
        }
        Err(Error::ClipboardFailed(last_error))
    }
}

fn pipe_into(argv: &[String], text: &str) -> std::io::Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| std::io::Error::other("empty command"))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("exited with {status}")))
    }
}
