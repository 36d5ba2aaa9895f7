use anyhow::Result;
use clap::ValueEnum;

use crate::credentials::Environment;

/// How exported variables are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    #[default]
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Json,
}

impl Format {
    /// Format used for the credentials hand-off file, which is always sourced by a shell.
    pub fn for_handoff(self) -> Format {
        match self {
            Format::Json => Format::Bash,
            other => other,
        }
    }

    pub fn render(self, env: &Environment) -> Result<String> {
        let text = match self {
            Format::Bash | Format::Zsh => lines(env, |name, value| {
                format!("export {}={}", name, posix_quote(value))
            }),
            Format::Fish => lines(env, |name, value| {
                format!("set -gx {} {};", name, fish_quote(value))
            }),
            Format::PowerShell => lines(env, |name, value| {
                format!("$env:{}='{}'", name, value.replace('\'', "''"))
            }),
            Format::Json => format!("{}\n", serde_json::to_string_pretty(env)?),
        };
        Ok(text)
    }
}

fn lines<F>(env: &Environment, line: F) -> String
where
    F: Fn(&str, &str) -> String,
{
    env.variables()
        .into_iter()
        .map(|(name, value)| line(name, value) + "\n")
        .collect()
}

fn is_shell_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c))
}

fn posix_quote(value: &str) -> String {
    if is_shell_safe(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn fish_quote(value: &str) -> String {
    if is_shell_safe(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
    }
}

/// Shells the wrapper function can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    /// A `source`-able `awsp` function. It runs the binary with the shell's PID as the
    /// hand-off session, then either consumes the hand-off files (interactive run) or
    /// evaluates what the binary printed (direct run).
    pub fn wrapper(self) -> &'static str {
        match self {
            Shell::Bash | Shell::Zsh => POSIX_WRAPPER,
            Shell::Fish => FISH_WRAPPER,
        }
    }

    /// What this shell can evaluate: direct-run output and the credentials hand-off file.
    pub fn format(self) -> Format {
        match self {
            Shell::Bash => Format::Bash,
            Shell::Zsh => Format::Zsh,
            Shell::Fish => Format::Fish,
        }
    }
}

const POSIX_WRAPPER: &str = r#"awsp() {
    case "${1:-}" in
        -h|--help|-V|--version|--shell-init)
            command awsp "$@"
            return
            ;;
    esac
    local awsp_profile_file="$HOME/.awsp.$$"
    local awsp_credentials_file="$HOME/.awsp-credentials.$$"
    local awsp_output awsp_status awsp_selected
    rm -f "$awsp_profile_file" "$awsp_credentials_file"
    awsp_output="$(command awsp --session "$$" --wrapper-shell bash "$@")"
    awsp_status=$?
    if [ "$awsp_status" -ne 0 ]; then
        rm -f "$awsp_profile_file" "$awsp_credentials_file"
        return "$awsp_status"
    fi
    if [ -f "$awsp_profile_file" ]; then
        awsp_selected="$(cat "$awsp_profile_file")"
        rm -f "$awsp_profile_file"
        if [ -z "$awsp_selected" ]; then
            unset AWS_PROFILE AWS_DEFAULT_PROFILE
        elif [ -f "$awsp_credentials_file" ]; then
            . "$awsp_credentials_file" >/dev/null 2>&1
            rm -f "$awsp_credentials_file"
        else
            export AWS_PROFILE="$awsp_selected"
            export AWS_DEFAULT_PROFILE="$awsp_selected"
        fi
    elif [ -n "$awsp_output" ]; then
        eval "$awsp_output"
    fi
}
"#;

const FISH_WRAPPER: &str = r#"function awsp
    switch "$argv[1]"
        case -h --help -V --version --shell-init
            command awsp $argv
            return $status
    end
    set -l profile_file "$HOME/.awsp.$fish_pid"
    set -l credentials_file "$HOME/.awsp-credentials.$fish_pid"
    rm -f $profile_file $credentials_file
    set -l output (command awsp --session $fish_pid --wrapper-shell fish $argv)
    set -l awsp_status $status
    if test $awsp_status -ne 0
        rm -f $profile_file $credentials_file
        return $awsp_status
    end
    if test -f $profile_file
        set -l selected (cat $profile_file)
        rm -f $profile_file
        if test -z "$selected"
            set -e AWS_PROFILE
            set -e AWS_DEFAULT_PROFILE
        else if test -f $credentials_file
            source $credentials_file >/dev/null 2>&1
            rm -f $credentials_file
        else
            set -gx AWS_PROFILE $selected
            set -gx AWS_DEFAULT_PROFILE $selected
        end
    else if test -n "$output"
        eval $output
    end
end
"#;
