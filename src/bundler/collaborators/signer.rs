//! Command-template signer.
//!
//! The template is a command line such as
//! `signtool sign /a /fd sha256 "{{file}}"`. It is split into arguments
//! once, then each argument is rendered with handlebars per file so paths
//! containing spaces stay a single argument.

use super::Signer;
use crate::bundler::{Error, Result};
use handlebars::Handlebars;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};
use wait_timeout::ChildExt;

const SIGNER: &str = "sign command";

/// Default upper bound on a single sign invocation.
pub const DEFAULT_SIGN_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs an external command for every file to sign.
#[derive(Debug)]
pub struct CommandSigner {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    handlebars: Handlebars<'static>,
}

impl CommandSigner {
    /// Parses `template` and resolves its program on `PATH`.
    pub fn new(template: &str) -> Result<Self> {
        let mut tokens = split_command_line(template)?.into_iter();
        let program = tokens
            .next()
            .ok_or_else(|| Error::validation("sign template is empty"))?;
        let program = which::which(&program).map_err(|e| {
            Error::collaborator(SIGNER, format!("`{program}` not found in PATH: {e}"))
        })?;

        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        Ok(Self {
            program,
            args: tokens.collect(),
            timeout: DEFAULT_SIGN_TIMEOUT,
            handlebars,
        })
    }

    /// Overrides the per-file timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn render_args(&self, file: &Path) -> Result<Vec<String>> {
        let mut data = BTreeMap::new();
        data.insert("file", file.display().to_string());
        self.args
            .iter()
            .map(|arg| Ok(self.handlebars.render_template(arg, &data)?))
            .collect()
    }
}

impl Signer for CommandSigner {
    fn sign(&self, path: &Path) -> Result<()> {
        let args = self.render_args(path)?;
        log::debug!("Signing {} with {}", path.display(), self.program.display());

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::collaborator(SIGNER, format!("failed to start: {e}")))?;

        let status = match child
            .wait_timeout(self.timeout)
            .map_err(|e| Error::collaborator(SIGNER, e))?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::collaborator(
                    SIGNER,
                    format!(
                        "timed out after {}s signing {}",
                        self.timeout.as_secs(),
                        path.display()
                    ),
                ));
            }
        };

        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            use std::io::Read;
            let _ = pipe.read_to_string(&mut stderr);
        }
        Err(Error::collaborator(
            SIGNER,
            format!(
                "exit code {:?} signing {}: {}",
                status.code(),
                path.display(),
                stderr.trim()
            ),
        ))
    }
}

/// Splits a command line on whitespace, honouring double and single quotes.
fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(Error::validation(format!("unterminated quote in sign template `{line}`")));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_arguments() {
        let tokens =
            split_command_line(r#"signtool sign /n "My Company" '{{file}}' /fd sha256"#).unwrap();
        assert_eq!(
            tokens,
            vec!["signtool", "sign", "/n", "My Company", "{{file}}", "/fd", "sha256"]
        );
        assert!(split_command_line("tool \"open").is_err());
        assert_eq!(split_command_line("a \"\" b").unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn missing_program_is_a_collaborator_error() {
        let err = CommandSigner::new("definitely-not-a-real-signer-xyz {{file}}").unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn renders_file_into_arguments() {
        let signer = CommandSigner::new("true --file={{file}}").unwrap();
        let args = signer.render_args(Path::new("/tmp/My App.exe")).unwrap();
        assert_eq!(args, vec!["--file=/tmp/My App.exe"]);
        signer.sign(Path::new("/tmp/My App.exe")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_exit_code() {
        let signer = CommandSigner::new("false {{file}}").unwrap();
        let err = signer.sign(Path::new("a.exe")).unwrap_err();
        assert!(err.to_string().contains("a.exe"));
    }
}
