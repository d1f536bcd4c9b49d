//! Win32 resource editing through `rcedit`.

use super::ResourceEditor;
use crate::bundler::{Error, Result};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
    sync::LazyLock,
};

const EDITOR: &str = "rcedit";

/// Location of `rcedit`, probed once per process.
static RCEDIT: LazyLock<Option<PathBuf>> = LazyLock::new(|| match which::which("rcedit") {
    Ok(path) => {
        log::debug!("Found rcedit at: {}", path.display());
        Some(path)
    }
    Err(e) => {
        log::debug!("rcedit not found in PATH: {e}. Icons and stub resources will not be edited.");
        None
    }
});

/// Resource editor backed by the `rcedit` tool.
#[derive(Clone, Debug)]
pub struct RceditEditor {
    program: PathBuf,
}

impl RceditEditor {
    /// Uses `rcedit` from `PATH` when available.
    pub fn detect() -> Option<Self> {
        RCEDIT.clone().map(|program| Self { program })
    }

    /// Uses an explicit `rcedit` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<()> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::collaborator(EDITOR, format!("failed to start: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::collaborator(
                EDITOR,
                format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

impl ResourceEditor for RceditEditor {
    fn set_icon(&self, exe: &Path, icon: &Path) -> Result<()> {
        self.run(&[exe.as_os_str(), OsStr::new("--set-icon"), icon.as_os_str()])
    }

    fn copy_resources(&self, from: &Path, to: &Path) -> Result<()> {
        // rcedit cannot read resources out of another image.
        Err(Error::collaborator(
            EDITOR,
            format!(
                "copying resources from {} to {} is not supported",
                from.display(),
                to.display()
            ),
        ))
    }
}
