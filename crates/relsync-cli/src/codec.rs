//! Delta codec backed by an external diff tool.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use relsync_core::delta::{DeltaCodec, DeltaError, DeltaMode};
use tracing::debug;

/// Runs `{tool} diff|apply ...` as a child process.
///
/// The tool is called as `diff [--best-size] <base> <new> <output>` and
/// `apply <base> <patch> <output>`, and must exit with status 0 on success.
#[derive(Debug, Clone)]
pub struct ExternalDeltaCodec {
    tool: PathBuf,
}

impl ExternalDeltaCodec {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    fn run(&self, args: &[&std::ffi::OsStr]) -> Result<(), DeltaError> {
        debug!(tool = %self.tool.display(), ?args, "Running delta tool");
        let output = Command::new(&self.tool)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DeltaError::Codec(format!(
            "{} exited with {}: {}",
            self.tool.display(),
            output.status,
            stderr.trim()
        )))
    }
}

impl DeltaCodec for ExternalDeltaCodec {
    fn diff(&self, base: &Path, new: &Path, output: &Path, mode: DeltaMode) -> Result<(), DeltaError> {
        let mut args = vec![std::ffi::OsStr::new("diff")];
        if mode == DeltaMode::BestSize {
            args.push(std::ffi::OsStr::new("--best-size"));
        }
        args.extend([base.as_os_str(), new.as_os_str(), output.as_os_str()]);
        self.run(&args)
    }

    fn apply(&self, base: &Path, patch: &Path, output: &Path) -> Result<(), DeltaError> {
        self.run(&[
            std::ffi::OsStr::new("apply"),
            base.as_os_str(),
            patch.as_os_str(),
            output.as_os_str(),
        ])
    }
}
