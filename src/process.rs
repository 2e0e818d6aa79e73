//! Blocking invocation of external command-line tools.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::TtsError;

/// An external program the pipeline shells out to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tool {
    pub name: &'static str,
    pub hint: &'static str,
}

pub(crate) const FFMPEG: Tool = Tool {
    name: "ffmpeg",
    hint: "Install it (Linux: `sudo apt-get install ffmpeg`, macOS: `brew install ffmpeg`) and make sure it is on PATH.",
};

pub(crate) const FFPROBE: Tool = Tool {
    name: "ffprobe",
    hint: "It ships with ffmpeg (Linux: `sudo apt-get install ffmpeg`, macOS: `brew install ffmpeg`).",
};

pub(crate) const ESPEAK: Tool = Tool {
    name: "espeak-ng",
    hint: "Install: Linux: `sudo apt-get install espeak-ng`, macOS: `brew install espeak-ng`, \
           Windows: https://espeak-ng.org/download",
};

/// Run `cmd` to completion and return its stdout.
///
/// A program that cannot be found maps to [`TtsError::MissingTool`]; a
/// non-zero exit maps to [`TtsError::ToolFailed`] with stderr attached.
pub(crate) fn run(
    tool_name: &str,
    hint: &str,
    cmd: &mut Command,
    stdin: Option<&[u8]>,
) -> Result<Vec<u8>, TtsError> {
    log::debug!("Running {cmd:?}");
    let mut child = cmd
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TtsError::MissingTool {
                    tool: tool_name.to_string(),
                    hint: hint.to_string(),
                }
            } else {
                TtsError::Io(e)
            }
        })?;

    if let (Some(payload), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A tool that exits before reading everything closes the pipe; its
        // exit status and stderr below say why.
        match pipe.write_all(payload) {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(TtsError::Io(e)),
            _ => {}
        }
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(TtsError::ToolFailed {
            tool: tool_name.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

impl Tool {
    pub(crate) fn command(&self) -> Command {
        Command::new(self.name)
    }

    pub(crate) fn run(&self, cmd: &mut Command, stdin: Option<&[u8]>) -> Result<Vec<u8>, TtsError> {
        run(self.name, self.hint, cmd, stdin)
    }

    /// Whether the tool can be started at all.
    #[cfg(test)]
    pub(crate) fn is_available(&self) -> bool {
        Command::new(self.name)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}
