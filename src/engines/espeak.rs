use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;

use crate::process::ESPEAK;
use crate::TtsError;

/// Location of the espeak-ng binary and its voice data.
///
/// Either path can be `None` to use the system installation from PATH.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let mut cmd = match &self.bin_path {
            Some(bin) => Command::new(bin),
            None => ESPEAK.command(),
        };
        if let Some(data) = &self.data_path {
            cmd.env("ESPEAK_DATA_PATH", data);
        }
        cmd
    }

    /// Run espeak-ng with `args`, feeding `input` on stdin, and return stdout.
    pub fn run<I, S>(&self, args: I, input: &str) -> Result<String, TtsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        let payload = canonicalize_stdin_payload(input);
        let stdout = ESPEAK.run(&mut cmd, Some(payload.as_bytes()))?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// espeak-ng reads stdin line by line; without a final newline the last
/// token can be under-processed.
fn canonicalize_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Whether an espeak-ng binary can be started. Tests use this to skip.
#[cfg(test)]
pub(crate) fn espeak_available() -> bool {
    Command::new("espeak-ng").arg("--version").output().is_ok()
}
