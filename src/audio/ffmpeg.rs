use std::path::Path;

use crate::process::{FFMPEG, FFPROBE};
use crate::TtsError;

/// Encode `input` (any format ffmpeg reads) as MP3 at `output`.
pub fn transcode_to_mp3(input: &Path, output: &Path) -> Result<(), TtsError> {
    let mut cmd = FFMPEG.command();
    cmd.args(["-nostdin", "-y", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-vn", "-codec:a", "libmp3lame", "-q:a", "2", "-f", "mp3"])
        .arg(output);
    FFMPEG.run(&mut cmd, None)?;
    Ok(())
}

/// Sample rate of the first audio stream in `path`.
pub fn probe_sample_rate(path: &Path) -> Result<u32, TtsError> {
    let value = probe(path, &["-select_streams", "a:0", "-show_entries", "stream=sample_rate"])?;
    value
        .parse()
        .map_err(|_| unparseable(&value))
}

/// Container duration of `path` in seconds.
pub fn probe_duration(path: &Path) -> Result<f64, TtsError> {
    let value = probe(path, &["-show_entries", "format=duration"])?;
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .ok_or_else(|| unparseable(&value))
}

/// Run ffprobe and return the first non-empty line of its bare-value output.
fn probe(path: &Path, entries: &[&str]) -> Result<String, TtsError> {
    let mut cmd = FFPROBE.command();
    cmd.args(["-v", "error"])
        .args(entries)
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path);
    let stdout = FFPROBE.run(&mut cmd, None)?;
    let text = String::from_utf8_lossy(&stdout);
    Ok(text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string())
}

fn unparseable(output: &str) -> TtsError {
    TtsError::UnparseableToolOutput {
        tool: FFPROBE.name.to_string(),
        output: output.to_string(),
    }
}

/// Whether both ffmpeg and ffprobe are installed. Tests use this to skip.
#[cfg(test)]
pub(crate) fn ffmpeg_available() -> bool {
    FFMPEG.is_available() && FFPROBE.is_available()
}
