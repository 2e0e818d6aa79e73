//! Audio assembly and book-level merging.
//!
//! Chunks of one unit are streamed into an intermediate WAV file and
//! transcoded to MP3 by ffmpeg ([`AudioAssembler`]). Finished chapter files are
//! concatenated with silence gaps by [`merge_audio_files`]. Both write to a
//! temporary file next to the destination and move it into place only once the
//! tool has succeeded, so a failed run never leaves a truncated file at the
//! output path.

mod assembler;
mod ffmpeg;
mod merge;
mod timing;

pub use assembler::{ensure_uniform_sample_rate, AudioAssembler, WavSink};
pub use ffmpeg::{probe_duration, probe_sample_rate, transcode_to_mp3};
#[cfg(test)]
pub(crate) use ffmpeg::ffmpeg_available;
pub use merge::{merge_audio_files, MergePlan};
pub use timing::{
    paragraph_timings, read_timings, render_vtt, timings_path, vtt_path, write_timings, write_vtt,
    ChunkTiming,
};

use std::path::Path;

/// Final encoding step of a unit: reads the intermediate WAV at the first path
/// and writes the finished file to the second.
pub type Encoder = fn(&Path, &Path) -> Result<(), crate::TtsError>;

/// Extension of every produced audio file.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Intermediate WAV format: mono 32-bit float.
pub fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

/// Directory that will hold `path`, `.` for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
