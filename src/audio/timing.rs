//! Timing sidecars written next to produced audio.
//!
//! `chapter.mp3` gets `chapter.timed.json` and a `chapter.vtt` subtitle track:
//!
//! ```json
//! {"paragraphs": [{"text": "First paragraph.", "start": 0.0, "end": 1.25}]}
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::TtsError;

/// Start and end (seconds) of one synthesized chunk within its audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTiming {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

#[derive(Serialize)]
struct TimingsOut<'a> {
    paragraphs: &'a [ChunkTiming],
}

#[derive(Deserialize)]
struct TimingsIn {
    paragraphs: Vec<serde_json::Value>,
}

/// Sidecar location for `audio_path`.
pub fn timings_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("timed.json")
}

pub fn write_timings(audio_path: &Path, timings: &[ChunkTiming]) -> Result<PathBuf, TtsError> {
    let path = timings_path(audio_path);
    let mut json = serde_json::to_string_pretty(&TimingsOut {
        paragraphs: timings,
    })?;
    json.push('\n');
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Subtitle location for `audio_path`.
pub fn vtt_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("vtt")
}

/// Write the WebVTT rendering of `timings` next to `audio_path`. Nothing is
/// written when no cue would remain.
pub fn write_vtt(audio_path: &Path, timings: &[ChunkTiming]) -> Result<Option<PathBuf>, TtsError> {
    let Some(vtt) = render_vtt(timings) else {
        return Ok(None);
    };
    let path = vtt_path(audio_path);
    std::fs::write(&path, vtt)?;
    Ok(Some(path))
}

/// Re-time `paragraphs` from the timings of the chunks that spoke them.
///
/// Each chunk's duration is spread evenly over its words. A paragraph starts
/// at the next spoken word equal to its own first word, so words spoken but
/// absent from the paragraph list (headings) are passed over. Paragraphs not
/// found in what remains are dropped.
pub fn paragraph_timings(paragraphs: &[String], chunks: &[ChunkTiming]) -> Vec<ChunkTiming> {
    let mut words: Vec<(&str, f64, f64)> = Vec::new();
    for chunk in chunks {
        let chunk_words: Vec<&str> = chunk.text.split_whitespace().collect();
        let step = (chunk.end - chunk.start) / chunk_words.len().max(1) as f64;
        for (i, word) in chunk_words.into_iter().enumerate() {
            let start = chunk.start + step * i as f64;
            words.push((word, start, start + step));
        }
    }

    let mut timings = Vec::new();
    let mut next = 0;
    for paragraph in paragraphs {
        let paragraph_words: Vec<&str> = paragraph.split_whitespace().collect();
        let Some(&first) = paragraph_words.first() else {
            continue;
        };
        let Some(offset) = words[next..].iter().position(|(word, ..)| *word == first) else {
            continue;
        };
        let start = next + offset;
        let end = (start + paragraph_words.len() - 1).min(words.len() - 1);
        timings.push(ChunkTiming {
            text: paragraph.clone(),
            start: words[start].1,
            end: words[end].2,
        });
        next = end + 1;
    }
    timings
}

/// Read the sidecar of `audio_path`.
///
/// Returns `None` when the file is missing, is not JSON, or holds no usable
/// entry. Malformed entries are skipped.
pub fn read_timings(audio_path: &Path) -> Option<Vec<ChunkTiming>> {
    let content = std::fs::read_to_string(timings_path(audio_path)).ok()?;
    let file: TimingsIn = serde_json::from_str(&content).ok()?;
    let timings: Vec<ChunkTiming> = file
        .paragraphs
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<ChunkTiming>(entry).ok())
        .map(|timing| ChunkTiming {
            text: timing.text.trim().to_string(),
            ..timing
        })
        .collect();
    (!timings.is_empty()).then_some(timings)
}

/// Render timings as WebVTT cues. Entries that do not move forward in time
/// are left out; `None` when no cue remains.
pub fn render_vtt(timings: &[ChunkTiming]) -> Option<String> {
    let mut out = String::from("WEBVTT\n");
    let mut cues = 0;
    for (index, timing) in timings.iter().enumerate() {
        if timing.end <= timing.start {
            continue;
        }
        out.push_str(&format!(
            "\n{}\n{} --> {}\n{}\n",
            index + 1,
            vtt_timestamp(timing.start),
            vtt_timestamp(timing.end),
            timing.text
        ));
        cues += 1;
    }
    (cues > 0).then_some(out)
}

fn vtt_timestamp(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        millis % 3_600_000 / 60_000,
        millis % 60_000 / 1000,
        millis % 1000
    )
}
