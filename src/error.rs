use std::path::PathBuf;

use crate::settings::EngineKind;

/// Errors raised by the narration pipeline.
///
/// Configuration problems are raised before any work starts. Tool failures
/// carry the tool's own diagnostics verbatim.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Unsupported TTS engine '{0}'. Expected one of: kokoro, system, external.")]
    UnsupportedEngine(String),
    #[error("The {0} engine requires `model_path` to be set.")]
    MissingModelPath(EngineKind),
    #[error("Invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Chunk produced silent audio and cannot be split further: {preview:?}")]
    Unsplittable { preview: String },
    #[error("Chunk still silent after {depth} recovery attempt(s): {preview:?}")]
    RecoveryExhausted { depth: usize, preview: String },
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("{tool} not found. {hint}")]
    MissingTool { tool: String, hint: String },
    #[error("Backend dependency missing: {0}")]
    MissingBackend(String),
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("Could not parse {tool} output: {output:?}")]
    UnparseableToolOutput { tool: String, output: String },

    #[error("Sample rate mismatch: expected {expected} Hz, got {found} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    #[error("No audio files to merge")]
    EmptyMergeInput,
    #[error("Missing audio files for merge: {}", join_paths(.0))]
    MissingInputs(Vec<PathBuf>),
    #[error("No chapters to narrate in {}", .0.display())]
    NoChapters(PathBuf),

    #[error("Voice '{0}' not found.")]
    VoiceNotFound(String),
    #[error("Invalid model files: {0}")]
    ModelFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "kokoro")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[cfg(feature = "kokoro")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// First few characters of a chunk, for error messages.
pub(crate) fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 60;
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}
