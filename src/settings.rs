//! Synthesis settings shared by every pipeline stage.
//!
//! Settings are created once per invocation, either in code through
//! [`SynthesisSettingsBuilder`] or from a JSON file, and are never mutated
//! afterwards.
//!
//! ```rust
//! use audiobook_tts::settings::{EngineKind, SynthesisSettingsBuilder};
//!
//! let settings = SynthesisSettingsBuilder::default()
//!     .enabled(true)
//!     .engine("espeak-ng".parse::<EngineKind>()?)
//!     .rate("+10%")
//!     .build()
//!     .expect("all fields have defaults");
//! assert_eq!(settings.engine, EngineKind::System);
//! # Ok::<(), audiobook_tts::TtsError>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use derive_builder::Builder;
use serde::Deserialize;

use crate::TtsError;

/// Default character budget per chunk for character-bounded segmentation.
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// Default token budget per chunk for token-bounded segmentation.
pub const DEFAULT_MAX_TOKENS: usize = 400;

/// Default silence inserted between chapters in a book-level merge.
pub const DEFAULT_CHAPTER_GAP_SECS: f64 = 1.6;

/// The enumerated set of speech backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum EngineKind {
    /// Kokoro ONNX model, cached across chunks and chapters.
    #[default]
    Kokoro,
    /// Offline espeak-ng voice.
    System,
    /// External inference command speaking a JSON protocol.
    External,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kokoro => "kokoro",
            Self::System => "system",
            Self::External => "external",
        }
    }

    /// Whether a model location must be configured for this engine.
    pub fn requires_model_path(&self) -> bool {
        matches!(self, Self::Kokoro | Self::External)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kokoro" | "kokoro-onnx" | "kokoro_onnx" | "neural" => Ok(Self::Kokoro),
            "system" | "espeak" | "espeak-ng" | "espeak_ng" | "local" => Ok(Self::System),
            "external" | "external-command" | "command" | "exec" => Ok(Self::External),
            _ => Err(TtsError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl TryFrom<String> for EngineKind {
    type Error = TtsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Numeric precision of the neural model weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Int8,
}

/// Attention implementation requested for the neural model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionImpl {
    Eager,
    #[default]
    Sdpa,
    #[serde(rename = "flash_attention_2")]
    FlashAttention2,
}

/// Immutable configuration for one invocation of the pipeline.
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct SynthesisSettings {
    /// Master switch. Disabled settings make every entry point a no-op.
    pub enabled: bool,
    pub engine: EngineKind,
    pub voice: String,
    pub language: String,
    /// Free-form style instruction forwarded to engines that accept one.
    #[builder(setter(into, strip_option))]
    pub instruct: Option<String>,
    #[builder(setter(into, strip_option))]
    pub model_path: Option<PathBuf>,
    pub precision: Precision,
    pub attention: AttentionImpl,
    /// Device placement, `cpu` or `cuda[:N]`.
    pub device: String,
    /// Relative speaking rate, e.g. `+10%` or `-25%`.
    pub rate: String,
    /// Pitch offset, e.g. `+0Hz` or `-5Hz`.
    pub pitch: String,
    pub audio_dirname: String,
    pub overwrite_audio: bool,
    /// Only produce the whole-book file, skipping chapter and synopsis audio.
    pub book_only: bool,
    pub max_chars: usize,
    pub max_tokens: usize,
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub keep_model_loaded: bool,
    pub chapter_gap_secs: f64,
    /// Executable used by the external engine.
    pub inference_command: String,
    /// Write a `.timed.json` sidecar next to each produced file.
    pub write_timings: bool,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: EngineKind::default(),
            voice: "af_heart".to_string(),
            language: "en-us".to_string(),
            instruct: None,
            model_path: None,
            precision: Precision::default(),
            attention: AttentionImpl::default(),
            device: "cpu".to_string(),
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
            audio_dirname: "audio".to_string(),
            overwrite_audio: false,
            book_only: false,
            max_chars: DEFAULT_MAX_CHARS,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_new_tokens: 2048,
            do_sample: true,
            keep_model_loaded: true,
            chapter_gap_secs: DEFAULT_CHAPTER_GAP_SECS,
            inference_command: "tts-infer".to_string(),
            write_timings: false,
        }
    }
}

impl SynthesisSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, TtsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check engine-specific requirements before any backend is built.
    pub fn validate(&self) -> Result<(), TtsError> {
        if self.engine.requires_model_path() && self.model_path.is_none() {
            return Err(TtsError::MissingModelPath(self.engine));
        }
        if self.max_chars == 0 {
            return Err(invalid("max_chars", "must be greater than zero"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be greater than zero"));
        }
        if !(self.chapter_gap_secs.is_finite() && self.chapter_gap_secs >= 0.0) {
            return Err(invalid("chapter_gap_secs", "must be a non-negative number"));
        }
        self.rate_percent()?;
        self.pitch_hz()?;
        Ok(())
    }

    /// The configured rate as a signed percentage delta.
    pub fn rate_percent(&self) -> Result<i32, TtsError> {
        parse_signed_with_suffix(&self.rate, "%")
            .ok_or_else(|| invalid("rate", format!("expected e.g. `+10%`, got {:?}", self.rate)))
    }

    /// The configured pitch offset in hertz.
    pub fn pitch_hz(&self) -> Result<i32, TtsError> {
        parse_signed_with_suffix(&self.pitch, "Hz")
            .ok_or_else(|| invalid("pitch", format!("expected e.g. `+0Hz`, got {:?}", self.pitch)))
    }

    /// Speed multiplier derived from the rate string (`+10%` → 1.1).
    pub fn speed_factor(&self) -> Result<f32, TtsError> {
        Ok((1.0 + self.rate_percent()? as f32 / 100.0).max(0.1))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> TtsError {
    TtsError::InvalidSetting {
        field,
        reason: reason.into(),
    }
}

fn parse_signed_with_suffix(value: &str, suffix: &str) -> Option<i32> {
    let value = value.trim();
    let number = value
        .strip_suffix(suffix)
        .or_else(|| value.strip_suffix(&suffix.to_ascii_lowercase()))?;
    number.trim().parse().ok()
}
