//! # audiobook-tts
//!
//! Turns markdown chapters into narrated MP3 files and stitches chapters into
//! a whole audiobook.
//!
//! ## Pipeline
//!
//! 1. [`text::sanitize_markdown_for_tts`] strips markup and unspeakable characters.
//! 2. The [`text`] segmenters cut the result into engine-sized chunks.
//! 3. An engine from [`engines`] turns each chunk into a [`Waveform`]; silent
//!    output from the neural engine is re-split and retried by [`guard`].
//! 4. [`audio::AudioAssembler`] streams the waveforms to a WAV file and
//!    transcodes it with ffmpeg.
//! 5. [`audio::merge_audio_files`] joins chapter files with silence gaps.
//!
//! ## Features
//!
//! - `kokoro` - Kokoro ONNX neural engine (espeak-ng required)
//! - `cuda` - CUDA execution provider for the Kokoro engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use audiobook_tts::pipeline::{synthesize_text_audio, PipelineContext};
//! use audiobook_tts::settings::{EngineKind, SynthesisSettingsBuilder};
//!
//! let settings = SynthesisSettingsBuilder::default()
//!     .enabled(true)
//!     .engine(EngineKind::System)
//!     .build()
//!     .expect("defaults");
//! let mut ctx = PipelineContext::new();
//! let written = synthesize_text_audio(
//!     &mut ctx,
//!     "# Chapter One\n\nIt was a dark and stormy night.",
//!     Path::new("out/chapter-one.mp3"),
//!     &settings,
//! )?;
//! println!("{written:?}");
//! # Ok::<(), audiobook_tts::TtsError>(())
//! ```

pub mod audio;
pub mod cache;
pub mod engines;
pub mod error;
pub mod guard;
pub mod pipeline;
mod process;
pub mod settings;
pub mod text;

use std::path::Path;

pub use error::TtsError;
pub use settings::{EngineKind, SynthesisSettings};

use text::TokenCounter;

/// Synthesized audio for one chunk: mono f32 samples plus their sample rate.
///
/// Samples are always finite and within `[-1, 1]`; [`Waveform::new`] maps
/// non-finite values to zero and clamps the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        for sample in &mut samples {
            *sample = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Root-mean-square amplitude; zero for an empty waveform.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Write the audio to a 32-bit float mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), TtsError> {
        let mut writer = hound::WavWriter::create(path, audio::wav_spec(self.sample_rate))?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Read a WAV file, downmixing to mono and scaling integer PCM to `[-1, 1]`.
    pub fn read_wav(path: &Path) -> Result<Self, TtsError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        let channels = usize::from(spec.channels.max(1));
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };
        Ok(Self::new(samples, spec.sample_rate))
    }
}

/// Common interface for the speech backends.
///
/// One capability: turn a chunk of sanitized text into audio. Engines may return
/// several waveforms for one chunk; they are played back in order.
pub trait SynthesisEngine {
    /// Which enumerated backend this is.
    fn kind(&self) -> EngineKind;

    /// Synthesize speech for one chunk.
    fn synthesize(
        &mut self,
        text: &str,
        settings: &SynthesisSettings,
    ) -> Result<Vec<Waveform>, TtsError>;

    /// Tokenizer bound to the engine's model, for token-bounded segmentation.
    fn token_counter(&mut self) -> Option<&mut dyn TokenCounter> {
        None
    }

    /// Whether near-silent output from this engine should trigger recovery.
    fn guards_silence(&self) -> bool {
        self.kind() == EngineKind::Kokoro
    }

    /// Release any model held for this engine. Called when the caller does not
    /// intend to reuse it.
    fn release(&mut self) {}
}
