//! Offline system voice backed by espeak-ng.
//!
//! Each chunk is rendered to an intermediate WAV file in a private temporary
//! directory, read back and returned as a single waveform.

use std::ffi::OsString;

use crate::settings::{EngineKind, SynthesisSettings};
use crate::{SynthesisEngine, TtsError, Waveform};

use super::espeak::EspeakConfig;

/// espeak-ng's default speaking rate in words per minute.
pub const DEFAULT_WORDS_PER_MINUTE: f32 = 175.0;

/// espeak-ng's default pitch on its 0-99 scale.
pub const DEFAULT_PITCH: i32 = 50;

const MIN_WORDS_PER_MINUTE: u32 = 80;
const MAX_WORDS_PER_MINUTE: u32 = 450;

/// espeak-ng speech backend.
#[derive(Debug, Clone)]
pub struct SystemVoiceEngine {
    espeak: EspeakConfig,
    words_per_minute: u32,
    pitch: u32,
}

impl SystemVoiceEngine {
    /// Derive rate and pitch from the settings' `rate` and `pitch` strings.
    ///
    /// `+20%` scales the default rate by 1.2; `+5Hz` raises the default pitch
    /// by five steps.
    pub fn new(settings: &SynthesisSettings) -> Result<Self, TtsError> {
        Self::with_espeak(settings, EspeakConfig::default())
    }

    pub fn with_espeak(settings: &SynthesisSettings, espeak: EspeakConfig) -> Result<Self, TtsError> {
        let factor = 1.0 + settings.rate_percent()? as f32 / 100.0;
        let words_per_minute = (DEFAULT_WORDS_PER_MINUTE * factor)
            .round()
            .clamp(MIN_WORDS_PER_MINUTE as f32, MAX_WORDS_PER_MINUTE as f32)
            as u32;
        let pitch = (DEFAULT_PITCH + settings.pitch_hz()?).clamp(0, 99) as u32;
        Ok(Self {
            espeak,
            words_per_minute,
            pitch,
        })
    }

    pub fn words_per_minute(&self) -> u32 {
        self.words_per_minute
    }

    pub fn pitch(&self) -> u32 {
        self.pitch
    }
}

impl SynthesisEngine for SystemVoiceEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::System
    }

    fn synthesize(
        &mut self,
        text: &str,
        settings: &SynthesisSettings,
    ) -> Result<Vec<Waveform>, TtsError> {
        let workdir = tempfile::Builder::new().prefix("espeak-").tempdir()?;
        let wav_path = workdir.path().join("chunk.wav");

        let args: Vec<OsString> = vec![
            "-q".into(),
            "-v".into(),
            settings.language.clone().into(),
            "-s".into(),
            self.words_per_minute.to_string().into(),
            "-p".into(),
            self.pitch.to_string().into(),
            "-w".into(),
            wav_path.clone().into_os_string(),
            "--stdin".into(),
        ];
        self.espeak.run(&args, text)?;

        let wave = Waveform::read_wav(&wav_path)?;
        log::debug!(
            "espeak-ng produced {:.2}s of audio for {} chars",
            wave.duration_secs(),
            text.chars().count()
        );
        Ok(vec![wave])
    }
}
