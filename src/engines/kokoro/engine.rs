use crate::cache::{ModelCache, ModelKey};
use crate::engines::espeak::EspeakConfig;
use crate::settings::{EngineKind, SynthesisSettings};
use crate::text::TokenCounter;
use crate::{SynthesisEngine, TtsError, Waveform};

use super::model::{KokoroModel, SAMPLE_RATE};
use super::phonemizer::voice_lang;

/// Kokoro synthesis engine.
///
/// The ONNX session lives in the caller's [`ModelCache`] and is loaded on the
/// first chunk; engines built from equal settings share it.
///
/// ```rust,no_run
/// use audiobook_tts::cache::ModelCache;
/// use audiobook_tts::engines::kokoro::KokoroEngine;
/// use audiobook_tts::{SynthesisEngine, SynthesisSettings};
///
/// let settings = SynthesisSettings {
///     model_path: Some("models/kokoro".into()),
///     ..Default::default()
/// };
/// let mut cache = ModelCache::new();
/// let mut engine = KokoroEngine::new(&settings, &mut cache)?;
/// let waves = engine.synthesize("Hello, world!", &settings)?;
/// println!("{:.2}s of audio", waves[0].duration_secs());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct KokoroEngine<'a> {
    cache: &'a mut ModelCache<KokoroModel>,
    key: ModelKey,
    espeak: EspeakConfig,
    voice: String,
    lang: String,
    speed: f32,
}

impl<'a> KokoroEngine<'a> {
    pub fn new(
        settings: &SynthesisSettings,
        cache: &'a mut ModelCache<KokoroModel>,
    ) -> Result<Self, TtsError> {
        let key = ModelKey::from_settings(settings)?;
        let lang = voice_lang(&settings.voice)
            .map(str::to_string)
            .unwrap_or_else(|| settings.language.clone());
        Ok(Self {
            cache,
            key,
            espeak: EspeakConfig::default(),
            voice: settings.voice.clone(),
            lang,
            speed: settings.speed_factor()?,
        })
    }

    /// Use a specific espeak-ng installation for phonemization.
    pub fn with_espeak(mut self, espeak: EspeakConfig) -> Self {
        self.espeak = espeak;
        self
    }

    /// Voices available in the loaded model.
    pub fn list_voices(&mut self) -> Result<Vec<String>, TtsError> {
        let model = self.cache.get_or_load(&self.key, KokoroModel::load)?;
        Ok(model.list_voices().into_iter().map(str::to_string).collect())
    }
}

impl SynthesisEngine for KokoroEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Kokoro
    }

    fn synthesize(
        &mut self,
        text: &str,
        _settings: &SynthesisSettings,
    ) -> Result<Vec<Waveform>, TtsError> {
        let model = self.cache.get_or_load(&self.key, KokoroModel::load)?;
        let samples = model.synthesize_text(text, &self.voice, &self.lang, self.speed, &self.espeak)?;
        Ok(vec![Waveform::new(samples, SAMPLE_RATE)])
    }

    fn token_counter(&mut self) -> Option<&mut dyn TokenCounter> {
        Some(self)
    }

    fn release(&mut self) {
        self.cache.evict(&self.key);
    }
}

impl TokenCounter for KokoroEngine<'_> {
    /// Number of phoneme tokens the model would see for `text`.
    fn count_tokens(&mut self, text: &str) -> Result<usize, TtsError> {
        let model = self.cache.get_or_load(&self.key, KokoroModel::load)?;
        Ok(model.phoneme_ids(text, &self.lang, &self.espeak)?.len())
    }
}
