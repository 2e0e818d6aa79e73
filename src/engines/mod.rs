//! Speech synthesis engines.
//!
//! # Available Engines
//!
//! - [`EngineKind::Kokoro`] - Kokoro neural TTS (ONNX format, espeak-ng
//!   required). Needs the `kokoro` Cargo feature.
//! - [`EngineKind::System`] - the offline espeak-ng voice.
//! - [`EngineKind::External`] - an alternate neural model run by an external
//!   inference command.
//!
//! [`create_engine`] picks the backend named in the settings. Neural models are
//! loaded lazily through the caller's [`ModelCache`], so engines built for
//! successive chapters reuse the same session.

pub mod espeak;
pub mod external;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod system;

use crate::cache::ModelCache;
use crate::settings::{EngineKind, SynthesisSettings};
use crate::{SynthesisEngine, TtsError};

/// Model type held in the pipeline's cache.
#[cfg(feature = "kokoro")]
pub type NeuralModel = kokoro::KokoroModel;

/// Model type held in the pipeline's cache. Without the `kokoro` feature no
/// model can be loaded, so the cache stays empty.
#[cfg(not(feature = "kokoro"))]
pub enum NeuralModel {}

/// Build the engine selected by `settings.engine`.
pub fn create_engine<'a>(
    settings: &SynthesisSettings,
    models: &'a mut ModelCache<NeuralModel>,
) -> Result<Box<dyn SynthesisEngine + 'a>, TtsError> {
    if settings.engine.requires_model_path() && settings.model_path.is_none() {
        return Err(TtsError::MissingModelPath(settings.engine));
    }
    log::debug!("Creating {} engine", settings.engine);
    match settings.engine {
        EngineKind::Kokoro => kokoro_engine(settings, models),
        EngineKind::System => Ok(Box::new(system::SystemVoiceEngine::new(settings)?)),
        EngineKind::External => Ok(Box::new(external::ExternalEngine::new(settings)?)),
    }
}

#[cfg(feature = "kokoro")]
fn kokoro_engine<'a>(
    settings: &SynthesisSettings,
    models: &'a mut ModelCache<NeuralModel>,
) -> Result<Box<dyn SynthesisEngine + 'a>, TtsError> {
    Ok(Box::new(kokoro::KokoroEngine::new(settings, models)?))
}

#[cfg(not(feature = "kokoro"))]
fn kokoro_engine<'a>(
    _settings: &SynthesisSettings,
    _models: &'a mut ModelCache<NeuralModel>,
) -> Result<Box<dyn SynthesisEngine + 'a>, TtsError> {
    Err(TtsError::MissingBackend(
        "the Kokoro engine requires building with the `kokoro` feature".into(),
    ))
}
