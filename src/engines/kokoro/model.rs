use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::cache::ModelKey;
use crate::engines::espeak::EspeakConfig;
use crate::settings::{AttentionImpl, Precision};
use crate::TtsError;

use super::phonemizer::phonemize;
use super::voices::VoiceStore;

/// Maximum number of phoneme tokens per inference call (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

/// Crossfade (in samples) used when joining audio of over-long phoneme runs.
const CHUNK_CROSSFADE_SAMPLES: usize = 240; // 10ms @ 24kHz

/// A loaded Kokoro ONNX session with its voices and vocabulary.
pub struct KokoroModel {
    session: Session,
    voices: VoiceStore,
    vocab: HashMap<char, i64>,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load the model described by `key`.
    ///
    /// `key.model_path` is a directory holding the `.onnx` variants, a
    /// `voices-v1.0.bin` archive and a `config.json` or `tokenizer.json`
    /// carrying the phoneme vocabulary.
    pub fn load(key: &ModelKey) -> Result<Self, TtsError> {
        let model_dir = key.model_path.as_path();
        let onnx_path = find_onnx_file(model_dir, key.precision)?;
        log::info!(
            "Loading Kokoro model from {} (precision={:?}, attention={:?}, device={})",
            onnx_path.display(),
            key.precision,
            key.attention,
            key.device
        );

        let session = init_session(&onnx_path, key)?;
        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        log::debug!("Detected: tokens_input='{tokens_input_name}', speed_is_int32={speed_is_int32}");

        let voices = VoiceStore::load(&find_voices_file(model_dir)?)?;
        let vocab = load_vocab(model_dir)?;

        Ok(Self {
            session,
            voices,
            vocab,
            tokens_input_name,
            speed_is_int32,
        })
    }

    /// Phoneme token ids for `text`, as fed to the model.
    pub fn phoneme_ids(
        &self,
        text: &str,
        lang: &str,
        espeak: &EspeakConfig,
    ) -> Result<Vec<i64>, TtsError> {
        phonemize(text, lang, &self.vocab, espeak)
    }

    /// Synthesize one chunk of text into a single run of samples.
    pub fn synthesize_text(
        &mut self,
        text: &str,
        voice: &str,
        lang: &str,
        speed: f32,
        espeak: &EspeakConfig,
    ) -> Result<Vec<f32>, TtsError> {
        let ids = self.phoneme_ids(text, lang, espeak)?;
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(Vec::new());
        }

        // One style index for the whole chunk keeps prosody stable across runs.
        let style = self.voices.get_style(voice, ids.len())?;
        let runs = if ids.len() > MAX_PHONEME_LEN {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {}), splitting",
                ids.len(),
                MAX_PHONEME_LEN
            );
            split_phoneme_runs(&ids)
        } else {
            vec![ids]
        };

        let mut combined = Vec::new();
        for run in &runs {
            let audio = self.infer(run, &style, speed)?;
            append_with_crossfade(&mut combined, &audio, CHUNK_CROSSFADE_SAMPLES);
        }
        Ok(combined)
    }

    /// List all available voice names.
    pub fn list_voices(&self) -> Vec<&str> {
        self.voices.list_voices()
    }

    fn infer(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, TtsError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens_arr = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style_view = ndarray::ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            self.session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        };

        let (_, first) = output
            .iter()
            .next()
            .ok_or_else(|| TtsError::Synthesis("Kokoro model returned no output".into()))?;
        let waveform = first.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

/// Pick the ONNX file matching the requested precision.
///
/// Falls back to the first `.onnx` file (by name) when no variant matches.
fn find_onnx_file(model_dir: &Path, precision: Precision) -> Result<PathBuf, TtsError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .collect();
    candidates.sort();

    let name_of = |path: &PathBuf| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    };
    let matches_precision = |name: &str| match precision {
        Precision::Int8 => name.contains("int8") || name.contains("quant"),
        Precision::Fp16 => name.contains("fp16"),
        Precision::Fp32 => !["int8", "quant", "fp16"].iter().any(|tag| name.contains(tag)),
    };

    if let Some(path) = candidates.iter().find(|p| matches_precision(&name_of(p))) {
        return Ok(path.clone());
    }
    match candidates.into_iter().next() {
        Some(path) => {
            log::warn!(
                "No {precision:?} variant in {}, using {}",
                model_dir.display(),
                path.display()
            );
            Ok(path)
        }
        None => Err(TtsError::ModelFormat(format!(
            "no .onnx file found in {}",
            model_dir.display()
        ))),
    }
}

fn find_voices_file(model_dir: &Path) -> Result<PathBuf, TtsError> {
    let preferred = model_dir.join("voices-v1.0.bin");
    if preferred.exists() {
        return Ok(preferred);
    }
    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("npz") {
            return Ok(path);
        }
    }
    Err(TtsError::ModelFormat(format!(
        "voice archive not found in {}. Download voices-v1.0.bin from the Kokoro model repository.",
        model_dir.display()
    )))
}

/// Load the phoneme vocabulary from `config.json` (`vocab`) or
/// `tokenizer.json` (`model.vocab`).
fn load_vocab(model_dir: &Path) -> Result<HashMap<char, i64>, TtsError> {
    let config_path = model_dir.join("config.json");
    let tokenizer_path = model_dir.join("tokenizer.json");
    let (path, pointer) = if config_path.exists() {
        (config_path, "/vocab")
    } else if tokenizer_path.exists() {
        (tokenizer_path, "/model/vocab")
    } else {
        return Err(TtsError::ModelFormat(format!(
            "neither config.json nor tokenizer.json found in {}",
            model_dir.display()
        )));
    };

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let vocab = json
        .pointer(pointer)
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            TtsError::ModelFormat(format!("{} has no `{pointer}` object", path.display()))
        })?;

    vocab
        .iter()
        .map(|(token, id)| {
            let ch = token
                .chars()
                .next()
                .ok_or_else(|| TtsError::ModelFormat(format!("empty vocab key in {}", path.display())))?;
            let id = id.as_i64().ok_or_else(|| {
                TtsError::ModelFormat(format!("non-integer vocab value for {token:?}"))
            })?;
            Ok((ch, id))
        })
        .collect()
}

fn init_session(onnx_path: &Path, key: &ModelKey) -> Result<Session, TtsError> {
    let opt_level = match key.attention {
        AttentionImpl::Eager => GraphOptimizationLevel::Level1,
        AttentionImpl::Sdpa | AttentionImpl::FlashAttention2 => GraphOptimizationLevel::Level3,
    };
    let session = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(execution_providers(&key.device)?)?
        .commit_from_file(onnx_path)?;
    Ok(session)
}

fn execution_providers(device: &str) -> Result<Vec<ExecutionProviderDispatch>, TtsError> {
    let (kind, index) = match device.split_once(':') {
        Some((kind, index)) => (kind, Some(index)),
        None => (device, None),
    };
    match (kind, index) {
        ("cpu", None) => Ok(vec![CPUExecutionProvider::default().build()]),
        ("cuda", index) => cuda_providers(index),
        _ => Err(TtsError::InvalidSetting {
            field: "device",
            reason: format!("expected `cpu` or `cuda[:N]`, got {device:?}"),
        }),
    }
}

#[cfg(feature = "cuda")]
fn cuda_providers(index: Option<&str>) -> Result<Vec<ExecutionProviderDispatch>, TtsError> {
    use ort::execution_providers::CUDAExecutionProvider;

    let device_id: i32 = match index {
        Some(index) => index.parse().map_err(|_| TtsError::InvalidSetting {
            field: "device",
            reason: format!("invalid CUDA device index {index:?}"),
        })?,
        None => 0,
    };
    Ok(vec![
        CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build(),
        CPUExecutionProvider::default().build(),
    ])
}

#[cfg(not(feature = "cuda"))]
fn cuda_providers(_index: Option<&str>) -> Result<Vec<ExecutionProviderDispatch>, TtsError> {
    Err(TtsError::MissingBackend(
        "CUDA device requested but this build lacks the `cuda` feature".into(),
    ))
}

/// Detect the token input name ("input_ids" or "tokens") from session inputs.
fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

/// Detect whether the speed input expects int32 (true) or float32 (false).
fn detect_speed_type(session: &Session) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == "speed")
        .map(|input| format!("{:?}", input.dtype()).to_ascii_lowercase().contains("int32"))
        // Modern Kokoro exports use int32.
        .unwrap_or(true)
}

/// Split phoneme ids into runs of at most `MAX_PHONEME_LEN`, preferring to
/// break after punctuation.
fn split_phoneme_runs(ids: &[i64]) -> Vec<Vec<i64>> {
    // Punctuation ids in the Kokoro vocab: ';':1 ':':2 ',':3 '.':4 '!':5 '?':6
    const PUNCT_IDS: &[i64] = &[1, 2, 3, 4, 5, 6];

    let mut runs = Vec::new();
    let mut start = 0;
    while start < ids.len() {
        let end = (start + MAX_PHONEME_LEN).min(ids.len());
        let split = if end == ids.len() {
            end
        } else {
            ids[start..end]
                .iter()
                .rposition(|id| PUNCT_IDS.contains(id))
                .map(|i| start + i + 1)
                .unwrap_or(end)
        };
        runs.push(ids[start..split].to_vec());
        start = split;
    }
    runs
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[dst_start + i] = dst[dst_start + i] * (1.0 - t) + src[i] * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}
