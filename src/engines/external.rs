//! Alternate neural backend driven through an external inference command.
//!
//! The command is started once per chunk as
//! `<inference_command> --model <model_path>`, receives an
//! [`InferenceRequest`] as JSON on stdin and prints one JSON value on stdout.
//! Three result shapes are accepted:
//!
//! ```text
//! "out/chunk.wav"                                  # path to a WAV file
//! [[0.0, 0.1, ...], 24000]                         # (samples, sample rate)
//! {"audio": [[...], [...]], "sample_rate": 24000}  # keyed bundle
//! ```
//!
//! Bundles accept `audio`, `wav`, `wavs` or `waveform` for the samples (one
//! list or a list of lists), `sample_rate`, `sr` or `sampling_rate` for the
//! rate, and may name a WAV `path` instead of inline samples.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::settings::{EngineKind, SynthesisSettings};
use crate::{process, SynthesisEngine, TtsError, Waveform};

const HINT: &str = "Set `inference_command` to an executable that reads a JSON request on stdin \
                    and prints the synthesized audio as JSON.";

/// Request sent to the inference command for one chunk.
#[derive(Debug, Serialize)]
pub struct InferenceRequest<'a> {
    pub text: &'a str,
    pub voice: &'a str,
    pub language: &'a str,
    pub instruct: Option<&'a str>,
    pub model_path: &'a Path,
    pub max_new_tokens: usize,
    pub do_sample: bool,
}

/// Any of the result shapes the inference command may print.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InferenceOutput {
    Path(PathBuf),
    Pair(Vec<f32>, u32),
    Bundle(InferenceBundle),
}

#[derive(Debug, Deserialize)]
pub struct InferenceBundle {
    #[serde(default, alias = "wav", alias = "wavs", alias = "waveform")]
    audio: Option<BundleAudio>,
    #[serde(default, alias = "sr", alias = "sampling_rate")]
    sample_rate: Option<u32>,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BundleAudio {
    Mono(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl InferenceOutput {
    /// Normalize the result to waveforms, reading WAV files where named.
    pub fn into_waveforms(self) -> Result<Vec<Waveform>, TtsError> {
        match self {
            Self::Path(path) => Ok(vec![Waveform::read_wav(&path)?]),
            Self::Pair(samples, rate) => Ok(vec![Waveform::new(samples, rate)]),
            Self::Bundle(bundle) => match (bundle.audio, bundle.sample_rate, bundle.path) {
                (Some(audio), Some(rate), _) => Ok(match audio {
                    BundleAudio::Mono(samples) => vec![Waveform::new(samples, rate)],
                    BundleAudio::Batch(batch) => batch
                        .into_iter()
                        .map(|samples| Waveform::new(samples, rate))
                        .collect(),
                }),
                (_, _, Some(path)) => Ok(vec![Waveform::read_wav(&path)?]),
                (Some(_), None, None) => Err(TtsError::Synthesis(
                    "inference result has audio but no sample rate".into(),
                )),
                (None, _, None) => Err(TtsError::Synthesis(
                    "inference result has neither audio nor a path".into(),
                )),
            },
        }
    }
}

/// Backend that delegates each chunk to an external inference program.
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    command: String,
    model_path: PathBuf,
}

impl ExternalEngine {
    pub fn new(settings: &SynthesisSettings) -> Result<Self, TtsError> {
        let model_path = settings
            .model_path
            .clone()
            .ok_or(TtsError::MissingModelPath(EngineKind::External))?;
        if settings.inference_command.trim().is_empty() {
            return Err(TtsError::InvalidSetting {
                field: "inference_command",
                reason: "must name an executable".into(),
            });
        }
        Ok(Self {
            command: settings.inference_command.clone(),
            model_path,
        })
    }
}

impl SynthesisEngine for ExternalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::External
    }

    fn synthesize(
        &mut self,
        text: &str,
        settings: &SynthesisSettings,
    ) -> Result<Vec<Waveform>, TtsError> {
        let request = InferenceRequest {
            text,
            voice: &settings.voice,
            language: &settings.language,
            instruct: settings.instruct.as_deref(),
            model_path: &self.model_path,
            max_new_tokens: settings.max_new_tokens,
            do_sample: settings.do_sample,
        };
        let payload = serde_json::to_vec(&request)?;

        let mut cmd = Command::new(&self.command);
        cmd.arg("--model").arg(&self.model_path);
        let stdout = process::run(&self.command, HINT, &mut cmd, Some(&payload))?;

        let output: InferenceOutput = serde_json::from_slice(&stdout).map_err(|_| {
            TtsError::UnparseableToolOutput {
                tool: self.command.clone(),
                output: String::from_utf8_lossy(&stdout).chars().take(200).collect(),
            }
        })?;
        output.into_waveforms()
    }
}
