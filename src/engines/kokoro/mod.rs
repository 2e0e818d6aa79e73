//! Kokoro-82M neural backend.
//!
//! Runs the Kokoro ONNX model through onnxruntime, with espeak-ng turning
//! text into IPA phonemes first.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-v1.0.onnx                 # fp32
//! ├── kokoro-v1.0.fp16.onnx            # fp16 (optional)
//! ├── kokoro-quant-convinteger.onnx    # int8 (optional)
//! ├── voices-v1.0.bin                  # voice style vectors (.npz)
//! └── config.json                      # phoneme vocabulary (or tokenizer.json)
//! ```
//!
//! The `precision` setting picks the `.onnx` file, `attention` picks the
//! graph optimisation level and `device` picks the execution provider
//! (`cuda[:N]` needs the `cuda` feature).
//!
//! # Voices
//!
//! Voices are named `{language_prefix}_{name}`. The prefix decides the
//! phonemizer language:
//!
//! | Prefix | Language | espeak-ng code |
//! |---|---|---|
//! | `af_`, `am_` | American English | `en-us` |
//! | `bf_`, `bm_` | British English | `en-gb` |
//! | `ef_`, `em_` | Spanish | `es` |
//! | `ff_` | French | `fr` |
//! | `hf_`, `hm_` | Hindi | `hi` |
//! | `if_`, `im_` | Italian | `it` |
//! | `jf_`, `jm_` | Japanese | `ja` |
//! | `pf_`, `pm_` | Brazilian Portuguese | `pt-br` |
//! | `zf_`, `zm_` | Mandarin Chinese | `cmn` |
//!
//! Voices with any other prefix use the `language` setting.

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod voices;

pub use engine::KokoroEngine;
pub use model::{KokoroModel, SAMPLE_RATE};
