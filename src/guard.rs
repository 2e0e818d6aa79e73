//! Silence guard for neural synthesis.
//!
//! A neural engine sometimes returns near-silent audio for text it failed to
//! vocalize. [`synthesize_guarded`] checks every chunk and, when the output is
//! silent, re-splits the chunk with [`recovery_split`] and synthesizes the
//! pieces one level deeper. Recovery happens at most [`MAX_RECOVERY_DEPTH`]
//! times per chunk; anything still silent after that fails the unit.

use std::collections::VecDeque;

use crate::error::preview;
use crate::text::recovery_split;
use crate::{SynthesisEngine, SynthesisSettings, TtsError, Waveform};

/// RMS amplitude below which a chunk is judged silent.
pub const SILENCE_RMS_THRESHOLD: f32 = 1e-4;

/// Re-split generations allowed for one chunk.
pub const MAX_RECOVERY_DEPTH: usize = 1;

/// Whether the waveforms returned for one chunk amount to silence.
///
/// All waveforms are measured together; no samples at all counts as silent.
pub fn is_silent(waves: &[Waveform]) -> bool {
    let count: usize = waves.iter().map(|w| w.samples().len()).sum();
    if count == 0 {
        return true;
    }
    let energy: f64 = waves
        .iter()
        .flat_map(|w| w.samples())
        .map(|&s| f64::from(s) * f64::from(s))
        .sum();
    ((energy / count as f64).sqrt() as f32) < SILENCE_RMS_THRESHOLD
}

/// Synthesize `chunk`, recovering from silent output where the engine asks
/// for it.
///
/// Sub-chunks are processed through a worklist of `(text, depth)` pairs.
/// Pieces are pushed to the front in reverse so the returned waveforms keep
/// the original reading order.
pub fn synthesize_guarded(
    engine: &mut dyn SynthesisEngine,
    chunk: &str,
    settings: &SynthesisSettings,
) -> Result<Vec<Waveform>, TtsError> {
    if !engine.guards_silence() {
        return engine.synthesize(chunk, settings);
    }

    let mut output = Vec::new();
    let mut worklist = VecDeque::from([(chunk.to_string(), 0usize)]);
    while let Some((text, depth)) = worklist.pop_front() {
        let waves = engine.synthesize(&text, settings)?;
        if !is_silent(&waves) {
            output.extend(waves);
            continue;
        }

        if depth >= MAX_RECOVERY_DEPTH {
            return Err(TtsError::RecoveryExhausted {
                depth,
                preview: preview(&text),
            });
        }
        let pieces = recovery_split(&text, settings.max_tokens, engine.token_counter())?
            .ok_or_else(|| TtsError::Unsplittable {
                preview: preview(&text),
            })?;
        log::warn!(
            "Silent audio for chunk {:?}; retrying as {} smaller pieces",
            preview(&text),
            pieces.len()
        );
        for piece in pieces.into_iter().rev() {
            worklist.push_front((piece, depth + 1));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{EngineKind, SynthesisSettingsBuilder};
    use crate::text::TokenCounter;

    /// Engine that returns one sample per byte of text, silent when
    /// `silent_when` says so.
    struct ScriptedEngine {
        kind: EngineKind,
        silent_when: fn(&str) -> bool,
        counts_tokens: bool,
        calls: Vec<String>,
    }

    impl ScriptedEngine {
        fn new(silent_when: fn(&str) -> bool) -> Self {
            Self {
                kind: EngineKind::Kokoro,
                silent_when,
                counts_tokens: false,
                calls: Vec::new(),
            }
        }
    }

    impl SynthesisEngine for ScriptedEngine {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn synthesize(
            &mut self,
            text: &str,
            _settings: &SynthesisSettings,
        ) -> Result<Vec<Waveform>, TtsError> {
            self.calls.push(text.to_string());
            let level = if (self.silent_when)(text) { 0.0 } else { 0.5 };
            Ok(vec![Waveform::new(vec![level; text.len()], 24000)])
        }

        fn token_counter(&mut self) -> Option<&mut dyn TokenCounter> {
            if self.counts_tokens {
                Some(self)
            } else {
                None
            }
        }
    }

    impl TokenCounter for ScriptedEngine {
        fn count_tokens(&mut self, text: &str) -> Result<usize, TtsError> {
            Ok(text.split_whitespace().count())
        }
    }

    fn settings() -> SynthesisSettings {
        SynthesisSettingsBuilder::default().build().unwrap()
    }

    fn long_text() -> String {
        (1..=20)
            .map(|n| format!("Sentence number {n:02} is here."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn silence_threshold() {
        assert!(is_silent(&[]));
        assert!(is_silent(&[Waveform::new(vec![], 24000)]));
        assert!(is_silent(&[Waveform::new(vec![5e-5; 100], 24000)]));
        assert!(!is_silent(&[Waveform::new(vec![2e-4; 100], 24000)]));
        assert!(!is_silent(&[
            Waveform::new(vec![0.0; 100], 24000),
            Waveform::new(vec![0.1; 100], 24000),
        ]));
    }

    #[test]
    fn audible_chunk_is_synthesized_once() {
        let mut engine = ScriptedEngine::new(|_| false);
        let waves = synthesize_guarded(&mut engine, "Hello world.", &settings()).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(engine.calls, vec!["Hello world."]);
    }

    #[test]
    fn silent_chunk_is_resplit_in_order() {
        let text = long_text();
        let mut engine = ScriptedEngine::new(|t| t.len() > 300);
        let waves = synthesize_guarded(&mut engine, &text, &settings()).unwrap();

        let pieces = &engine.calls[1..];
        assert_eq!(engine.calls[0], text);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.chars().count() <= 279));
        assert_eq!(pieces.join(" "), text);
        let lengths: Vec<usize> = waves.iter().map(|w| w.samples().len()).collect();
        let expected: Vec<usize> = pieces.iter().map(String::len).collect();
        assert_eq!(lengths, expected);
    }

    #[test]
    fn recovery_stops_after_one_generation() {
        let mut engine = ScriptedEngine::new(|_| true);
        let err = synthesize_guarded(&mut engine, &long_text(), &settings()).unwrap_err();
        assert!(matches!(err, TtsError::RecoveryExhausted { depth: 1, .. }));
        // The original chunk plus the first sub-chunk, nothing more.
        assert_eq!(engine.calls.len(), 2);
    }

    #[test]
    fn indivisible_silent_chunk_is_unsplittable() {
        let mut engine = ScriptedEngine::new(|_| true);
        let err = synthesize_guarded(&mut engine, "Ah... oh.", &settings()).unwrap_err();
        assert!(matches!(err, TtsError::Unsplittable { .. }));
        assert_eq!(engine.calls.len(), 1);
    }

    #[test]
    fn token_split_is_the_fallback() {
        let mut engine = ScriptedEngine::new(|t| t.contains(' '));
        engine.counts_tokens = true;
        let settings = SynthesisSettingsBuilder::default()
            .max_tokens(2usize)
            .build()
            .unwrap();
        let waves = synthesize_guarded(&mut engine, "Ah... oh.", &settings).unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(engine.calls, vec!["Ah... oh.", "Ah...", "oh."]);
    }

    #[test]
    fn unguarded_engines_pass_silence_through() {
        let mut engine = ScriptedEngine::new(|_| true);
        engine.kind = EngineKind::System;
        let waves = synthesize_guarded(&mut engine, "Quiet.", &settings()).unwrap();
        assert!(is_silent(&waves));
        assert_eq!(engine.calls.len(), 1);
    }
}
