//! Entry points that turn text into finished audio files.
//!
//! Every entry point is a no-op returning `Ok(None)` (or an empty list) when
//! synthesis is disabled or the sanitized text is empty. Nothing is created on
//! disk in that case.

use std::path::{Path, PathBuf};

use crate::audio::{merge_audio_files, transcode_to_mp3, AudioAssembler, Encoder, AUDIO_EXTENSION};
use crate::cache::ModelCache;
use crate::engines::{create_engine, NeuralModel};
use crate::guard::synthesize_guarded;
use crate::text::{
    sanitize_markdown_for_tts, split_markdown_paragraphs, split_text_by_tokens, split_text_for_tts,
};
use crate::{SynthesisEngine, SynthesisSettings, TtsError};

/// File name of the whole-book audio inside the audio directory.
pub const BOOK_AUDIO_STEM: &str = "book";

/// File name of the back-cover synopsis audio inside the audio directory.
pub const SYNOPSIS_AUDIO_STEM: &str = "back-cover-synopsis";

/// State shared by successive pipeline calls: the loaded-model cache and the
/// final encoding step.
pub struct PipelineContext {
    models: ModelCache<NeuralModel>,
    encode: Encoder,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::with_model_cache(ModelCache::new())
    }
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_cache(models: ModelCache<NeuralModel>) -> Self {
        Self {
            models,
            encode: transcode_to_mp3,
        }
    }

    /// Encode finished units with `encode` instead of the ffmpeg MP3 transcode.
    pub fn with_encoder(mut self, encode: Encoder) -> Self {
        self.encode = encode;
        self
    }

    pub fn models(&self) -> &ModelCache<NeuralModel> {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelCache<NeuralModel> {
        &mut self.models
    }
}

/// Sanitize `text`, synthesize it with the configured engine and write it to
/// `output_path`.
///
/// When `keep_model_loaded` is off, the engine's model is evicted from the
/// context cache afterwards, whether synthesis succeeded or not.
pub fn synthesize_text_audio(
    ctx: &mut PipelineContext,
    text: &str,
    output_path: &Path,
    settings: &SynthesisSettings,
) -> Result<Option<PathBuf>, TtsError> {
    if !settings.enabled {
        log::debug!("Synthesis disabled, skipping {}", output_path.display());
        return Ok(None);
    }
    let cleaned = sanitize_markdown_for_tts(text);
    if cleaned.is_empty() {
        log::debug!("Nothing to speak for {}", output_path.display());
        return Ok(None);
    }
    settings.validate()?;

    let mut engine = create_engine(settings, &mut ctx.models)?;
    let result = render(engine.as_mut(), text, &cleaned, output_path, settings, ctx.encode);
    if !settings.keep_model_loaded {
        engine.release();
    }
    result.map(Some)
}

/// Like [`synthesize_text_audio`] but with a caller-supplied engine.
pub fn synthesize_with_engine(
    engine: &mut dyn SynthesisEngine,
    text: &str,
    output_path: &Path,
    settings: &SynthesisSettings,
) -> Result<Option<PathBuf>, TtsError> {
    if !settings.enabled {
        return Ok(None);
    }
    let cleaned = sanitize_markdown_for_tts(text);
    if cleaned.is_empty() {
        return Ok(None);
    }
    settings.validate()?;
    render(engine, text, &cleaned, output_path, settings, transcode_to_mp3).map(Some)
}

/// Narrate one chapter into `<audio_dir>/<chapter.stem>.mp3`.
pub fn synthesize_chapter_audio(
    ctx: &mut PipelineContext,
    chapter: &BookChapter,
    audio_dir: &Path,
    settings: &SynthesisSettings,
) -> Result<Option<PathBuf>, TtsError> {
    let output_path = audio_dir.join(format!("{}.{AUDIO_EXTENSION}", chapter.stem));
    synthesize_text_audio(ctx, &chapter.markdown, &output_path, settings)
}

/// Segment, synthesize and assemble `text`, the sanitized form of `source`.
fn render(
    engine: &mut dyn SynthesisEngine,
    source: &str,
    text: &str,
    output_path: &Path,
    settings: &SynthesisSettings,
    encode: Encoder,
) -> Result<PathBuf, TtsError> {
    let chunks = match engine.token_counter() {
        Some(counter) => split_text_by_tokens(text, settings.max_tokens, counter)?,
        None => split_text_for_tts(text, settings.max_chars),
    };
    log::info!(
        "Synthesizing {} chunk(s) with the {} engine into {}",
        chunks.len(),
        engine.kind(),
        output_path.display()
    );

    let mut assembler =
        AudioAssembler::create(output_path, settings.write_timings)?.with_encoder(encode);
    if settings.write_timings {
        assembler = assembler.with_paragraphs(split_markdown_paragraphs(source));
    }
    for (index, chunk) in chunks.iter().enumerate() {
        log::debug!("Chunk {}/{} ({} chars)", index + 1, chunks.len(), chunk.chars().count());
        let waves = synthesize_guarded(engine, chunk, settings)?;
        assembler.push_chunk(chunk, &waves)?;
    }
    assembler.finish()
}

/// One chapter of a book: the file stem its audio is named after and its
/// markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookChapter {
    pub stem: String,
    pub markdown: String,
}

impl BookChapter {
    pub fn new(stem: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            markdown: markdown.into(),
        }
    }

    /// Read a chapter from a markdown file, named after the file stem.
    pub fn from_file(path: &Path) -> Result<Self, TtsError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(stem, std::fs::read_to_string(path)?))
    }
}

/// Everything the book workflow needs to know about one book.
#[derive(Debug, Clone, Default)]
pub struct BookAudioRequest {
    /// Book directory; audio goes to `<output_dir>/<audio_dirname>/`.
    pub output_dir: PathBuf,
    pub title: String,
    pub byline: String,
    /// Chapters in reading order.
    pub chapters: Vec<BookChapter>,
    pub synopsis: Option<String>,
}

/// Join the title block and the non-empty chapters with blank lines.
pub fn build_audiobook_text<S: AsRef<str>>(title: &str, byline: &str, chapters: &[S]) -> String {
    let byline = byline.trim();
    let header = [
        title.trim().to_string(),
        if byline.is_empty() {
            String::new()
        } else {
            format!("By {byline}")
        },
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    std::iter::once(header.as_str())
        .chain(chapters.iter().map(|c| c.as_ref().trim()))
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Produce chapter, whole-book and synopsis audio for a book.
///
/// Chapters whose audio already exists are kept unless `overwrite_audio` is
/// set; a chapter that fails is logged and skipped. The whole-book file is
/// merged from the chapter files with `chapter_gap_secs` of silence between
/// them. In `book_only` mode, or when no chapter audio exists, the whole book
/// is synthesized as one unit instead. Failure to produce the whole-book file
/// is returned as an error.
///
/// Returns the files created by this call.
pub fn generate_book_audio(
    ctx: &mut PipelineContext,
    request: &BookAudioRequest,
    settings: &SynthesisSettings,
) -> Result<Vec<PathBuf>, TtsError> {
    if !settings.enabled {
        return Ok(Vec::new());
    }
    if request.chapters.is_empty() {
        return Err(TtsError::NoChapters(request.output_dir.clone()));
    }
    settings.validate()?;

    let audio_dir = request.output_dir.join(&settings.audio_dirname);
    let mut created = Vec::new();
    let mut chapter_audio = Vec::new();

    if !settings.book_only {
        for chapter in &request.chapters {
            let path = audio_dir.join(format!("{}.{AUDIO_EXTENSION}", chapter.stem));
            if path.exists() && !settings.overwrite_audio {
                log::info!("Keeping existing {}", path.display());
                chapter_audio.push(path);
                continue;
            }
            match synthesize_chapter_audio(ctx, chapter, &audio_dir, settings) {
                Ok(Some(path)) => {
                    created.push(path.clone());
                    chapter_audio.push(path);
                }
                Ok(None) => log::info!("Chapter {} has nothing to speak", chapter.stem),
                Err(err) => log::warn!("Skipped {}: {err}", path.display()),
            }
        }
    }

    let book_path = audio_dir.join(format!("{BOOK_AUDIO_STEM}.{AUDIO_EXTENSION}"));
    if settings.overwrite_audio || !book_path.exists() {
        let produced = if chapter_audio.is_empty() {
            let chapters: Vec<&str> = request.chapters.iter().map(|c| c.markdown.as_str()).collect();
            let text = build_audiobook_text(&request.title, &request.byline, &chapters);
            synthesize_text_audio(ctx, &text, &book_path, settings)?
        } else {
            Some(merge_audio_files(&chapter_audio, &book_path, settings.chapter_gap_secs)?)
        };
        created.extend(produced);
    }

    if !settings.book_only {
        if let Some(synopsis) = &request.synopsis {
            let path = audio_dir.join(format!("{SYNOPSIS_AUDIO_STEM}.{AUDIO_EXTENSION}"));
            if settings.overwrite_audio || !path.exists() {
                match synthesize_text_audio(ctx, synopsis, &path, settings) {
                    Ok(produced) => created.extend(produced),
                    Err(err) => log::warn!("Skipped {}: {err}", path.display()),
                }
            }
        }
    }

    log::info!("Book audio: {} file(s) created", created.len());
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ffmpeg_available;
    use crate::settings::{EngineKind, SynthesisSettingsBuilder};
    use crate::Waveform;

    /// Engine returning a fixed tone (or silence) for every chunk.
    struct ToneEngine {
        kind: EngineKind,
        level: f32,
        rates: Vec<u32>,
        calls: Vec<String>,
    }

    impl ToneEngine {
        fn new(kind: EngineKind, level: f32) -> Self {
            Self {
                kind,
                level,
                rates: vec![24000],
                calls: Vec::new(),
            }
        }
    }

    impl SynthesisEngine for ToneEngine {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn synthesize(
            &mut self,
            text: &str,
            _settings: &SynthesisSettings,
        ) -> Result<Vec<Waveform>, TtsError> {
            let rate = self.rates[self.calls.len() % self.rates.len()];
            self.calls.push(text.to_string());
            Ok(vec![Waveform::new(vec![self.level; rate as usize / 4], rate)])
        }
    }

    /// Keeps the intermediate WAV as the finished file, so no ffmpeg is needed.
    fn copy_encoder(input: &Path, output: &Path) -> Result<(), TtsError> {
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn render_markdown(
        engine: &mut ToneEngine,
        markdown: &str,
        output: &Path,
        settings: &SynthesisSettings,
    ) -> Result<PathBuf, TtsError> {
        let cleaned = sanitize_markdown_for_tts(markdown);
        render(engine, markdown, &cleaned, output, settings, copy_encoder)
    }

    fn enabled() -> SynthesisSettingsBuilder {
        let mut builder = SynthesisSettingsBuilder::default();
        builder.enabled(true).engine(EngineKind::System);
        builder
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn disabled_settings_produce_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("audio");
        let settings = SynthesisSettings::default();
        let mut ctx = PipelineContext::new();

        let chapter = BookChapter::new("chapter-1", "# One\n\nSome text.");
        let result = synthesize_chapter_audio(&mut ctx, &chapter, &audio_dir, &settings).unwrap();
        assert_eq!(result, None);
        assert!(!audio_dir.exists());

        let request = BookAudioRequest {
            output_dir: dir.path().to_path_buf(),
            chapters: vec![chapter],
            ..Default::default()
        };
        assert!(generate_book_audio(&mut ctx, &request, &settings).unwrap().is_empty());
        assert!(!audio_dir.exists());
    }

    #[test]
    fn markup_only_text_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("audio").join("empty.mp3");
        let settings = enabled().build().unwrap();
        let mut ctx = PipelineContext::new();
        let result = synthesize_text_audio(&mut ctx, "```\nlet x = 1;\n```\n\n---\n", &output, &settings);
        assert_eq!(result.unwrap(), None);
        assert!(!dir.path().join("audio").exists());
    }

    #[test]
    fn configuration_errors_come_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("audio").join("chapter.mp3");
        let settings = SynthesisSettingsBuilder::default()
            .enabled(true)
            .engine(EngineKind::Kokoro)
            .build()
            .unwrap();
        let mut ctx = PipelineContext::new();
        let err = synthesize_text_audio(&mut ctx, "Hello.", &output, &settings).unwrap_err();
        assert!(matches!(err, TtsError::MissingModelPath(EngineKind::Kokoro)));
        assert!(!dir.path().join("audio").exists());
    }

    #[test]
    fn hello_world_produces_one_file_and_no_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello.mp3");
        let settings = enabled().max_chars(1000usize).build().unwrap();
        let mut engine = ToneEngine::new(EngineKind::System, 0.3);

        let written =
            render_markdown(&mut engine, "Hello world. This is a test.", &output, &settings).unwrap();
        assert_eq!(written, output);
        assert_eq!(engine.calls, vec!["Hello world. This is a test."]);
        assert_eq!(entries(dir.path()), vec!["hello.mp3"]);
        assert_eq!(Waveform::read_wav(&output).unwrap().samples().len(), 6000);
    }

    #[test]
    fn hello_world_through_ffmpeg() {
        if !ffmpeg_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello.mp3");
        let settings = enabled().max_chars(1000usize).build().unwrap();
        let mut engine = ToneEngine::new(EngineKind::System, 0.3);

        let written =
            synthesize_with_engine(&mut engine, "Hello world. This is a test.", &output, &settings)
                .unwrap();
        assert_eq!(written, Some(output.clone()));
        assert_eq!(entries(dir.path()), vec!["hello.mp3"]);
    }

    #[test]
    fn timed_output_is_per_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let settings = enabled().write_timings(true).build().unwrap();
        let mut engine = ToneEngine::new(EngineKind::System, 0.3);

        render_markdown(
            &mut engine,
            "# Title\n\nFirst paragraph here.\n\nSecond one.",
            &output,
            &settings,
        )
        .unwrap();
        assert_eq!(entries(dir.path()), vec!["chapter.mp3", "chapter.timed.json", "chapter.vtt"]);
        let texts: Vec<String> = crate::audio::read_timings(&output)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["First paragraph here.", "Second one."]);
    }

    #[test]
    fn mixed_sample_rates_fail_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("mixed.mp3");
        let settings = enabled().max_chars(12usize).build().unwrap();
        let mut engine = ToneEngine::new(EngineKind::System, 0.3);
        engine.rates = vec![24000, 22050];

        let err = synthesize_with_engine(&mut engine, "First one. Second one.", &output, &settings)
            .unwrap_err();
        assert!(matches!(
            err,
            TtsError::SampleRateMismatch {
                expected: 24000,
                found: 22050
            }
        ));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn unrecoverable_silence_fails_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("silent.mp3");
        let settings = enabled().build().unwrap();
        let mut engine = ToneEngine::new(EngineKind::Kokoro, 0.0);

        let err = synthesize_with_engine(&mut engine, "Short line.", &output, &settings).unwrap_err();
        assert!(matches!(err, TtsError::Unsplittable { .. }));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn audiobook_text_layout() {
        let text = build_audiobook_text(" My Book ", "Ada", &["# One\n\nText.", "  ", "# Two"]);
        assert_eq!(text, "My Book\nBy Ada\n\n# One\n\nText.\n\n# Two");
        assert_eq!(build_audiobook_text("", "", &["Only."]), "Only.");
        assert_eq!(build_audiobook_text::<&str>("Title", "", &[]), "Title");
    }

    #[test]
    fn book_without_chapters_is_an_error() {
        let settings = enabled().build().unwrap();
        let request = BookAudioRequest::default();
        let err = generate_book_audio(&mut PipelineContext::new(), &request, &settings).unwrap_err();
        assert!(matches!(err, TtsError::NoChapters(_)));
    }

    #[test]
    fn book_workflow_with_system_voice() {
        if !ffmpeg_available() || !crate::engines::espeak::espeak_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let settings = enabled().build().unwrap();
        let request = BookAudioRequest {
            output_dir: dir.path().to_path_buf(),
            title: "Tiny Book".into(),
            byline: "Test Author".into(),
            chapters: vec![
                BookChapter::new("chapter-1", "# One\n\nThe first chapter."),
                BookChapter::new("chapter-2", "# Two\n\nThe second chapter."),
            ],
            synopsis: Some("A very short book.".into()),
        };
        let mut ctx = PipelineContext::new();
        let created = generate_book_audio(&mut ctx, &request, &settings).unwrap();
        assert_eq!(created.len(), 4);

        let audio_dir = dir.path().join("audio");
        assert_eq!(
            entries(&audio_dir),
            vec!["back-cover-synopsis.mp3", "book.mp3", "chapter-1.mp3", "chapter-2.mp3"]
        );

        // A second run keeps everything that exists.
        assert!(generate_book_audio(&mut ctx, &request, &settings).unwrap().is_empty());
    }
}
