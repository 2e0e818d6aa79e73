use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{TtsError, Waveform};

use super::ffmpeg::transcode_to_mp3;
use super::timing::{paragraph_timings, timings_path, vtt_path, write_timings, write_vtt, ChunkTiming};
use super::{parent_dir, wav_spec, Encoder};

/// Check that every waveform shares the first one's sample rate.
pub fn ensure_uniform_sample_rate(waves: &[Waveform]) -> Result<Option<u32>, TtsError> {
    let Some(first) = waves.first() else {
        return Ok(None);
    };
    let expected = first.sample_rate();
    match waves.iter().find(|w| w.sample_rate() != expected) {
        Some(odd) => Err(TtsError::SampleRateMismatch {
            expected,
            found: odd.sample_rate(),
        }),
        None => Ok(Some(expected)),
    }
}

/// Incremental WAV writer whose sample rate is fixed by the first waveform.
///
/// The file is created lazily on the first write, so a sink that never
/// receives audio leaves nothing on disk.
pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    sample_rate: Option<u32>,
    samples_written: u64,
}

impl WavSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            sample_rate: None,
            samples_written: 0,
        }
    }

    /// Append a waveform. Fails with [`TtsError::SampleRateMismatch`] when
    /// its rate differs from the rate of the first waveform written.
    pub fn write(&mut self, wave: &Waveform) -> Result<(), TtsError> {
        let rate = wave.sample_rate();
        if let Some(expected) = self.sample_rate.filter(|&expected| expected != rate) {
            return Err(TtsError::SampleRateMismatch {
                expected,
                found: rate,
            });
        }
        let writer = match &mut self.writer {
            Some(writer) => writer,
            None => {
                self.sample_rate = Some(rate);
                self.writer
                    .insert(hound::WavWriter::create(&self.path, wav_spec(rate))?)
            }
        };
        for &sample in wave.samples() {
            writer.write_sample(sample)?;
        }
        self.samples_written += wave.samples().len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Seconds of audio written so far.
    pub fn duration_secs(&self) -> f64 {
        match self.sample_rate {
            Some(rate) if rate > 0 => self.samples_written as f64 / f64::from(rate),
            _ => 0.0,
        }
    }

    /// Flush the WAV header. Returns the sample rate, or `None` when nothing
    /// was written.
    pub fn finalize(self) -> Result<Option<u32>, TtsError> {
        match self.writer {
            Some(writer) => {
                writer.finalize()?;
                Ok(self.sample_rate)
            }
            None => Ok(None),
        }
    }
}

/// Streams the waveforms of one unit into a single MP3 file.
///
/// Intermediate files live in a private temporary directory beside the output
/// and are removed when the assembler is dropped, whether or not
/// [`AudioAssembler::finish`] ran. The MP3 is encoded inside that directory
/// and renamed into place only after the encoder succeeds.
///
/// With timings enabled, `finish` also writes the `.timed.json` and `.vtt`
/// sidecars. Given the unit's paragraphs, entries are per paragraph rather
/// than per chunk.
///
/// ```rust,no_run
/// use std::path::Path;
/// use audiobook_tts::audio::AudioAssembler;
/// use audiobook_tts::Waveform;
///
/// let mut assembler = AudioAssembler::create(Path::new("out/chapter.mp3"), false)?;
/// assembler.push_chunk("Hello.", &[Waveform::new(vec![0.1; 24000], 24000)])?;
/// let written = assembler.finish()?;
/// # Ok::<(), audiobook_tts::TtsError>(())
/// ```
pub struct AudioAssembler {
    output_path: PathBuf,
    workdir: TempDir,
    sink: WavSink,
    timings: Option<Vec<ChunkTiming>>,
    paragraphs: Vec<String>,
    encode: Encoder,
}

impl AudioAssembler {
    /// Prepare to write `output_path`, creating its directory if needed.
    /// With `record_timings`, a `.timed.json` sidecar is written on finish.
    pub fn create(output_path: &Path, record_timings: bool) -> Result<Self, TtsError> {
        let parent = parent_dir(output_path);
        std::fs::create_dir_all(parent)?;
        let workdir = tempfile::Builder::new().prefix(".tts-").tempdir_in(parent)?;
        let sink = WavSink::new(workdir.path().join("assembled.wav"));
        Ok(Self {
            output_path: output_path.to_path_buf(),
            workdir,
            sink,
            timings: record_timings.then(Vec::new),
            paragraphs: Vec::new(),
            encode: transcode_to_mp3,
        })
    }

    /// Report timings per paragraph instead of per chunk.
    pub fn with_paragraphs(mut self, paragraphs: Vec<String>) -> Self {
        self.paragraphs = paragraphs;
        self
    }

    /// Replace the ffmpeg MP3 transcode with another `(wav, output)` step.
    pub fn with_encoder(mut self, encode: Encoder) -> Self {
        self.encode = encode;
        self
    }

    /// Append the waveforms synthesized for one chunk of `text`.
    pub fn push_chunk(&mut self, text: &str, waves: &[Waveform]) -> Result<(), TtsError> {
        ensure_uniform_sample_rate(waves)?;
        let start = self.sink.duration_secs();
        for wave in waves {
            self.sink.write(wave)?;
        }
        if let Some(timings) = &mut self.timings {
            timings.push(ChunkTiming {
                text: text.to_string(),
                start,
                end: self.sink.duration_secs(),
            });
        }
        Ok(())
    }

    /// Seconds of audio pushed so far.
    pub fn duration_secs(&self) -> f64 {
        self.sink.duration_secs()
    }

    /// Transcode the collected audio and move it to the output path.
    pub fn finish(self) -> Result<PathBuf, TtsError> {
        let Self {
            output_path,
            workdir,
            sink,
            timings,
            paragraphs,
            encode,
        } = self;

        let wav_path = sink.path().to_path_buf();
        let samples = sink.samples_written();
        if sink.finalize()?.is_none() || samples == 0 {
            return Err(TtsError::Synthesis(format!(
                "no audio was produced for {}",
                output_path.display()
            )));
        }

        let encoded = workdir.path().join("encoded.mp3");
        encode(&wav_path, &encoded)?;
        std::fs::rename(&encoded, &output_path)?;

        if let Some(chunks) = timings {
            let by_paragraph = paragraph_timings(&paragraphs, &chunks);
            let entries = if by_paragraph.is_empty() { chunks } else { by_paragraph };
            let written = write_timings(&output_path, &entries)
                .and_then(|_| write_vtt(&output_path, &entries));
            if let Err(err) = written {
                for path in [timings_path(&output_path), vtt_path(&output_path), output_path] {
                    let _ = std::fs::remove_file(path);
                }
                return Err(err);
            }
        }
        log::info!("Wrote {}", output_path.display());
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ffmpeg::ffmpeg_available;
    use crate::audio::read_timings;

    /// Stands in for ffmpeg: the "encoded" file is the WAV itself.
    fn copy_encoder(input: &Path, output: &Path) -> Result<(), TtsError> {
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn tone(seconds: f32, rate: u32) -> Waveform {
        let len = (seconds * rate as f32) as usize;
        let samples = (0..len)
            .map(|i| (i as f32 * 330.0 * std::f32::consts::TAU / rate as f32).sin() * 0.25)
            .collect();
        Waveform::new(samples, rate)
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
    fn uniform_rate_check() {
        assert_eq!(ensure_uniform_sample_rate(&[]).unwrap(), None);
        let same = [tone(0.1, 24000), tone(0.1, 24000)];
        assert_eq!(ensure_uniform_sample_rate(&same).unwrap(), Some(24000));
        let mixed = [tone(0.1, 24000), tone(0.1, 22050)];
        assert!(matches!(
            ensure_uniform_sample_rate(&mixed),
            Err(TtsError::SampleRateMismatch {
                expected: 24000,
                found: 22050
            })
        ));
    }

    #[test]
    fn sink_rejects_a_second_rate() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::new(dir.path().join("out.wav"));
        sink.write(&tone(0.5, 16000)).unwrap();
        assert!(matches!(
            sink.write(&tone(0.5, 24000)),
            Err(TtsError::SampleRateMismatch { .. })
        ));
        assert_eq!(sink.samples_written(), 8000);
        assert_eq!(sink.finalize().unwrap(), Some(16000));

        let read = Waveform::read_wav(&dir.path().join("out.wav")).unwrap();
        assert_eq!(read.samples().len(), 8000);
    }

    #[test]
    fn mismatched_chunks_leave_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        {
            let mut assembler = AudioAssembler::create(&output, false).unwrap();
            assembler.push_chunk("One.", &[tone(0.2, 24000)]).unwrap();
            let err = assembler.push_chunk("Two.", &[tone(0.2, 22050)]).unwrap_err();
            assert!(matches!(err, TtsError::SampleRateMismatch { .. }));
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn nothing_pushed_is_an_error_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let assembler = AudioAssembler::create(&output, false).unwrap();
        assert!(matches!(assembler.finish(), Err(TtsError::Synthesis(_))));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn encodes_with_ffmpeg() {
        if !ffmpeg_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let mut assembler = AudioAssembler::create(&output, false).unwrap();
        assembler.push_chunk("Hello.", &[tone(0.5, 24000)]).unwrap();
        assert_eq!(assembler.finish().unwrap(), output);
        assert_eq!(entries(dir.path()), vec!["chapter.mp3"]);
        assert_eq!(crate::audio::probe_sample_rate(&output).unwrap(), 24000);
    }

    #[test]
    fn failed_encode_leaves_nothing_behind() {
        fn broken(_: &Path, _: &Path) -> Result<(), TtsError> {
            Err(TtsError::Synthesis("encoder down".into()))
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let mut assembler = AudioAssembler::create(&output, true)
            .unwrap()
            .with_encoder(broken);
        assembler.push_chunk("Hello.", &[tone(0.5, 24000)]).unwrap();
        assert!(matches!(assembler.finish(), Err(TtsError::Synthesis(_))));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn paragraph_timings_and_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let mut assembler = AudioAssembler::create(&output, true)
            .unwrap()
            .with_paragraphs(vec!["One two.".into(), "Three four.".into()])
            .with_encoder(copy_encoder);
        assembler.push_chunk("One two. Three four.", &[tone(1.0, 24000)]).unwrap();
        assembler.finish().unwrap();

        assert_eq!(entries(dir.path()), vec!["chapter.mp3", "chapter.timed.json", "chapter.vtt"]);
        let timings = read_timings(&output).unwrap();
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[1].text, "Three four.");
        assert!((timings[1].start - 0.5).abs() < 1e-9);
        assert!((timings[1].end - 1.0).abs() < 1e-9);
        let vtt = std::fs::read_to_string(dir.path().join("chapter.vtt")).unwrap();
        assert!(vtt.contains("00:00:00.500 --> 00:00:01.000\nThree four."));
    }

    #[test]
    fn writes_audio_and_chunk_timings() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("chapter.mp3");
        let mut assembler = AudioAssembler::create(&output, true)
            .unwrap()
            .with_encoder(copy_encoder);
        assembler.push_chunk("First.", &[tone(0.5, 24000)]).unwrap();
        assembler
            .push_chunk("Second.", &[tone(0.25, 24000), tone(0.25, 24000)])
            .unwrap();
        assert!((assembler.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(assembler.finish().unwrap(), output);

        assert_eq!(entries(dir.path()), vec!["chapter.mp3", "chapter.timed.json", "chapter.vtt"]);
        let timings = read_timings(&output).unwrap();
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[1].text, "Second.");
        assert!((timings[1].start - 0.5).abs() < 1e-9);
        assert!((timings[1].end - 1.0).abs() < 1e-9);
    }
}
