use std::path::{Path, PathBuf};
use std::process::Command;

use crate::process::FFMPEG;
use crate::TtsError;

use super::ffmpeg::probe_sample_rate;
use super::parent_dir;

/// One ffmpeg invocation that concatenates inputs with silence gaps.
///
/// Every input and every gap is resampled to `sample_rate`, forced to mono
/// float and given timestamps starting at zero before the concat filter sees
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    inputs: Vec<PathBuf>,
    sample_rate: u32,
    gap_secs: f64,
}

impl MergePlan {
    pub fn new(inputs: Vec<PathBuf>, sample_rate: u32, gap_secs: f64) -> Self {
        Self {
            inputs,
            sample_rate,
            gap_secs,
        }
    }

    /// The `-filter_complex` graph, ending in the `[out]` label.
    pub fn filter_graph(&self) -> String {
        let rate = self.sample_rate;
        let normalize = format!(
            "aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts=mono,asetpts=PTS-STARTPTS"
        );
        let gap_samples = self.gap_samples();

        let mut filters = Vec::new();
        let mut labels = String::new();
        for index in 0..self.inputs.len() {
            filters.push(format!("[{index}:a]aresample={rate},{normalize}[a{index}]"));
            labels.push_str(&format!("[a{index}]"));
            if gap_samples > 0 && index + 1 < self.inputs.len() {
                filters.push(format!(
                    "anullsrc=r={rate}:cl=mono,atrim=end_sample={gap_samples},{normalize}[g{index}]"
                ));
                labels.push_str(&format!("[g{index}]"));
            }
        }
        let segments = labels.matches('[').count();
        filters.push(format!("{labels}concat=n={segments}:v=0:a=1[out]"));
        filters.join(";")
    }

    /// Gap length in whole samples at the output rate. Gaps that round to
    /// nothing are left out, since `anullsrc` only ends when trimmed.
    pub fn gap_samples(&self) -> u64 {
        (self.gap_secs * f64::from(self.sample_rate)).round() as u64
    }

    /// The complete ffmpeg command writing MP3 to `output`.
    pub fn command(&self, output: &Path) -> Command {
        let mut cmd = FFMPEG.command();
        cmd.args(["-nostdin", "-y", "-loglevel", "error"]);
        for input in &self.inputs {
            cmd.arg("-i").arg(input);
        }
        cmd.arg("-filter_complex")
            .arg(self.filter_graph())
            .args(["-map", "[out]", "-ar"])
            .arg(self.sample_rate.to_string())
            .args(["-codec:a", "libmp3lame", "-q:a", "2", "-f", "mp3"])
            .arg(output);
        cmd
    }
}

/// Concatenate `inputs` in order into `output`, with `gap_secs` of silence
/// between consecutive files.
///
/// The output sample rate is the first input's. All inputs must exist; every
/// missing one is named in a single [`TtsError::MissingInputs`].
pub fn merge_audio_files(
    inputs: &[PathBuf],
    output: &Path,
    gap_secs: f64,
) -> Result<PathBuf, TtsError> {
    if inputs.is_empty() {
        return Err(TtsError::EmptyMergeInput);
    }
    let missing: Vec<PathBuf> = inputs.iter().filter(|p| !p.is_file()).cloned().collect();
    if !missing.is_empty() {
        return Err(TtsError::MissingInputs(missing));
    }
    if !(gap_secs.is_finite() && gap_secs >= 0.0) {
        return Err(TtsError::InvalidSetting {
            field: "chapter_gap_secs",
            reason: format!("must be a non-negative number, got {gap_secs}"),
        });
    }

    let sample_rate = probe_sample_rate(&inputs[0])?;
    let parent = parent_dir(output);
    std::fs::create_dir_all(parent)?;
    // Dropping the temp path removes whatever ffmpeg left behind on failure.
    let staging = tempfile::Builder::new()
        .prefix(".merge-")
        .suffix(".mp3")
        .tempfile_in(parent)?
        .into_temp_path();

    let plan = MergePlan::new(inputs.to_vec(), sample_rate, gap_secs);
    log::info!(
        "Merging {} files at {} Hz into {}",
        inputs.len(),
        sample_rate,
        output.display()
    );
    FFMPEG.run(&mut plan.command(&staging), None)?;
    staging.persist(output).map_err(|e| TtsError::Io(e.error))?;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ffmpeg::ffmpeg_available;
    use crate::audio::{probe_duration, transcode_to_mp3};
    use crate::Waveform;

    #[test]
    fn filter_graph_interleaves_gaps() {
        let plan = MergePlan::new(vec!["a.mp3".into(), "b.mp3".into()], 24000, 1.6);
        let norm = "aformat=sample_fmts=fltp:sample_rates=24000:channel_layouts=mono,asetpts=PTS-STARTPTS";
        assert_eq!(
            plan.filter_graph(),
            format!(
                "[0:a]aresample=24000,{norm}[a0];\
                 anullsrc=r=24000:cl=mono,atrim=end_sample=38400,{norm}[g0];\
                 [1:a]aresample=24000,{norm}[a1];\
                 [a0][g0][a1]concat=n=3:v=0:a=1[out]"
            )
        );
    }

    #[test]
    fn zero_gap_and_single_input() {
        let plan = MergePlan::new(vec!["a.mp3".into(), "b.mp3".into()], 22050, 0.0);
        let graph = plan.filter_graph();
        assert!(!graph.contains("anullsrc"));
        assert!(graph.ends_with("[a0][a1]concat=n=2:v=0:a=1[out]"));

        let plan = MergePlan::new(vec!["only.mp3".into()], 22050, 1.6);
        assert!(plan.filter_graph().ends_with("[a0]concat=n=1:v=0:a=1[out]"));
    }

    #[test]
    fn gap_shorter_than_a_sample_is_dropped() {
        let plan = MergePlan::new(vec!["a.mp3".into(), "b.mp3".into()], 24000, 0.0004);
        assert_eq!(plan.gap_samples(), 10);
        assert!(plan.filter_graph().contains("atrim=end_sample=10,"));

        let plan = MergePlan::new(vec!["a.mp3".into(), "b.mp3".into()], 24000, 0.00001);
        assert_eq!(plan.gap_samples(), 0);
        let graph = plan.filter_graph();
        assert!(!graph.contains("anullsrc"));
        assert!(graph.ends_with("[a0][a1]concat=n=2:v=0:a=1[out]"));
    }

    #[test]
    fn command_lists_inputs_in_order() {
        let plan = MergePlan::new(vec!["one.mp3".into(), "two.mp3".into()], 24000, 1.6);
        let cmd = plan.command(Path::new("book.mp3"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let inputs: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(inputs, vec!["one.mp3", "two.mp3"]);
        assert_eq!(args.last().map(String::as_str), Some("book.mp3"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            merge_audio_files(&[], Path::new("book.mp3"), 1.6),
            Err(TtsError::EmptyMergeInput)
        ));
    }

    #[test]
    fn missing_inputs_are_reported_together() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.mp3");
        std::fs::write(&present, b"").unwrap();
        let gone_a = dir.path().join("gone-a.mp3");
        let gone_b = dir.path().join("gone-b.mp3");
        let output = dir.path().join("book.mp3");

        let err = merge_audio_files(&[gone_a.clone(), present, gone_b.clone()], &output, 1.6)
            .unwrap_err();
        match err {
            TtsError::MissingInputs(paths) => assert_eq!(paths, vec![gone_a, gone_b]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn merges_with_gap_at_first_rate() {
        if !ffmpeg_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut chapters = Vec::new();
        for (name, rate) in [("one", 24000), ("two", 16000)] {
            let wav = dir.path().join(format!("{name}.wav"));
            let mp3 = dir.path().join(format!("{name}.mp3"));
            Waveform::new(vec![0.2; rate as usize], rate).write_wav(&wav).unwrap();
            transcode_to_mp3(&wav, &mp3).unwrap();
            chapters.push(mp3);
        }

        let output = dir.path().join("book").join("book.mp3");
        assert_eq!(merge_audio_files(&chapters, &output, 1.0).unwrap(), output);
        assert_eq!(probe_sample_rate(&output).unwrap(), 24000);
        let secs = probe_duration(&output).unwrap();
        assert!((secs - 3.0).abs() < 0.2, "duration was {secs}");
        assert_eq!(std::fs::read_dir(output.parent().unwrap()).unwrap().count(), 1);
    }
}
