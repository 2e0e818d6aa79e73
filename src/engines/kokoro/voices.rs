use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::TtsError;

use super::model::STYLE_DIM;

type StyleVector = [f32; STYLE_DIM];

/// Style vectors for every voice in a Kokoro voice archive.
///
/// A voice holds one style vector per phoneme count; the vector used for a
/// chunk is picked by its token length.
pub struct VoiceStore {
    voices: HashMap<String, Vec<StyleVector>>,
}

impl VoiceStore {
    /// Load a `.npz` archive whose entries are `<voice>.npy` arrays of shape
    /// `[N, 256]` (or `[N, 1, 256]`).
    pub fn load(path: &Path) -> Result<Self, TtsError> {
        let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(|e| {
            TtsError::ModelFormat(format!("{}: not a voice archive: {e}", path.display()))
        })?;

        let mut voices = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| TtsError::ModelFormat(format!("voice entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_end_matches(".npy").to_string();
            if name.is_empty() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            voices.insert(name.clone(), parse_npy(&data, &name)?);
        }

        log::info!("Loaded {} voices from {}", voices.len(), path.display());
        Ok(Self { voices })
    }

    /// Style vector of `voice` for a chunk of `token_count` phonemes.
    ///
    /// Counts past the table's end use the last vector.
    pub fn get_style(&self, voice: &str, token_count: usize) -> Result<StyleVector, TtsError> {
        let styles = self
            .voices
            .get(voice)
            .filter(|styles| !styles.is_empty())
            .ok_or_else(|| TtsError::VoiceNotFound(voice.to_string()))?;
        Ok(styles[token_count.min(styles.len() - 1)])
    }

    /// Voice names, sorted.
    pub fn list_voices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Decode a little-endian float32 `.npy` payload into style vectors.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<StyleVector>, TtsError> {
    let bad = |reason: String| TtsError::ModelFormat(format!("{name}.npy: {reason}"));

    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err(bad("missing numpy header".into()));
    }
    // v1 stores the header length as u16 at [8..10], v2+ as u32 at [8..12].
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        _ => return Err(bad("truncated header".into())),
    };
    let body = data
        .get(header_start + header_len..)
        .ok_or_else(|| bad("truncated header".into()))?;
    let header = String::from_utf8_lossy(&data[header_start..header_start + header_len]);
    if !header.contains("<f4") {
        return Err(bad(format!("expected little-endian float32, header was {header:?}")));
    }

    let row_bytes = STYLE_DIM * 4;
    if body.len() % row_bytes != 0 {
        return Err(bad(format!(
            "{} data bytes is not a whole number of {STYLE_DIM}-float rows",
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (value, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}
