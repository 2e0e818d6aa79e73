//! Narrate a markdown file.
//!
//! ```text
//! cargo run --example narrate -- chapter.md [out.mp3] [settings.json]
//! RUST_LOG=debug cargo run --example narrate --features kokoro -- chapter.md out.mp3 kokoro.json
//! ```
//!
//! Without a settings file the offline espeak-ng voice is used.

use std::path::{Path, PathBuf};
use std::time::Instant;

use audiobook_tts::audio::probe_duration;
use audiobook_tts::pipeline::{synthesize_text_audio, PipelineContext};
use audiobook_tts::settings::{EngineKind, SynthesisSettings, SynthesisSettingsBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().ok_or("usage: narrate <input.md> [out.mp3] [settings.json]")?);
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("mp3"));
    let settings = match args.next() {
        Some(path) => SynthesisSettings {
            enabled: true,
            ..SynthesisSettings::from_json_file(Path::new(&path))?
        },
        None => SynthesisSettingsBuilder::default()
            .enabled(true)
            .engine(EngineKind::System)
            .build()?,
    };

    let text = std::fs::read_to_string(&input)?;
    let mut ctx = PipelineContext::new();

    let start = Instant::now();
    match synthesize_text_audio(&mut ctx, &text, &output, &settings)? {
        Some(path) => {
            let elapsed = start.elapsed();
            let audio_secs = probe_duration(&path)?;
            println!(
                "Wrote {} ({:.1}s of audio in {:.2?}, {:.1}x real-time)",
                path.display(),
                audio_secs,
                elapsed,
                audio_secs / elapsed.as_secs_f64()
            );
        }
        None => println!("Nothing to narrate in {}", input.display()),
    }
    Ok(())
}
