//! Offline renderer: runs a WAV file through the full engine with frame
//! ticks derived from the sample clock.
//!
//! ```text
//! sleepy_render <input.wav> <output.wav> [settings.json]
//! ```
//! `SLEEPY_LOG=debug` turns on controller logging.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sleepytube_audio::debug::{init_logger, parse_level};
use sleepytube_audio::media::{GraphStore, PlaybackControl};
use sleepytube_audio::settings::{Settings, SettingsUpdate};
use sleepytube_audio::{MediaId, OfflineMedia, SleepEngine};
use std::path::PathBuf;

/// Host frame rate the controllers are tuned for.
const FRAME_RATE: f64 = 60.0;

fn read_interleaved(reader: WavReader<std::io::BufReader<std::fs::File>>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(samples)
}

fn main() -> Result<()> {
    let level = std::env::var("SLEEPY_LOG")
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(log::LevelFilter::Info);
    init_logger(level);

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .context("usage: sleepy_render <input.wav> <output.wav> [settings.json]")?;
    let output = args
        .next()
        .map(PathBuf::from)
        .context("missing output path")?;
    let mut settings = Settings::default();
    if let Some(path) = args.next() {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings '{path}'"))?;
        settings.apply(&SettingsUpdate::from_json(&json)?);
    }

    let reader = WavReader::open(&input)
        .with_context(|| format!("failed to open input WAV '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples = read_interleaved(reader)?;
    let total_frames = samples.len() / channels.max(1);

    let media = OfflineMedia::new(MediaId(1), spec.sample_rate as f32, channels);
    let mut engine = SleepEngine::new(media, GraphStore::new(), settings);
    engine
        .connect(0.0)
        .with_context(|| format!("cannot process '{}'", input.display()))?;

    let block = (spec.sample_rate as f64 / FRAME_RATE).round().max(1.0) as usize;
    let block_ms = block as f64 * 1000.0 / spec.sample_rate as f64;
    let mut planar = vec![vec![0.0f32; block]; channels];
    let mut rendered = Vec::with_capacity(samples.len());
    let mut now_ms = 0.0;

    for chunk in samples.chunks(block * channels) {
        let frames = chunk.len() / channels;
        for (i, frame) in chunk.chunks_exact(channels).enumerate() {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch][i] = s;
            }
        }
        {
            let mut refs: Vec<&mut [f32]> =
                planar.iter_mut().map(|c| &mut c[..frames]).collect();
            engine.media_mut().process(&mut refs);
        }
        for i in 0..frames {
            for ch in planar.iter() {
                rendered.push(ch[i]);
            }
        }
        now_ms += block_ms;
        engine.on_frame(now_ms);
    }

    let out_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, out_spec)
        .with_context(|| format!("failed to create output WAV '{}'", output.display()))?;
    for s in rendered {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    let state = engine.state();
    println!("Render summary for '{}':", input.display());
    println!("  frames processed : {}", total_frames);
    println!("  agc gain         : {:+.2} dB", state.current_gain_db);
    println!("  voice loudness   : {:.2} dB", state.current_loudness_db);
    if let Some(m) = state.meters {
        println!("  output loudness  : {:.2} LUFS (short-term)", m.output_lufs);
        println!("  limiter          : {:.2} dB reduction", m.limiter_reduction_db);
    }
    if let Some(rate) = state.speech_rate.filter(|r| r.enabled) {
        println!(
            "  speech rate      : {:.2} syl/s ({}), playback {:.2}x",
            rate.detected.syllables_per_second,
            rate.detected.category.name(),
            engine.media().playback_rate()
        );
    }
    engine.destroy();
    Ok(())
}
