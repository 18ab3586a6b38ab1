use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

use super::AudioBlock;

/// Recording file name for a flush at `now`
pub fn recording_filename(now: DateTime<Local>) -> String {
    format!("audio_{}.wav", now.format("%Y%m%d%H%M%S"))
}

/// Write blocks back to back as one mono int16 WAV file; returns the frame count
pub fn write_pcm_wav<P: AsRef<Path>>(
    path: P,
    blocks: &[AudioBlock],
    sample_rate: u32,
) -> Result<u64, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let mut frames = 0u64;

    for block in blocks {
        for &sample in block.samples() {
            writer.write_sample(sample)?;
        }
        frames += block.len() as u64;
    }

    writer.finalize()?;
    Ok(frames)
}
