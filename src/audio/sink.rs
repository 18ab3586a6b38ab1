//! Audio sink - live playback plus the optional recording buffer

use chrono::Local;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

use super::wav::{recording_filename, write_pcm_wav};
use super::{AudioBlock, AudioOutput, SinkError};

/// Plays every block and, when recording, keeps it until shutdown.
///
/// The recording buffer grows without bound for the whole session.
pub struct AudioSink {
    output: Box<dyn AudioOutput>,
    recording: Option<Vec<AudioBlock>>,
    output_dir: PathBuf,
    sample_rate: u32,
    flushed: bool,
}

impl AudioSink {
    pub fn new(
        output: Box<dyn AudioOutput>,
        record_to_file: bool,
        output_dir: PathBuf,
        sample_rate: u32,
    ) -> Self {
        Self {
            output,
            recording: record_to_file.then(Vec::new),
            output_dir,
            sample_rate,
            flushed: false,
        }
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Samples held in the recording buffer
    #[cfg(test)]
    pub fn recorded_frames(&self) -> usize {
        self.recording
            .as_ref()
            .map_or(0, |blocks| blocks.iter().map(AudioBlock::len).sum())
    }

    /// Blocking write to the live output
    pub fn play(&mut self, block: &AudioBlock) -> io::Result<()> {
        self.output.write(&block.to_le_bytes())
    }

    /// Append to the recording buffer; no-op unless recording
    pub fn record(&mut self, block: AudioBlock) {
        if let Some(blocks) = self.recording.as_mut() {
            blocks.push(block);
        }
    }

    /// Write the recording to `<output_dir>/audio_<timestamp>.wav`.
    ///
    /// Returns `None` without touching the filesystem when recording is off.
    /// The buffer is consumed; a second call is an error.
    pub fn flush(&mut self) -> Result<Option<PathBuf>, SinkError> {
        if self.flushed {
            return Err(SinkError::AlreadyFlushed);
        }
        self.flushed = true;

        let Some(blocks) = self.recording.take() else {
            debug!("Recording disabled, nothing to flush");
            return Ok(None);
        };

        std::fs::create_dir_all(&self.output_dir).map_err(|source| SinkError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.output_dir.join(recording_filename(Local::now()));
        let frames = write_pcm_wav(&path, &blocks, self.sample_rate).map_err(|source| {
            SinkError::Wav {
                path: path.clone(),
                source,
            }
        })?;

        info!(
            "Saved {} frames ({:.1} s) to {}",
            frames,
            frames as f64 / self.sample_rate as f64,
            path.display()
        );
        Ok(Some(path))
    }

    /// Release the live output
    pub fn close(&mut self) {
        self.output.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryOutput;
    use hound::WavReader;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fm-capture-sink-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_play_writes_le_pcm() {
        let output = MemoryOutput::default();
        let mut sink = AudioSink::new(Box::new(output.clone()), false, temp_dir("play"), 48_000);

        sink.play(&AudioBlock::new(vec![256, -1])).unwrap();
        assert_eq!(*output.data.lock().unwrap(), vec![0x00, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn test_record_disabled_never_writes() {
        let dir = temp_dir("disabled");
        let mut sink = AudioSink::new(Box::new(MemoryOutput::default()), false, dir.clone(), 48_000);

        sink.record(AudioBlock::new(vec![1, 2, 3]));
        assert!(!sink.is_recording());
        assert_eq!(sink.recorded_frames(), 0);
        assert_eq!(sink.flush().unwrap(), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_flush_writes_all_blocks() {
        let dir = temp_dir("enabled");
        let mut sink = AudioSink::new(Box::new(MemoryOutput::default()), true, dir.clone(), 48_000);

        sink.record(AudioBlock::new(vec![10; 3_000]));
        sink.record(AudioBlock::new(vec![-10; 3_000]));
        sink.record(AudioBlock::new(vec![7; 1_234]));
        assert_eq!(sink.recorded_frames(), 7_234);

        let path = sink.flush().unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audio_") && name.ends_with(".wav"));
        assert_eq!(name.len(), "audio_YYYYMMDDHHMMSS.wav".len());

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.duration(), 7_234);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_flush_only_once() {
        let dir = temp_dir("once");
        let mut sink = AudioSink::new(Box::new(MemoryOutput::default()), true, dir.clone(), 48_000);
        sink.record(AudioBlock::new(vec![0; 10]));

        assert!(sink.flush().unwrap().is_some());
        assert!(matches!(sink.flush(), Err(SinkError::AlreadyFlushed)));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
