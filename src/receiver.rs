//! FM receiver - the per-block callback: demodulate, play, record

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::AudioSink;
use crate::device::CaptureStats;
use crate::sdr::{BlockHandler, DemodulationEngine, IqBlock};

/// Runs on the capture thread for every IQ block
pub struct FmReceiver {
    engine: DemodulationEngine,
    sink: AudioSink,
    stats: Arc<CaptureStats>,
    play_failed: bool,
}

impl FmReceiver {
    pub fn new(engine: DemodulationEngine, sink: AudioSink, stats: Arc<CaptureStats>) -> Self {
        Self {
            engine,
            sink,
            stats,
            play_failed: false,
        }
    }
}

impl BlockHandler for FmReceiver {
    fn on_block(&mut self, block: IqBlock) {
        let audio = self.engine.process(&block);
        self.stats.record_audio(audio.len());

        if let Err(e) = self.sink.play(&audio) {
            self.stats.record_play_error();
            if !self.play_failed {
                warn!("Audio output failed, continuing without playback: {}", e);
                self.play_failed = true;
            }
        }

        self.sink.record(audio);
    }

    fn on_stop(&mut self) -> Result<()> {
        let flushed = self.sink.flush().context("Failed to save recording");
        self.sink.close();

        if let Some(path) = flushed? {
            info!("Recording saved to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOutput, MemoryOutput};
    use crate::config::DecimationPlan;
    use rustfft::num_complex::Complex;
    use std::io;
    use std::path::PathBuf;

    struct BrokenOutput;

    impl AudioOutput for BrokenOutput {
        fn write(&mut self, _pcm: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "player gone"))
        }
    }

    fn engine() -> DemodulationEngine {
        DemodulationEngine::new(DecimationPlan::new(240_000, 240_000, 48_000).unwrap())
    }

    fn block() -> IqBlock {
        vec![Complex::new(1.0, 0.0); 15_000]
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fm-capture-receiver-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_block_played_and_counted() {
        let output = MemoryOutput::default();
        let stats = CaptureStats::new();
        let sink = AudioSink::new(Box::new(output.clone()), false, temp_dir("play"), 48_000);
        let mut receiver = FmReceiver::new(engine(), sink, stats.clone());

        receiver.on_block(block());
        receiver.on_block(block());

        assert_eq!(stats.audio_samples(), 6_000);
        assert_eq!(output.data.lock().unwrap().len(), 12_000);

        receiver.on_stop().unwrap();
        assert_eq!(output.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!temp_dir("play").exists());
    }

    #[test]
    fn test_play_failure_keeps_recording() {
        let dir = temp_dir("broken");
        let stats = CaptureStats::new();
        let sink = AudioSink::new(Box::new(BrokenOutput), true, dir.clone(), 48_000);
        let mut receiver = FmReceiver::new(engine(), sink, stats.clone());

        receiver.on_block(block());
        receiver.on_block(block());
        assert_eq!(stats.play_errors(), 2);

        receiver.on_stop().unwrap();
        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
