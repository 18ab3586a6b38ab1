//! Pipeline lifecycle state and capture statistics

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for the capture loop (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub blocks_captured: AtomicU64,
    pub samples_captured: AtomicU64,
    pub audio_samples: AtomicU64,
    pub play_errors: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_block(&self, samples: usize) {
        self.blocks_captured.fetch_add(1, Ordering::Relaxed);
        self.samples_captured.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_audio(&self, samples: usize) {
        self.audio_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_play_error(&self) {
        self.play_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks(&self) -> u64 {
        self.blocks_captured.load(Ordering::Relaxed)
    }

    pub fn iq_samples(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    pub fn audio_samples(&self) -> u64 {
        self.audio_samples.load(Ordering::Relaxed)
    }

    pub fn play_errors(&self) -> u64 {
        self.play_errors.load(Ordering::Relaxed)
    }
}

/// Lifecycle of the receive pipeline. Single shot: never returns to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = CaptureStats::new();
        stats.record_block(15_000);
        stats.record_block(15_000);
        stats.record_audio(3_000);
        stats.record_play_error();

        assert_eq!(stats.blocks(), 2);
        assert_eq!(stats.iq_samples(), 30_000);
        assert_eq!(stats.audio_samples(), 3_000);
        assert_eq!(stats.play_errors(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Stopping.to_string(), "stopping");
    }
}
