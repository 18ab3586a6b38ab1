//! Audio delivery: live playback and optional WAV recording

mod output;
mod sink;
mod wav;

use std::path::PathBuf;
use thiserror::Error;

pub use output::{AudioOutput, NullOutput, PipeOutput};
pub use sink::AudioSink;

#[cfg(test)]
pub use output::MemoryOutput;

/// One block of mono signed 16-bit PCM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBlock {
    samples: Vec<i16>,
}

impl AudioBlock {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw little-endian PCM bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Audio output and recording errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("empty audio player command")]
    EmptyPlayerCommand,

    #[error("failed to start audio player '{command}': {source}")]
    Player {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("recording already flushed")]
    AlreadyFlushed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_bytes() {
        let block = AudioBlock::new(vec![1, -2, 0x1234]);
        assert_eq!(block.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
        assert_eq!(block.len(), 3);
        assert!(!block.is_empty());
    }
}
