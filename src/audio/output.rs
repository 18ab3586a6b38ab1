//! Live PCM output
//!
//! The player runs as a child process reading raw PCM from stdin. Blocks go
//! through a small bounded queue to a writer thread; when the player falls
//! behind the queue fills and `write` blocks, stalling the capture thread.

use crossbeam_channel::{bounded, Sender};
use std::io::{self, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::SinkError;

/// PCM blocks allowed in flight to the player
const QUEUE_BLOCKS: usize = 4;

/// Blocking PCM output device
pub trait AudioOutput: Send {
    /// Write raw S16_LE PCM, blocking until the device has accepted it
    fn write(&mut self, pcm: &[u8]) -> io::Result<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self) {}
}

/// Player process fed through its stdin
pub struct PipeOutput {
    command: String,
    tx: Option<Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl PipeOutput {
    /// Spawn the player from a whitespace-separated command line
    pub fn open(command_line: &str) -> Result<Self, SinkError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(SinkError::EmptyPlayerCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
           .stdin(Stdio::piped())
           .stdout(Stdio::null())
           .stderr(Stdio::inherit());

        info!("Starting audio player: {}", command_line);

        let mut child = cmd.spawn().map_err(|source| SinkError::Player {
            command: command_line.to_string(),
            source,
        })?;

        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SinkError::Player {
                command: command_line.to_string(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "stdin not captured"),
            });
        };

        let (tx, rx) = bounded::<Vec<u8>>(QUEUE_BLOCKS);
        let writer = thread::Builder::new()
            .name("audio-writer".to_string())
            .spawn(move || {
                for pcm in rx {
                    if let Err(e) = stdin.write_all(&pcm) {
                        warn!("Audio player stopped accepting data: {}", e);
                        break;
                    }
                }
                // stdin dropped here: the player sees EOF and drains
            })
            .map_err(|source| SinkError::Player {
                command: command_line.to_string(),
                source,
            })?;

        Ok(Self {
            command: command_line.to_string(),
            tx: Some(tx),
            writer: Some(writer),
            child: Some(child),
        })
    }
}

impl AudioOutput for PipeOutput {
    fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "audio output closed"))?;

        tx.send(pcm.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "audio player exited"))
    }

    fn close(&mut self) {
        // Closing the channel ends the writer thread, which closes stdin
        self.tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => debug!("{} exited ({})", self.command, status),
                Err(e) => warn!("Failed to reap audio player: {}", e),
            }
        }
    }
}

impl Drop for PipeOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Discards audio (`--no-audio`)
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn write(&mut self, _pcm: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Collects written PCM in memory
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    pub data: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    pub closed: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl AudioOutput for MemoryOutput {
    fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        self.data.lock().unwrap().extend_from_slice(pcm);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command() {
        assert!(matches!(PipeOutput::open("   "), Err(SinkError::EmptyPlayerCommand)));
    }

    #[test]
    fn test_missing_player() {
        assert!(matches!(
            PipeOutput::open("/nonexistent/player -q"),
            Err(SinkError::Player { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_to_cat() {
        let mut output = PipeOutput::open("cat").unwrap();
        for _ in 0..16 {
            output.write(&[0u8; 4096]).unwrap();
        }
        output.close();
        output.close();
        assert!(output.write(&[0u8; 2]).is_err());
    }

    #[test]
    fn test_null_output() {
        let mut output = NullOutput;
        assert!(output.write(&[1, 2, 3]).is_ok());
        output.close();
    }
}
