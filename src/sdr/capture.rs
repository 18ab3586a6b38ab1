//! RTL-SDR capture via rtl_sdr process
//!
//! Spawns rtl_sdr to stream raw 8-bit IQ samples on stdout, then hands
//! fixed-size blocks to a handler on a dedicated capture thread.

use anyhow::{Context, Result};
use rustfft::num_complex::Complex;
use std::io::{BufRead, ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::GainMode;
use crate::device::CaptureStats;

/// How long rtl_sdr gets to fail (no device, device busy) before open succeeds
const OPEN_SETTLE_TIME: Duration = Duration::from_millis(250);

/// Interval between periodic capture statistics
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// One block of complex baseband samples
pub type IqBlock = Vec<Complex<f64>>;

/// Errors opening the tuner
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rtl_sdr exited during startup ({0})")]
    Exited(ExitStatus),

    #[error("failed to capture rtl_sdr stdout")]
    NoStream,

    #[error("failed to poll rtl_sdr: {0}")]
    Poll(#[source] std::io::Error),
}

/// RTL-SDR configuration
#[derive(Debug, Clone)]
pub struct SdrConfig {
    pub device_index: u32,
    pub center_freq: u32,
    pub sample_rate: u32,
    pub gain: GainMode,
    pub ppm_error: i32,
    pub rtl_sdr_path: String,
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            center_freq: 93_900_000,
            sample_rate: 240_000,
            gain: GainMode::Auto,
            ppm_error: 40,
            rtl_sdr_path: "rtl_sdr".to_string(),
        }
    }
}

impl SdrConfig {
    /// Build rtl_sdr command:
    /// rtl_sdr -d <device> -f <freq> -s <rate> -g <gain> -p <ppm> -
    fn command(&self) -> Command {
        // rtl_sdr treats gain 0 as automatic gain
        let gain = match self.gain {
            GainMode::Auto => "0".to_string(),
            GainMode::Manual(tenths) => (tenths as f32 / 10.0).to_string(),
        };

        let mut cmd = Command::new(&self.rtl_sdr_path);
        cmd.arg("-d").arg(self.device_index.to_string())
           .arg("-f").arg(self.center_freq.to_string())
           .arg("-s").arg(self.sample_rate.to_string())
           .arg("-g").arg(gain);

        if self.ppm_error != 0 {
            cmd.arg("-p").arg(self.ppm_error.to_string());
        }

        // Output to stdout (continuous mode)
        cmd.arg("-");
        cmd
    }
}

/// Convert interleaved unsigned 8-bit I/Q bytes to complex samples in [-1, 1]
pub fn iq_from_bytes(bytes: &[u8]) -> IqBlock {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            Complex::new(
                (pair[0] as f64 - 127.5) / 127.5,
                (pair[1] as f64 - 127.5) / 127.5,
            )
        })
        .collect()
}

/// Cooperative cancellation flag shared with the capture thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives every captured block, one at a time, on the capture thread
pub trait BlockHandler: Send + 'static {
    fn on_block(&mut self, block: IqBlock);

    /// Called once after capture has stopped and the thread has been joined
    fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Handle to the tuner: the rtl_sdr process and its sample stream
pub struct DeviceHandle {
    child: Option<Child>,
    stream: Option<Box<dyn Read + Send>>,
}

impl DeviceHandle {
    /// Start rtl_sdr with the tuning parameters and wait for it to settle
    pub fn open(config: &SdrConfig) -> Result<Self, DeviceError> {
        info!("===========================================");
        info!("  Opening RTL-SDR");
        info!("===========================================");
        info!("  Device index: {}", config.device_index);
        info!("  Center frequency: {:.3} MHz", config.center_freq as f64 / 1_000_000.0);
        info!("  Sample rate: {} kSPS", config.sample_rate / 1_000);
        info!("  Gain: {}", config.gain);
        info!("  PPM error: {}", config.ppm_error);

        let mut cmd = config.command();
        cmd.stdin(Stdio::null())
           .stdout(Stdio::piped())
           .stderr(Stdio::piped());

        info!("Executing: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| DeviceError::Spawn {
            path: config.rtl_sdr_path.clone(),
            source,
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DeviceError::NoStream);
        };

        // Spawn stderr reader for logging
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = std::io::BufReader::new(stderr);
                for line in reader.lines().map_while(std::result::Result::ok) {
                    if !line.trim().is_empty() {
                        info!("[rtl_sdr] {}", line.trim());
                    }
                }
            });
        }

        thread::sleep(OPEN_SETTLE_TIME);
        match child.try_wait() {
            Ok(Some(status)) => return Err(DeviceError::Exited(status)),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DeviceError::Poll(e));
            }
        }

        Ok(Self {
            child: Some(child),
            stream: Some(Box::new(stdout)),
        })
    }

    /// Wrap an already-open IQ byte stream
    #[cfg(test)]
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            child: None,
            stream: Some(Box::new(reader)),
        }
    }

    fn take_stream(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stream.take()
    }

    /// Stop the tuner process so a blocked read returns
    pub fn interrupt(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill() {
                debug!("rtl_sdr kill: {}", e);
            }
        }
    }

    /// Release the tuner. Safe to call more than once.
    pub fn close(&mut self) {
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => info!("rtl_sdr exited ({})", status),
                Err(e) => warn!("Failed to reap rtl_sdr: {}", e),
            }
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.child.is_some() || self.stream.is_some()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// A running capture thread and the handler it owns
pub struct CaptureSession<H> {
    token: CancelToken,
    thread: Option<JoinHandle<H>>,
}

impl<H: BlockHandler> CaptureSession<H> {
    /// True once the capture loop has exited (cancelled or end of stream)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel capture and wait for the in-flight block to complete.
    ///
    /// Returns the handler the first time; later calls return `None`.
    pub fn cancel(&mut self, device: &mut DeviceHandle) -> Option<H> {
        self.token.cancel();
        device.interrupt();

        let thread = self.thread.take()?;
        match thread.join() {
            Ok(handler) => Some(handler),
            Err(_) => {
                error!("SDR capture thread panicked");
                None
            }
        }
    }
}

/// Start reading `block_length` IQ samples at a time from the device.
///
/// Each block is passed to `handler` on a dedicated thread; blocks are never
/// delivered concurrently. The loop runs until `token` is cancelled or the
/// stream ends.
pub fn start_async_capture<H: BlockHandler>(
    device: &mut DeviceHandle,
    block_length: usize,
    token: CancelToken,
    stats: Arc<CaptureStats>,
    mut handler: H,
) -> Result<CaptureSession<H>> {
    let stream = device
        .take_stream()
        .context("Device stream already in use")?;

    let thread_token = token.clone();
    let thread = thread::Builder::new()
        .name("sdr-capture".to_string())
        .spawn(move || {
            run_capture(stream, block_length, &thread_token, &stats, &mut handler);
            handler
        })
        .context("Failed to spawn capture thread")?;

    Ok(CaptureSession {
        token,
        thread: Some(thread),
    })
}

/// Main capture loop (runs in dedicated thread)
fn run_capture<H: BlockHandler>(
    mut stream: Box<dyn Read + Send>,
    block_length: usize,
    token: &CancelToken,
    stats: &CaptureStats,
    handler: &mut H,
) {
    // 2 bytes (I, Q) per sample
    let mut buffer = vec![0u8; block_length * 2];

    let mut last_stats_time = Instant::now();
    let mut last_sample_count = 0u64;
    let mut first_data = true;

    info!("IQ capture started ({} samples per block)", block_length);

    while !token.is_cancelled() {
        match stream.read_exact(&mut buffer) {
            Ok(()) => {
                if first_data {
                    info!("First IQ data received! ({} bytes)", buffer.len());
                    first_data = false;
                }

                stats.record_block(block_length);
                handler.on_block(iq_from_bytes(&buffer));

                if last_stats_time.elapsed() >= STATS_INTERVAL {
                    let current_samples = stats.iq_samples();
                    let elapsed = last_stats_time.elapsed().as_secs_f32();
                    let rate = (current_samples - last_sample_count) as f32 / elapsed;

                    info!(
                        "[SDR Stats] Rate: {:.1} kSPS | Blocks: {} | Audio samples: {} | Play errors: {}",
                        rate / 1_000.0,
                        stats.blocks(),
                        stats.audio_samples(),
                        stats.play_errors()
                    );

                    last_stats_time = Instant::now();
                    last_sample_count = current_samples;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                if !token.is_cancelled() {
                    warn!("rtl_sdr stdout closed (EOF)");
                }
                break;
            }
            Err(e) => {
                if !token.is_cancelled() {
                    error!("Error reading from rtl_sdr: {}", e);
                }
                break;
            }
        }
    }

    info!(
        "IQ capture stopped. Blocks={}, Samples={}",
        stats.blocks(),
        stats.iq_samples()
    );
}
