//! Shutdown controller - owns the tuner and the capture session
//!
//! The interrupt path only touches the recording after the capture thread has
//! been joined, so the handler moves back to this side without a lock around
//! the buffer itself.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

use super::{CaptureStats, PipelineState};
use crate::sdr::{start_async_capture, BlockHandler, CancelToken, CaptureSession, DeviceHandle};

struct Inner<H> {
    state: PipelineState,
    device: Option<DeviceHandle>,
    session: Option<CaptureSession<H>>,
}

/// Idle → Running → Stopping → Terminated, once per process
pub struct ShutdownController<H> {
    inner: Mutex<Inner<H>>,
    token: CancelToken,
    stats: Arc<CaptureStats>,
}

impl<H: BlockHandler> ShutdownController<H> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                device: None,
                session: None,
            }),
            token: CancelToken::new(),
            stats: CaptureStats::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<H>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    /// Take ownership of the open device and start delivering blocks to `handler`
    pub fn start(&self, mut device: DeviceHandle, block_length: usize, handler: H) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != PipelineState::Idle {
            bail!("pipeline already {}", inner.state);
        }

        let session = start_async_capture(
            &mut device,
            block_length,
            self.token.clone(),
            self.stats.clone(),
            handler,
        )?;

        inner.device = Some(device);
        inner.session = Some(session);
        inner.state = PipelineState::Running;
        info!("Pipeline running");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when the capture loop ended on its own (tuner stream closed)
    pub fn capture_finished(&self) -> bool {
        let inner = self.lock();
        inner.state == PipelineState::Running
            && inner.session.as_ref().map_or(false, |s| s.is_finished())
    }

    /// Cancel capture, flush the recording, close the device.
    ///
    /// Returns `Ok(true)` for the call that performed the shutdown and
    /// `Ok(false)` for every other call. The device is closed even when the
    /// flush fails; the flush error is returned afterwards.
    pub fn request_shutdown(&self) -> Result<bool> {
        let mut inner = self.lock();
        if inner.state != PipelineState::Running {
            return Ok(false);
        }
        inner.state = PipelineState::Stopping;
        info!("Stopping pipeline...");

        let Inner { device, session, .. } = &mut *inner;

        // (a) cancel capture; returns once the in-flight block is done
        let handler = match (session.as_mut(), device.as_mut()) {
            (Some(session), Some(device)) => session.cancel(device),
            _ => None,
        };

        // (b) flush the recording, if any
        let flushed = match handler {
            Some(mut handler) => handler.on_stop(),
            None => Ok(()),
        };
        if let Err(e) = &flushed {
            error!("{:#}", e);
        }

        // (c) release the tuner
        if let Some(mut device) = inner.device.take() {
            device.close();
        }
        inner.session = None;
        inner.state = PipelineState::Terminated;

        info!(
            "Pipeline terminated. Blocks={}, IQ samples={}, Audio samples={}, Play errors={}",
            self.stats.blocks(),
            self.stats.iq_samples(),
            self.stats.audio_samples(),
            self.stats.play_errors()
        );

        flushed.map(|_| true)
    }
}

impl<H: BlockHandler> Default for ShutdownController<H> {
    fn default() -> Self {
        Self::new()
    }
}
