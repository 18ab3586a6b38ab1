//! Native RTL-SDR capture and wideband FM demodulation
//!
//! This module provides the receive chain:
//! 1. Capture raw 8-bit IQ samples from RTL-SDR at 240 kSPS (or a multiple)
//! 2. Decimate to the 240 kHz FM channel rate
//! 3. Extract and unwrap the instantaneous phase
//! 4. Differentiate the phase (FM discriminator)
//! 5. Decimate to 48 kHz and quantize to 16-bit PCM

pub mod capture;
mod demod;
mod filter;
mod phase;

pub use capture::{
    start_async_capture, BlockHandler, CancelToken, CaptureSession, DeviceHandle, IqBlock,
    SdrConfig,
};
pub use demod::DemodulationEngine;
