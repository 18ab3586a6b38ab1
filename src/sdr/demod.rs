//! Wideband FM demodulation
//!
//! One IQ block in, one PCM block out:
//! decimate → phase → unwrap → first difference → decimate → scale → i16.
//!
//! Nothing is carried between blocks. Each block's phase is unwrapped on its
//! own, so the phase step across a block boundary is dropped.

use rustfft::num_complex::Complex;
use tracing::trace;

use super::filter::Decimator;
use super::phase::{first_difference, instantaneous_phase, unwrap};
use super::IqBlock;
use crate::audio::AudioBlock;
use crate::config::DecimationPlan;

/// Maps typical broadcast deviation to a usable part of the i16 range
pub const AUDIO_GAIN: f64 = 14_000.0;

/// Stateless IQ → PCM converter for a validated rate plan
pub struct DemodulationEngine {
    stage1: Decimator,
    stage2: Decimator,
}

impl DemodulationEngine {
    pub fn new(plan: DecimationPlan) -> Self {
        Self {
            stage1: Decimator::new(plan.stage1_factor),
            stage2: Decimator::new(plan.stage2_factor),
        }
    }

    /// PCM samples produced for an IQ block of `block_len` samples
    #[cfg(test)]
    pub fn output_len(&self, block_len: usize) -> usize {
        let intermediate = self.stage1.output_len(block_len);
        self.stage2.output_len(intermediate.saturating_sub(1))
    }

    /// Discriminator output at the audio rate, before scaling
    pub fn demodulate(&self, block: &[Complex<f64>]) -> Vec<f64> {
        let channel = self.stage1.process(block);
        let phase = unwrap(&instantaneous_phase(&channel));
        let baseband = first_difference(&phase);
        self.stage2.process(&baseband)
    }

    pub fn process(&self, block: &IqBlock) -> AudioBlock {
        let audio = self.demodulate(block);
        trace!("Demodulated {} IQ samples to {} PCM samples", block.len(), audio.len());
        AudioBlock::new(audio.into_iter().map(|x| quantize(AUDIO_GAIN * x)).collect())
    }
}

/// Truncate toward zero and wrap into i16. Out-of-range values are not clipped.
pub fn quantize(x: f64) -> i16 {
    (x as i64) as i16
}
