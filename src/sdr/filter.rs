//! Zero-phase FIR decimation
//!
//! Hamming-windowed sinc low-pass, evaluated centred on each kept sample so
//! no group delay is introduced. The block is extended past both ends by odd
//! reflection about its end samples, so DC and linear trends hold up to the
//! edges.

use std::f64::consts::PI;
use std::ops::{AddAssign, Mul, Sub};

/// Taps per unit of decimation factor on each side of the centre tap
const HALF_TAPS_PER_FACTOR: usize = 10;

/// Passband edge as a fraction of the decimated Nyquist frequency
const CUTOFF_FRACTION: f64 = 0.8;

/// Integer-factor decimator with an anti-aliasing filter
#[derive(Debug, Clone)]
pub struct Decimator {
    factor: usize,
    taps: Vec<f64>,
}

impl Decimator {
    /// # Panics
    /// Panics if `factor` is 0. Factors come from a validated `DecimationPlan`.
    pub fn new(factor: usize) -> Self {
        assert!(factor > 0, "Decimation factor must be greater than 0");

        if factor == 1 {
            return Self { factor, taps: vec![1.0] };
        }

        let len = 2 * HALF_TAPS_PER_FACTOR * factor + 1;
        let mid = (len / 2) as f64;
        // Cutoff in units of the input Nyquist frequency
        let cutoff = CUTOFF_FRACTION / factor as f64;

        let mut taps: Vec<f64> = (0..len)
            .map(|n| {
                let x = n as f64 - mid;
                let sinc = if x == 0.0 {
                    cutoff
                } else {
                    (PI * cutoff * x).sin() / (PI * x)
                };
                let window = 0.54 - 0.46 * (2.0 * PI * n as f64 / (len as f64 - 1.0)).cos();
                sinc * window
            })
            .collect();

        // Unity gain at DC
        let norm: f64 = taps.iter().sum();
        for t in taps.iter_mut() {
            *t /= norm;
        }

        Self { factor, taps }
    }

    #[cfg(test)]
    pub fn factor(&self) -> usize {
        self.factor
    }

    #[cfg(test)]
    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Number of samples `process` returns for `input_len` samples
    #[cfg(test)]
    pub fn output_len(&self, input_len: usize) -> usize {
        input_len.div_ceil(self.factor)
    }

    /// Filter and keep samples `0, factor, 2*factor, ...`
    pub fn process<T>(&self, input: &[T]) -> Vec<T>
    where
        T: Copy + Default + AddAssign + Sub<Output = T> + Mul<f64, Output = T>,
    {
        if self.factor == 1 || input.is_empty() {
            return input.to_vec();
        }

        let mid = self.taps.len() / 2;
        let extended = odd_extend(input, mid);
        (0..input.len())
            .step_by(self.factor)
            .map(|centre| {
                // Taps are symmetric, so correlation equals convolution.
                // `centre` in the block is `centre + mid` in `extended`.
                let mut acc = T::default();
                for (x, &t) in extended[centre..centre + self.taps.len()].iter().zip(&self.taps) {
                    acc += *x * t;
                }
                acc
            })
            .collect()
    }
}

/// `input` with `pad` samples on each side, mirrored through the end points:
/// `2*x[0] - x[k]` before the block and `2*x[n-1] - x[n-1-k]` after it.
/// Blocks shorter than `pad` reuse their far end sample.
fn odd_extend<T>(input: &[T], pad: usize) -> Vec<T>
where
    T: Copy + Sub<Output = T> + Mul<f64, Output = T>,
{
    let n = input.len();
    let first = input[0];
    let last = input[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|k| first * 2.0 - input[k.min(n - 1)]));
    extended.extend_from_slice(input);
    extended.extend((1..=pad).map(|k| last * 2.0 - input[n - 1 - k.min(n - 1)]));
    extended
}
