//! Instantaneous phase, unwrapping and differentiation

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Angle of each sample in (-π, π]
pub fn instantaneous_phase(samples: &[Complex<f64>]) -> Vec<f64> {
    samples.iter().map(|s| s.im.atan2(s.re)).collect()
}

/// Remove 2π jumps so consecutive samples differ by at most π.
///
/// A step of exactly -π after reduction is kept as +π when the raw step was
/// positive, so the result does not depend on rounding direction.
pub fn unwrap(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let Some(&first) = phase.first() else {
        return out;
    };
    out.push(first);

    let mut correction = 0.0;
    for w in phase.windows(2) {
        let step = w[1] - w[0];
        if step.abs() >= PI {
            let mut reduced = (step + PI).rem_euclid(2.0 * PI) - PI;
            if reduced == -PI && step > 0.0 {
                reduced = PI;
            }
            correction += reduced - step;
        }
        out.push(w[1] + correction);
    }
    out
}

/// `x[n+1] - x[n]`; one sample shorter than the input
pub fn first_difference(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}
