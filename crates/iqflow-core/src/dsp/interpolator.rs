//! Power-of-two interpolator
//!
//! Upsamples by `2^log2` through cascaded x2 stages. Each stage zero-stuffs
//! (every input `x` becomes `2x, 0`) and runs the result through a half-band
//! low-pass [`FirFilter`] to remove the spectral image.

use super::filter::{Filter, FilterSample, FirFilter};
use crate::types::MAX_LOG2_INTERP;

/// Taps per half-band stage
const HALFBAND_TAPS: usize = 23;

/// Half-band cutoff, normalized to the stage's output rate
const HALFBAND_CUTOFF: f32 = 0.25;

pub struct Interpolator<T> {
    log2: u32,
    stages: Vec<FirFilter<T>>,
    scratch: Vec<T>,
}

impl<T: FilterSample> Interpolator<T> {
    /// Create an interpolator by `2^log2` (clamped to [`MAX_LOG2_INTERP`])
    pub fn new(log2: u32) -> Self {
        let mut interp = Self {
            log2: 0,
            stages: Vec::new(),
            scratch: Vec::new(),
        };
        interp.set_log2(log2);
        interp
    }

    pub fn log2(&self) -> u32 {
        self.log2
    }

    /// Output samples produced per input sample
    pub fn factor(&self) -> usize {
        1 << self.log2
    }

    /// Change the factor; stage histories restart from silence
    pub fn set_log2(&mut self, log2: u32) {
        let log2 = log2.min(MAX_LOG2_INTERP);
        self.log2 = log2;
        self.stages = (0..log2)
            .map(|_| FirFilter::lowpass(HALFBAND_TAPS, HALFBAND_CUTOFF))
            .collect();
    }

    /// Clear every stage's history
    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(FirFilter::reset);
    }

    /// Interpolate `input`, replacing the contents of `output`
    ///
    /// `output.len()` ends up exactly `input.len() * factor()`.
    pub fn process(&mut self, input: &[T], output: &mut Vec<T>) {
        output.clear();
        output.extend_from_slice(input);

        for stage in &mut self.stages {
            self.scratch.clear();
            self.scratch.reserve(output.len() * 2);
            for &x in output.iter() {
                self.scratch.push(stage.apply(x * 2.0));
                self.scratch.push(stage.apply(T::default()));
            }
            std::mem::swap(output, &mut self.scratch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IqSample;

    #[test]
    fn test_passthrough_at_log2_zero() {
        let mut interp = Interpolator::<f32>::new(0);
        let input = [0.1, -0.2, 0.3];
        let mut out = Vec::new();
        interp.process(&input, &mut out);
        assert_eq!(out, input);
        assert_eq!(interp.factor(), 1);
    }

    #[test]
    fn test_output_length_scales_with_factor() {
        for log2 in 0..=3 {
            let mut interp = Interpolator::<IqSample>::new(log2);
            let mut out = Vec::new();
            interp.process(&vec![IqSample::new(1.0, 0.0); 40], &mut out);
            assert_eq!(out.len(), 40 << log2);
        }
    }

    #[test]
    fn test_log2_is_clamped() {
        let interp = Interpolator::<f32>::new(MAX_LOG2_INTERP + 3);
        assert_eq!(interp.log2(), MAX_LOG2_INTERP);
    }

    #[test]
    fn test_dc_level_preserved() {
        let mut interp = Interpolator::<f32>::new(2);
        let mut out = Vec::new();
        // Let the stage histories settle before checking the level
        for _ in 0..4 {
            interp.process(&[1.0; 64], &mut out);
        }
        for &y in &out[out.len() - 32..] {
            assert!((y - 1.0).abs() < 0.05, "sample {} off DC level", y);
        }
    }
}
