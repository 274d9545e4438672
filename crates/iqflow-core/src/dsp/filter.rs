//! Streaming filter abstraction
//!
//! A filter maps one input sample to one output sample. Concrete filters
//! keep their own history; the contract only promises that feeding the same
//! input sequence from the same initial state gives the same output.
//!
//! Filters are combined into a [`FilterChain`], which is itself a [`Filter`].
//! The concrete kind is chosen once, at construction, from a [`FilterKind`].

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::types::IqSample;

/// Numeric types a filter can run on
pub trait FilterSample:
    Copy + Default + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> + Send + 'static
{
}

impl<T> FilterSample for T where
    T: Copy + Default + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T> + Send + 'static
{
}

/// Single-sample transform
pub trait Filter<T> {
    /// Consume one input sample and produce one output sample
    fn apply(&mut self, input: T) -> T;
}

/// Direct-form FIR filter with a circular delay line
#[derive(Debug, Clone)]
pub struct FirFilter<T> {
    taps: Vec<f32>,
    history: Vec<T>,
    pos: usize,
}

impl<T: FilterSample> FirFilter<T> {
    /// Create a filter from explicit coefficients
    ///
    /// An empty tap list behaves as a single unity tap.
    pub fn new(taps: Vec<f32>) -> Self {
        let taps = if taps.is_empty() { vec![1.0] } else { taps };
        Self {
            history: vec![T::default(); taps.len()],
            taps,
            pos: 0,
        }
    }

    /// Windowed-sinc low-pass (Hamming window, unity DC gain)
    ///
    /// `cutoff` is normalized to the sample rate and clamped to (0, 0.5).
    pub fn lowpass(num_taps: usize, cutoff: f32) -> Self {
        Self::new(lowpass_taps(num_taps, cutoff))
    }

    /// Replace the coefficients; clears the history
    pub fn set_taps(&mut self, taps: Vec<f32>) {
        *self = Self::new(taps);
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.history.fill(T::default());
        self.pos = 0;
    }
}

impl<T: FilterSample> Filter<T> for FirFilter<T> {
    #[inline]
    fn apply(&mut self, input: T) -> T {
        let len = self.history.len();
        self.history[self.pos] = input;

        // taps[0] multiplies the newest sample, taps[k] the one k samples back
        let mut acc = T::default();
        let mut idx = self.pos;
        for &tap in &self.taps {
            acc = acc + self.history[idx] * tap;
            idx = if idx == 0 { len - 1 } else { idx - 1 };
        }

        self.pos = (self.pos + 1) % len;
        acc
    }
}

/// Hamming-windowed sinc coefficients normalized to unity DC gain
pub fn lowpass_taps(num_taps: usize, cutoff: f32) -> Vec<f32> {
    let num_taps = num_taps.max(1);
    let cutoff = cutoff.clamp(1e-4, 0.5 - 1e-4);
    let center = (num_taps - 1) as f32 / 2.0;

    let mut taps: Vec<f32> = (0..num_taps)
        .map(|n| {
            let x = n as f32 - center;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * std::f32::consts::PI * cutoff * x).sin() / (std::f32::consts::PI * x)
            };
            let window = if num_taps == 1 {
                1.0
            } else {
                0.54 - 0.46 * (2.0 * std::f32::consts::PI * n as f32 / (num_taps - 1) as f32).cos()
            };
            sinc * window
        })
        .collect();

    let sum: f32 = taps.iter().sum();
    if sum.abs() > f32::EPSILON {
        taps.iter_mut().for_each(|t| *t /= sum);
    }
    taps
}

/// DC blocking filter: `y[n] = x[n] - x[n-1] + r * y[n-1]`
#[derive(Debug, Clone)]
pub struct DcBlocker<T> {
    pole: f32,
    prev_input: T,
    prev_output: T,
}

impl<T: FilterSample> DcBlocker<T> {
    /// `pole` close to 1.0 gives a narrow notch at DC (typical 0.995-0.9999)
    pub fn new(pole: f32) -> Self {
        Self {
            pole: pole.clamp(0.0, 0.999_999),
            prev_input: T::default(),
            prev_output: T::default(),
        }
    }

    pub fn reset(&mut self) {
        self.prev_input = T::default();
        self.prev_output = T::default();
    }
}

impl<T: FilterSample> Filter<T> for DcBlocker<T> {
    #[inline]
    fn apply(&mut self, input: T) -> T {
        let output = input - self.prev_input + self.prev_output * self.pole;
        self.prev_input = input;
        self.prev_output = output;
        output
    }
}

/// Exponential smoother: `y += alpha * (x - y)`
#[derive(Debug, Clone)]
pub struct OnePoleLowpass<T> {
    alpha: f32,
    state: T,
}

impl<T: FilterSample> OnePoleLowpass<T> {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: T::default(),
        }
    }

    /// Change the smoothing factor without touching the state
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.state = T::default();
    }
}

impl<T: FilterSample> Filter<T> for OnePoleLowpass<T> {
    #[inline]
    fn apply(&mut self, input: T) -> T {
        self.state = self.state + (input - self.state) * self.alpha;
        self.state
    }
}

/// Serializable description of a filter, used by pipeline config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Windowed-sinc low-pass
    Lowpass { taps: usize, cutoff: f32 },
    /// FIR with explicit coefficients
    Fir { taps: Vec<f32> },
    /// DC removal
    DcBlock { pole: f32 },
    /// Exponential smoothing
    OnePole { alpha: f32 },
}

impl FilterKind {
    /// Build the concrete filter this kind describes
    pub fn build<T: FilterSample>(&self) -> AnyFilter<T> {
        match self {
            FilterKind::Lowpass { taps, cutoff } => AnyFilter::Fir(FirFilter::lowpass(*taps, *cutoff)),
            FilterKind::Fir { taps } => AnyFilter::Fir(FirFilter::new(taps.clone())),
            FilterKind::DcBlock { pole } => AnyFilter::DcBlock(DcBlocker::new(*pole)),
            FilterKind::OnePole { alpha } => AnyFilter::OnePole(OnePoleLowpass::new(*alpha)),
        }
    }
}

/// Any of the concrete filters, dispatched without a vtable
#[derive(Debug, Clone)]
pub enum AnyFilter<T> {
    Fir(FirFilter<T>),
    DcBlock(DcBlocker<T>),
    OnePole(OnePoleLowpass<T>),
}

impl<T: FilterSample> Filter<T> for AnyFilter<T> {
    #[inline]
    fn apply(&mut self, input: T) -> T {
        match self {
            AnyFilter::Fir(f) => f.apply(input),
            AnyFilter::DcBlock(f) => f.apply(input),
            AnyFilter::OnePole(f) => f.apply(input),
        }
    }
}

/// Ordered sequence of filters applied one after another
#[derive(Debug, Clone, Default)]
pub struct FilterChain<T> {
    stages: Vec<AnyFilter<T>>,
}

impl<T: FilterSample> FilterChain<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Build a chain from config descriptions, in order
    pub fn from_kinds(kinds: &[FilterKind]) -> Self {
        Self {
            stages: kinds.iter().map(|kind| kind.build()).collect(),
        }
    }

    /// Append a stage
    pub fn push(&mut self, filter: AnyFilter<T>) {
        self.stages.push(filter);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every sample of `block` through the chain, in place
    pub fn process_in_place(&mut self, block: &mut [T]) {
        if self.stages.is_empty() {
            return;
        }
        for sample in block.iter_mut() {
            *sample = self.apply(*sample);
        }
    }

    /// Run `input` through the chain, appending to `output`
    pub fn process_into(&mut self, input: &[T], output: &mut Vec<T>) {
        output.reserve(input.len());
        for &sample in input {
            let filtered = self.apply(sample);
            output.push(filtered);
        }
    }
}

impl<T: FilterSample> Filter<T> for FilterChain<T> {
    #[inline]
    fn apply(&mut self, input: T) -> T {
        self.stages.iter_mut().fold(input, |x, stage| stage.apply(x))
    }
}

/// Filter chain over the pipeline's I/Q samples
pub type IqFilterChain = FilterChain<IqSample>;
