//! Common types for iqflow
//!
//! The fundamental sample type moved through the streaming pipeline and the
//! constants shared by the FIFO, the filters and the output driver.

/// Default device sample rate (48 kS/s)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default output center frequency (435 MHz, 70cm band)
pub const DEFAULT_CENTER_FREQUENCY: u64 = 435_000_000;

/// Largest supported interpolation exponent (x64)
pub const MAX_LOG2_INTERP: u32 = 6;

/// Scalar component type
pub type Sample = f32;

/// A single complex baseband sample (in-phase and quadrature components)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [i, q].
/// This enables zero-copy conversion between `&[IqSample]` and `&[f32]`
/// (interleaved I/Q) using bytemuck, which is what raw dump sinks write.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IqSample {
    pub i: Sample,
    pub q: Sample,
}

impl IqSample {
    /// Create a new I/Q sample
    #[inline]
    pub fn new(i: Sample, q: Sample) -> Self {
        Self { i, q }
    }

    /// The zero sample
    #[inline]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Unit phasor at the given phase (radians)
    #[inline]
    pub fn from_phase(phase: f32) -> Self {
        let (sin, cos) = phase.sin_cos();
        Self { i: cos, q: sin }
    }

    /// Squared magnitude
    #[inline]
    pub fn norm_sqr(&self) -> Sample {
        self.i * self.i + self.q * self.q
    }

    /// Magnitude
    #[inline]
    pub fn magnitude(&self) -> Sample {
        self.norm_sqr().sqrt()
    }

    /// Scale both components by a factor
    #[inline]
    pub fn scale(&self, factor: Sample) -> Self {
        Self {
            i: self.i * factor,
            q: self.q * factor,
        }
    }
}

impl std::ops::Add for IqSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            i: self.i + other.i,
            q: self.q + other.q,
        }
    }
}

impl std::ops::AddAssign for IqSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.i += other.i;
        self.q += other.q;
    }
}

impl std::ops::Sub for IqSample {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            i: self.i - other.i,
            q: self.q - other.q,
        }
    }
}

impl std::ops::Mul<Sample> for IqSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        self.scale(factor)
    }
}

/// View a block of I/Q samples as interleaved `f32` without copying
#[inline]
pub fn as_interleaved(samples: &[IqSample]) -> &[f32] {
    bytemuck::cast_slice(samples)
}
