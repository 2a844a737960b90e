//! Fixed-band spectral values.

use std::ops::{Add, AddAssign, Mul, MulAssign};

use serde::{Deserialize, Serialize};

/// Number of spectral bands.
pub const BANDS: usize = 3;

/// A spectral sample with one value per band.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum(pub [f64; BANDS]);

impl Spectrum {
    /// Smallest transmittance a ray can carry.
    pub const FLOOR: f64 = f64::MIN_POSITIVE;

    /// All bands zero.
    pub const fn zero() -> Self {
        Self([0.0; BANDS])
    }

    /// All bands one.
    pub const fn one() -> Self {
        Self([1.0; BANDS])
    }

    /// Same value in every band.
    pub const fn splat(v: f64) -> Self {
        Self([v; BANDS])
    }

    /// Band `i`.
    pub fn band(&self, i: usize) -> f64 {
        self.0[i]
    }

    /// Band-wise `exp(-tau)`.
    pub fn transmission(tau: &Spectrum) -> Self {
        Self(tau.0.map(|t| (-t).exp()))
    }

    /// Clamp every band to at least [`Spectrum::FLOOR`].
    pub fn floored(self) -> Self {
        Self(self.0.map(|v| v.max(Self::FLOOR)))
    }
}

impl Add for Spectrum {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = self;
        out += rhs;
        out
    }
}

impl AddAssign for Spectrum {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a += b;
        }
    }
}

impl Mul for Spectrum {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut out = self;
        out *= rhs;
        out
    }
}

impl MulAssign for Spectrum {
    fn mul_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a *= b;
        }
    }
}

impl Mul<f64> for Spectrum {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self(self.0.map(|v| v * rhs))
    }
}
