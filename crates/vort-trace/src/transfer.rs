//! Mapping from fluid state to emission and absorption.

use serde::{Deserialize, Serialize};
use vort_math::Point3;
use vort_mesh::HydroCell;

use crate::spectrum::Spectrum;

/// Slots of a packed [`FieldVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Mass density (gradient corrected).
    Density,
    /// Specific internal energy.
    Utherm,
    /// Pressure.
    Pressure,
    /// Total energy.
    Energy,
    /// Velocity x.
    VelX,
    /// Velocity y.
    VelY,
    /// Velocity z.
    VelZ,
}

/// Number of packed fields.
pub const NUM_FIELDS: usize = 7;

/// Fluid state at one sample position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldVector(pub [f64; NUM_FIELDS]);

impl FieldVector {
    /// Pack the state of `cell` as seen at `pos`.
    ///
    /// Density is extrapolated along the cell's gradient; the other fields
    /// are constant over the cell.
    pub fn sample(cell: &HydroCell, pos: &Point3) -> Self {
        Self([
            cell.density_at(pos),
            cell.utherm,
            cell.pressure,
            cell.energy,
            cell.velocity.x,
            cell.velocity.y,
            cell.velocity.z,
        ])
    }

    /// Value of one field.
    #[inline]
    pub fn get(&self, field: Field) -> f64 {
        self.0[field as usize]
    }
}

/// Emission and absorption model.
///
/// Implementations must be pure functions of the packed field vector so
/// rays can be traced concurrently.
pub trait TransferFunction: Send + Sync {
    /// Emitted radiance per unit path length.
    fn emission(&self, fields: &FieldVector) -> Spectrum;

    /// Absorption coefficient per unit density and path length.
    fn sigma_t(&self) -> f64;
}

/// Emission proportional to density, in a fixed color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityEmission {
    /// Emission per unit density.
    pub color: Spectrum,
    /// Absorption coefficient.
    pub sigma_t: f64,
}

impl Default for DensityEmission {
    fn default() -> Self {
        Self {
            color: Spectrum::one(),
            sigma_t: 0.0,
        }
    }
}

impl TransferFunction for DensityEmission {
    fn emission(&self, fields: &FieldVector) -> Spectrum {
        self.color * fields.get(Field::Density)
    }

    fn sigma_t(&self) -> f64 {
        self.sigma_t
    }
}

/// Gaussian window over one field, as used to pick out a density or
/// temperature range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianBand {
    /// Field the window is evaluated on.
    pub field: Field,
    /// Window center.
    pub center: f64,
    /// Window standard deviation.
    pub sigma: f64,
    /// Peak emission.
    pub color: Spectrum,
    /// Absorption coefficient.
    pub sigma_t: f64,
}

impl TransferFunction for GaussianBand {
    fn emission(&self, fields: &FieldVector) -> Spectrum {
        let x = (fields.get(self.field) - self.center) / self.sigma;
        self.color * (-0.5 * x * x).exp()
    }

    fn sigma_t(&self) -> f64 {
        self.sigma_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vort_math::Vec3;

    fn cell() -> HydroCell {
        HydroCell {
            density: 2.0,
            utherm: 5.0,
            pressure: 3.0,
            energy: 7.0,
            velocity: Vec3::new(1.0, -1.0, 0.5),
            density_gradient: Vec3::new(0.0, 2.0, 0.0),
            center: Point3::origin(),
        }
    }

    #[test]
    fn test_sample_packs_fields() {
        let v = FieldVector::sample(&cell(), &Point3::new(9.0, 0.25, -4.0));
        assert_relative_eq!(v.get(Field::Density), 2.5);
        assert_relative_eq!(v.get(Field::Utherm), 5.0);
        assert_relative_eq!(v.get(Field::VelY), -1.0);
        assert_relative_eq!(v.get(Field::VelZ), 0.5);
    }

    #[test]
    fn test_density_emission() {
        let tf = DensityEmission {
            color: Spectrum([1.0, 0.5, 0.0]),
            sigma_t: 0.1,
        };
        let e = tf.emission(&FieldVector::sample(&cell(), &Point3::origin()));
        assert_eq!(e, Spectrum([2.0, 1.0, 0.0]));
        assert_relative_eq!(tf.sigma_t(), 0.1);
    }

    #[test]
    fn test_gaussian_band_peaks_at_center() {
        let tf = GaussianBand {
            field: Field::Utherm,
            center: 5.0,
            sigma: 1.0,
            color: Spectrum::one(),
            sigma_t: 0.0,
        };
        let at_peak = tf.emission(&FieldVector::sample(&cell(), &Point3::origin()));
        assert_relative_eq!(at_peak.band(0), 1.0);

        let mut off = cell();
        off.utherm = 6.0;
        let e = tf.emission(&FieldVector::sample(&off, &Point3::origin()));
        assert_relative_eq!(e.band(1), (-0.5f64).exp());
    }
}
