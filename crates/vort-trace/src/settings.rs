//! Trace configuration.

use serde::{Deserialize, Serialize};
use vort_math::Tolerance;

use crate::error::{Result, TraceError};

/// Parameters for locating and marching rays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// World-space sub-step size. `None` samples each cell once at the
    /// segment midpoint.
    pub step_size: Option<f64>,
    /// Emission weight per unit path length.
    pub sample_weight: f64,
    /// Attenuate transmittance by the optical depth of each cell.
    pub attenuate: bool,
    /// Tolerance for span exhaustion and point-in-cell tests.
    pub inside_eps: f64,
    /// Locator iterations after which a warning is logged.
    pub refine_warn_iterations: usize,
    /// Locator iterations after which location fails.
    pub max_refine_iterations: usize,
    /// Check the point-in-cell invariant before every traversal step.
    pub verify_each_step: bool,
    /// Cap on cells visited by one ray. `None` derives it from the mesh.
    pub max_cells_per_ray: Option<usize>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            step_size: None,
            sample_weight: 1.0,
            attenuate: false,
            inside_eps: 1e-8,
            refine_warn_iterations: 20,
            max_refine_iterations: 100,
            verify_each_step: false,
            max_cells_per_ray: None,
        }
    }
}

impl TraceSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(step) = self.step_size {
            if !(step > 0.0 && step.is_finite()) {
                return Err(TraceError::InvalidSettings(
                    "step_size must be positive".into(),
                ));
            }
        }
        if !(self.sample_weight >= 0.0 && self.sample_weight.is_finite()) {
            return Err(TraceError::InvalidSettings(
                "sample_weight must be non-negative".into(),
            ));
        }
        if !(self.inside_eps > 0.0 && self.inside_eps < 1.0) {
            return Err(TraceError::InvalidSettings(
                "inside_eps must be between 0 and 1".into(),
            ));
        }
        if self.max_refine_iterations == 0 {
            return Err(TraceError::InvalidSettings(
                "max_refine_iterations must be positive".into(),
            ));
        }
        if self.refine_warn_iterations > self.max_refine_iterations {
            return Err(TraceError::InvalidSettings(
                "refine_warn_iterations exceeds max_refine_iterations".into(),
            ));
        }
        if self.max_cells_per_ray == Some(0) {
            return Err(TraceError::InvalidSettings(
                "max_cells_per_ray must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Geometric tolerance derived from `inside_eps`.
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::uniform(self.inside_eps)
    }
}
