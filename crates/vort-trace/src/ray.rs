//! Per-ray traversal state and radiance accumulator.

use serde::{Deserialize, Serialize};
use vort_math::{Aabb3, Point3, Ray, Vec3};

use crate::error::{Result, TraceError};
use crate::spectrum::Spectrum;

/// Where a ray stands after its last traversal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalState {
    /// Inside a cell of the evaluating task.
    InCell,
    /// Crossed into a cell owned by another task; hand-off pending.
    ExitingFace,
    /// Left through the domain boundary. Terminal.
    ExitingDomain,
    /// Parametric span exhausted inside the domain. Terminal.
    Done,
}

impl TraversalState {
    /// True once the ray needs no further advancement.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ExitingDomain | Self::Done)
    }
}

/// A line of sight being marched through the mesh.
///
/// `cell` and `prev_cell` are point indices in the evaluating task's
/// snapshot; `task` is the owner of `cell`.
#[derive(Debug, Clone)]
pub struct TraceRay {
    /// Caller-assigned id, carried across hand-offs.
    pub id: u64,
    /// Parametric line; parameters are world-space distances.
    pub line: Ray,
    /// Current point index.
    pub cell: usize,
    /// Task owning `cell`.
    pub task: usize,
    /// Point the ray just came from.
    pub prev_cell: Option<usize>,
    /// Start of the remaining segment.
    pub min_t: f64,
    /// End of the segment.
    pub max_t: f64,
    /// Index of the last sub-step grid point the ray has passed.
    pub depth: u64,
    /// Cells visited, across all tasks.
    pub steps: usize,
    /// Last traversal outcome.
    pub state: TraversalState,
}

impl TraceRay {
    /// Ray over `[min_t, max_t]`. Cell and task are unset until located.
    pub fn new(id: u64, origin: Point3, direction: Vec3, min_t: f64, max_t: f64) -> Self {
        Self {
            id,
            line: Ray::new(origin, direction),
            cell: 0,
            task: 0,
            prev_cell: None,
            min_t,
            max_t: max_t.max(min_t),
            depth: 0,
            steps: 0,
            state: TraversalState::InCell,
        }
    }

    /// Ray clipped to `extent`. `None` if it misses the box.
    pub fn clipped(id: u64, origin: Point3, direction: Vec3, extent: &Aabb3) -> Option<Self> {
        let line = Ray::new(origin, direction);
        let (t0, t1) = line.intersect_aabb(extent)?;
        Some(Self::new(id, origin, direction, t0, t1))
    }

    /// Reject rays that cannot be marched: a zero or non-finite direction,
    /// a non-finite origin, or a non-finite span.
    pub fn validate(&self) -> Result<()> {
        let reason = if !self.line.is_finite() {
            "origin or direction is zero or not finite"
        } else if !(self.min_t.is_finite() && self.max_t.is_finite()) {
            "span is not finite"
        } else {
            return Ok(());
        };
        Err(TraceError::InvalidRay {
            ray: self.id,
            reason,
        })
    }

    /// Current position, at `min_t`.
    #[inline]
    pub fn position(&self) -> Point3 {
        self.line.at(self.min_t)
    }

    /// Remaining parametric length.
    pub fn remaining(&self) -> f64 {
        self.max_t - self.min_t
    }
}

/// Running radiance and transmittance of one ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    /// Emitted radiance gathered so far.
    pub radiance: Spectrum,
    /// Fraction of radiance surviving absorption so far.
    pub transmittance: Spectrum,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    /// No radiance, full transmittance.
    pub fn new() -> Self {
        Self {
            radiance: Spectrum::zero(),
            transmittance: Spectrum::one(),
        }
    }

    /// Add `emission * weight`, attenuated by the current transmittance.
    #[inline]
    pub fn emit(&mut self, emission: Spectrum, weight: f64) {
        self.radiance += self.transmittance * emission * weight;
    }

    /// Attenuate by optical depth `tau`, never dropping below
    /// [`Spectrum::FLOOR`].
    pub fn absorb(&mut self, tau: f64) {
        let t = self.transmittance * Spectrum::transmission(&Spectrum::splat(tau));
        self.transmittance = t.floored();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clipped_spans_box() {
        let ray = TraceRay::clipped(
            7,
            Point3::new(-1.0, 0.5, 0.5),
            Vec3::new(2.0, 0.0, 0.0),
            &Aabb3::cube(1.0),
        )
        .unwrap();
        assert_eq!(ray.id, 7);
        assert_relative_eq!(ray.min_t, 1.0);
        assert_relative_eq!(ray.max_t, 2.0);
        assert_relative_eq!(ray.position().x, 0.0);
        assert_eq!(ray.state, TraversalState::InCell);
    }

    #[test]
    fn test_clipped_miss() {
        assert!(TraceRay::clipped(
            0,
            Point3::new(-1.0, 5.0, 0.5),
            Vec3::new(1.0, 0.0, 0.0),
            &Aabb3::cube(1.0)
        )
        .is_none());
    }

    #[test]
    fn test_new_keeps_span_ordered() {
        let ray = TraceRay::new(0, Point3::origin(), Vec3::x(), 2.0, 1.0);
        assert!(ray.min_t <= ray.max_t);
        assert_eq!(ray.remaining(), 0.0);
    }

    #[test]
    fn test_accumulator_emit_then_absorb() {
        let mut acc = Accumulator::new();
        acc.emit(Spectrum::splat(2.0), 0.5);
        assert_relative_eq!(acc.radiance.band(0), 1.0);

        acc.absorb(std::f64::consts::LN_2);
        assert_relative_eq!(acc.transmittance.band(2), 0.5);
        acc.emit(Spectrum::splat(2.0), 0.5);
        assert_relative_eq!(acc.radiance.band(1), 1.5);

        acc.absorb(1e9);
        assert_eq!(acc.transmittance.band(0), Spectrum::FLOOR);
    }
}
