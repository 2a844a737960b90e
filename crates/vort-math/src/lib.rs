#![warn(missing_docs)]

//! Geometry primitives for the vort ray marcher.
//!
//! Thin wrappers around nalgebra providing the types the mesh and
//! traversal crates share: points, vectors, directions, axis-aligned
//! boxes, line segments, parametric rays, and tolerance constants.

mod bbox;
mod ray;

pub use bbox::Aabb3;
pub use ray::Ray;

use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// Midpoint of two points.
#[inline]
pub fn midpoint(a: &Point3, b: &Point3) -> Point3 {
    Point3::from((a.coords + b.coords) * 0.5)
}

/// A straight line segment, used for wireframe export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment3 {
    /// Start point.
    pub a: Point3,
    /// End point.
    pub b: Point3,
}

impl Segment3 {
    /// Create a segment between two points.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self { a, b }
    }

    /// Length of the segment.
    pub fn length(&self) -> f64 {
        (self.b - self.a).norm()
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Absolute floor on squared distances.
    pub absolute: f64,
    /// Relative tolerance on squared-distance ratios.
    pub relative: f64,
}

impl Tolerance {
    /// Default traversal tolerances (1e-8 absolute, 1e-8 relative).
    pub const DEFAULT: Self = Self {
        absolute: 1e-8,
        relative: 1e-8,
    };

    /// Tolerance using the same value for both checks.
    pub const fn uniform(eps: f64) -> Self {
        Self {
            absolute: eps,
            relative: eps,
        }
    }

    /// Check if `candidate` is closer than `reference` by more than the
    /// relative tolerance. Both arguments are squared distances.
    pub fn strictly_closer(&self, candidate: f64, reference: f64) -> bool {
        if reference < self.absolute {
            return false;
        }
        candidate / reference < 1.0 - self.relative
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
