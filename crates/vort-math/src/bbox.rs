//! Axis-aligned bounding box of the simulation domain.

use serde::{Deserialize, Serialize};

use crate::{Point3, Vec3};

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Cube `[0, size]^3`, the usual periodic simulation box.
    pub fn cube(size: f64) -> Self {
        Self::new(Point3::origin(), Point3::new(size, size, size))
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest AABB containing all the given points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Inclusive containment test (points on the boundary are inside).
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True if `p` is inside the box and farther than `tol` from every face.
    pub fn contains_strict(&self, p: &Point3, tol: f64) -> bool {
        p.x > self.min.x + tol
            && p.x < self.max.x - tol
            && p.y > self.min.y + tol
            && p.y < self.max.y - tol
            && p.z > self.min.z + tol
            && p.z < self.max.z - tol
    }

    /// Edge lengths along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let pts = [Point3::new(1.0, -2.0, 0.5), Point3::new(-1.0, 3.0, 0.0)];
        let aabb = Aabb3::from_points(pts.iter());
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 3.0, 0.5));
        assert!(!aabb.is_empty());
        assert!(Aabb3::empty().is_empty());
    }

    #[test]
    fn test_contains_boundary() {
        let aabb = Aabb3::cube(1.0);
        let on_face = Point3::new(1.0, 0.5, 0.5);
        assert!(aabb.contains(&on_face));
        assert!(!aabb.contains_strict(&on_face, 1e-9));
        assert!(aabb.contains_strict(&Point3::new(0.5, 0.5, 0.5), 1e-9));
        assert!(!aabb.contains(&Point3::new(1.5, 0.5, 0.5)));
    }

    #[test]
    fn test_size() {
        let aabb = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0));
        assert_eq!(aabb.size(), Vec3::new(2.0, 4.0, 6.0));
    }
}
