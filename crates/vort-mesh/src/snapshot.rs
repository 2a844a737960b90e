//! Immutable mesh snapshot as handed over by the mesh generator.
//!
//! A snapshot holds the Delaunay points (primary cells and ghost images),
//! the tetrahedra with their neighbor links, one circumcenter per tetra, and
//! the list of Voronoi faces as point pairs. Nothing here is mutated during
//! a trace pass.

use serde::{Deserialize, Serialize};
use vort_math::{Aabb3, Point3, Segment3};

use crate::error::{MeshError, Result};

/// Whether a mesh point carries its own physical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Owns hydro cell data.
    Primary,
    /// Periodic or boundary image of a primary point.
    Ghost,
}

/// A Delaunay generating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshPoint {
    /// Global particle id, stable across tasks.
    pub id: u64,
    /// Generating position.
    pub position: Point3,
    /// Task owning the referenced hydro cell.
    pub task: usize,
    /// Hydro cell index on the owning task.
    pub cell: usize,
    /// Primary or ghost.
    pub kind: PointKind,
}

impl MeshPoint {
    /// True for ghost images.
    pub fn is_ghost(&self) -> bool {
        self.kind == PointKind::Ghost
    }
}

/// A Delaunay tetrahedron.
///
/// `p[i]` is `None` for the point at infinity. `t[i]` is the tetra across
/// the face opposite vertex `i`, or `None` on an open hull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tetra {
    /// Vertex point indices.
    pub p: [Option<usize>; 4],
    /// Neighboring tetra indices.
    pub t: [Option<usize>; 4],
    /// Deleted or degenerate; excluded from every walk.
    #[serde(default)]
    pub deleted: bool,
}

impl Tetra {
    /// Tetra with the given vertices and neighbors.
    pub fn new(p: [Option<usize>; 4], t: [Option<usize>; 4]) -> Self {
        Self { p, t, deleted: false }
    }

    /// True if no vertex is the point at infinity.
    pub fn is_finite(&self) -> bool {
        self.p.iter().all(Option::is_some)
    }

    /// Local position (0..4) of point `dp`, if present.
    pub fn position_of(&self, dp: Option<usize>) -> Option<usize> {
        self.p.iter().position(|&v| v == dp)
    }
}

/// An unordered pair of points sharing a Voronoi face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoronoiFace {
    /// First point.
    pub p1: usize,
    /// Second point.
    pub p2: usize,
    /// Face area.
    pub area: f64,
    /// Face centroid.
    pub centroid: Point3,
}

/// One immutable mesh snapshot as seen by a single task.
///
/// Primary points occupy indices `0..num_primary` and primary point `i`
/// owns hydro cell `i`. Every later point is a ghost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSnapshot {
    /// Snapshot number; bumps every time the host rebuilds the mesh.
    pub version: u64,
    /// Task this snapshot belongs to.
    pub task: usize,
    /// Number of cooperating tasks.
    pub num_tasks: usize,
    /// Domain bounding box.
    pub extent: Aabb3,
    /// Number of primary points.
    pub num_primary: usize,
    /// All Delaunay points, primaries first.
    pub points: Vec<MeshPoint>,
    /// Delaunay tetrahedra.
    #[serde(default)]
    pub tetras: Vec<Tetra>,
    /// One circumcenter per tetra.
    #[serde(default)]
    pub circumcenters: Vec<Point3>,
    /// Voronoi faces as point pairs.
    pub faces: Vec<VoronoiFace>,
}

impl MeshSnapshot {
    /// Total number of points, primary and ghost.
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of tetrahedra.
    pub fn num_tetras(&self) -> usize {
        self.tetras.len()
    }

    /// True if `dp` is a primary point of this task.
    #[inline]
    pub fn is_primary(&self, dp: usize) -> bool {
        dp < self.num_primary
    }

    /// True if `dp` is a ghost point.
    #[inline]
    pub fn is_ghost(&self, dp: usize) -> bool {
        dp >= self.num_primary && dp < self.points.len()
    }

    /// Bounds-checked point access.
    pub fn point(&self, dp: usize) -> Result<&MeshPoint> {
        self.points.get(dp).ok_or(MeshError::PointOutOfRange {
            point: dp,
            len: self.points.len(),
        })
    }

    /// Position of point `dp`. Panics on an out-of-range index.
    #[inline]
    pub fn position(&self, dp: usize) -> Point3 {
        self.points[dp].position
    }

    /// Check array sizes, index ranges and primary ordering.
    pub fn validate(&self) -> Result<()> {
        if self.num_tasks == 0 || self.task >= self.num_tasks {
            return Err(MeshError::InvalidSnapshot(format!(
                "task {} outside 0..{}",
                self.task, self.num_tasks
            )));
        }
        if self.num_primary > self.points.len() {
            return Err(MeshError::InvalidSnapshot(format!(
                "num_primary {} exceeds point count {}",
                self.num_primary,
                self.points.len()
            )));
        }
        if self.extent.is_empty() {
            return Err(MeshError::InvalidSnapshot("empty extent".into()));
        }

        for (i, pt) in self.points.iter().enumerate() {
            if pt.task >= self.num_tasks {
                return Err(MeshError::InvalidSnapshot(format!(
                    "point {i} has task {} outside 0..{}",
                    pt.task, self.num_tasks
                )));
            }
            let primary = i < self.num_primary;
            if primary != (pt.kind == PointKind::Primary) {
                return Err(MeshError::InvalidSnapshot(format!(
                    "point {i} kind {:?} does not match primary range 0..{}",
                    pt.kind, self.num_primary
                )));
            }
            if primary && (pt.cell != i || pt.task != self.task) {
                return Err(MeshError::InvalidSnapshot(format!(
                    "primary point {i} must own local cell {i} (has task {} cell {})",
                    pt.task, pt.cell
                )));
            }
        }

        if self.circumcenters.len() != self.tetras.len() {
            return Err(MeshError::InvalidSnapshot(format!(
                "{} circumcenters for {} tetras",
                self.circumcenters.len(),
                self.tetras.len()
            )));
        }

        let ndp = self.points.len();
        let ndt = self.tetras.len();
        for (i, tet) in self.tetras.iter().enumerate() {
            if tet.p.iter().flatten().any(|&v| v >= ndp) {
                return Err(MeshError::InvalidSnapshot(format!(
                    "tetra {i} references a point out of range"
                )));
            }
            if tet.t.iter().flatten().any(|&n| n >= ndt) {
                return Err(MeshError::InvalidSnapshot(format!(
                    "tetra {i} references a neighbor out of range"
                )));
            }
        }

        for (i, face) in self.faces.iter().enumerate() {
            if face.p1 >= ndp || face.p2 >= ndp {
                return Err(MeshError::FaceOutOfRange { face: i });
            }
        }

        Ok(())
    }

    /// The six edges of tetra `t` for wireframe export.
    ///
    /// Returns `None` for deleted tetras and tetras touching the point at
    /// infinity.
    pub fn tetra_edges(&self, t: usize) -> Option<[Segment3; 6]> {
        let tet = self.tetras.get(t)?;
        if tet.deleted {
            return None;
        }
        let mut pts = [Point3::origin(); 4];
        for (slot, dp) in pts.iter_mut().zip(tet.p) {
            *slot = self.points.get(dp?)?.position;
        }
        Some([
            Segment3::new(pts[0], pts[1]),
            Segment3::new(pts[1], pts[2]),
            Segment3::new(pts[2], pts[0]),
            Segment3::new(pts[0], pts[3]),
            Segment3::new(pts[1], pts[3]),
            Segment3::new(pts[2], pts[3]),
        ])
    }
}
