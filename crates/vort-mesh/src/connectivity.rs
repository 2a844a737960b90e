//! Compact point-to-point adjacency derived from the Voronoi faces.
//!
//! For every mesh point this stores the opposite point across each of its
//! faces together with the face plane's anchor (the midpoint between the
//! two generating points). Edges of one point are contiguous in a single
//! arena and addressed through an `(offset, count)` range, so the traversal
//! never chases pointers through the tetra graph.
//!
//! Unlike the hydro solver's own connection list, edges here link distinct
//! mesh points (ghosts included), not just primary cells.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vort_math::{midpoint, Point3};

use crate::error::{MeshError, Result};
use crate::snapshot::{MeshSnapshot, PointKind};

/// One directed adjacency record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityEdge {
    /// Point on the other side of the face.
    pub opposite: usize,
    /// Midpoint between the two generating points; lies on the face plane.
    pub midpoint: Point3,
}

/// Location of one point's edges in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRange {
    /// First edge.
    pub offset: usize,
    /// Number of edges.
    pub count: usize,
}

/// Where the physical state of a point lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryRef {
    /// Primary point on this task.
    Local(usize),
    /// Hydro cell owned by another task.
    Remote {
        /// Owning task.
        task: usize,
        /// Cell index on that task.
        cell: usize,
    },
}

/// Immutable adjacency for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Connectivity {
    snapshot_version: u64,
    edges: Vec<ConnectivityEdge>,
    ranges: Vec<EdgeRange>,
    primary: Vec<PrimaryRef>,
}

impl Connectivity {
    /// Derive connectivity from a snapshot.
    ///
    /// Fails without exposing partial state if any local point maps to no
    /// primary cell, if a face is malformed, or if any point ends up without
    /// neighbors.
    pub fn build(snapshot: &MeshSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let primary = map_primaries(snapshot)?;

        let ndp = snapshot.num_points();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); ndp];
        for (i, face) in snapshot.faces.iter().enumerate() {
            if face.p1 == face.p2 {
                return Err(MeshError::DegenerateFace {
                    face: i,
                    point: face.p1,
                });
            }
            neighbors[face.p1].push(face.p2);
            neighbors[face.p2].push(face.p1);
        }

        let mut edges = Vec::with_capacity(2 * snapshot.faces.len());
        let mut ranges = Vec::with_capacity(ndp);
        let mut duplicates = 0usize;

        for (dp, list) in neighbors.iter_mut().enumerate() {
            if list.is_empty() {
                return Err(MeshError::NoConnections(dp));
            }
            let before = list.len();
            list.sort_unstable();
            list.dedup();
            duplicates += before - list.len();

            let cellp = snapshot.position(dp);
            let offset = edges.len();
            for &opposite in list.iter() {
                edges.push(ConnectivityEdge {
                    opposite,
                    midpoint: midpoint(&cellp, &snapshot.position(opposite)),
                });
            }
            ranges.push(EdgeRange {
                offset,
                count: edges.len() - offset,
            });
        }

        if duplicates > 0 {
            log::warn!("connectivity: dropped {duplicates} duplicate face entries");
        }

        let conn = Self {
            snapshot_version: snapshot.version,
            edges,
            ranges,
            primary,
        };
        conn.verify_symmetry()?;

        log::info!(
            "connectivity: task {} snapshot {}: {} points, {} edges",
            snapshot.task,
            snapshot.version,
            conn.num_points(),
            conn.num_edges()
        );

        Ok(conn)
    }

    /// Version of the snapshot this was built from.
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    /// Check that this was built from `snapshot`: same version and point
    /// count.
    pub fn check_matches(&self, snapshot: &MeshSnapshot) -> Result<()> {
        if self.num_points() != snapshot.num_points() || self.snapshot_version != snapshot.version {
            return Err(MeshError::InvalidSnapshot(format!(
                "connectivity covers {} points of snapshot {}, expected {} points of snapshot {}",
                self.num_points(),
                self.snapshot_version,
                snapshot.num_points(),
                snapshot.version
            )));
        }
        Ok(())
    }

    /// Number of points covered.
    pub fn num_points(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of directed edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Arena range of point `dp`.
    pub fn range(&self, dp: usize) -> Option<EdgeRange> {
        self.ranges.get(dp).copied()
    }

    /// Edges of point `dp`; empty for an out-of-range index.
    #[inline]
    pub fn neighbors(&self, dp: usize) -> &[ConnectivityEdge] {
        match self.ranges.get(dp) {
            Some(r) => &self.edges[r.offset..r.offset + r.count],
            None => &[],
        }
    }

    /// All edges in arena order.
    pub fn edges(&self) -> &[ConnectivityEdge] {
        &self.edges
    }

    /// Where the hydro state of point `dp` lives.
    pub fn primary_of(&self, dp: usize) -> Option<PrimaryRef> {
        self.primary.get(dp).copied()
    }

    /// Check that every edge has its reverse.
    pub fn verify_symmetry(&self) -> Result<()> {
        for p in 0..self.num_points() {
            for e in self.neighbors(p) {
                if !self.neighbors(e.opposite).iter().any(|r| r.opposite == p) {
                    return Err(MeshError::AsymmetricAdjacency { p, q: e.opposite });
                }
            }
        }
        Ok(())
    }
}

/// Map every point to the primary holding its hydro state.
///
/// Points owned by this task must resolve to a local primary; foreign
/// ghosts resolve to their owner's cell.
fn map_primaries(snapshot: &MeshSnapshot) -> Result<Vec<PrimaryRef>> {
    let mut by_cell: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (dp, pt) in snapshot.points.iter().enumerate() {
        by_cell.entry((pt.task, pt.cell)).or_default().push(dp);
    }

    let mut primary = Vec::with_capacity(snapshot.num_points());
    for (dp, pt) in snapshot.points.iter().enumerate() {
        if pt.task != snapshot.task {
            primary.push(PrimaryRef::Remote {
                task: pt.task,
                cell: pt.cell,
            });
            continue;
        }

        let owner = by_cell.get(&(pt.task, pt.cell)).and_then(|group| {
            group
                .iter()
                .copied()
                .find(|&q| snapshot.points[q].kind == PointKind::Primary)
        });

        match owner {
            Some(q) => primary.push(PrimaryRef::Local(q)),
            None => {
                return Err(MeshError::MissingPrimary {
                    point: dp,
                    cell: pt.cell,
                })
            }
        }
    }

    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MeshPoint, VoronoiFace};
    use vort_math::Aabb3;

    fn point(id: u64, x: f64, cell: usize, kind: PointKind) -> MeshPoint {
        MeshPoint {
            id,
            position: Point3::new(x, 0.5, 0.5),
            task: 0,
            cell,
            kind,
        }
    }

    fn face(p1: usize, p2: usize) -> VoronoiFace {
        VoronoiFace {
            p1,
            p2,
            area: 1.0,
            centroid: Point3::origin(),
        }
    }

    /// Three primaries in a row plus a ghost image of the first one.
    fn row() -> MeshSnapshot {
        MeshSnapshot {
            version: 4,
            task: 0,
            num_tasks: 1,
            extent: Aabb3::new(Point3::origin(), Point3::new(3.0, 1.0, 1.0)),
            num_primary: 3,
            points: vec![
                point(0, 0.5, 0, PointKind::Primary),
                point(1, 1.5, 1, PointKind::Primary),
                point(2, 2.5, 2, PointKind::Primary),
                point(3, 3.5, 0, PointKind::Ghost),
            ],
            tetras: Vec::new(),
            circumcenters: Vec::new(),
            faces: vec![face(0, 1), face(1, 2), face(2, 3)],
        }
    }

    #[test]
    fn test_build_row() {
        let conn = Connectivity::build(&row()).unwrap();
        assert_eq!(conn.num_points(), 4);
        assert_eq!(conn.num_edges(), 6);
        assert_eq!(conn.snapshot_version(), 4);

        let n1 = conn.neighbors(1);
        assert_eq!(n1.len(), 2);
        assert_eq!(n1[0].opposite, 0);
        assert_eq!(n1[1].opposite, 2);
        assert!((n1[1].midpoint - Point3::new(2.0, 0.5, 0.5)).norm() < 1e-12);

        assert_eq!(conn.range(2), Some(EdgeRange { offset: 3, count: 2 }));
        assert!(conn.neighbors(99).is_empty());
    }

    #[test]
    fn test_check_matches_snapshot() {
        let snap = row();
        let conn = Connectivity::build(&snap).unwrap();
        conn.check_matches(&snap).unwrap();

        let mut newer = row();
        newer.version = 5;
        assert!(matches!(
            conn.check_matches(&newer),
            Err(MeshError::InvalidSnapshot(_))
        ));

        let mut shorter = row();
        shorter.points.pop();
        shorter.faces.pop();
        assert!(conn.check_matches(&shorter).is_err());
    }

    #[test]
    fn test_ghost_maps_to_primary() {
        let conn = Connectivity::build(&row()).unwrap();
        assert_eq!(conn.primary_of(3), Some(PrimaryRef::Local(0)));
        assert_eq!(conn.primary_of(1), Some(PrimaryRef::Local(1)));
    }

    #[test]
    fn test_foreign_ghost_maps_remote() {
        let mut snap = row();
        snap.num_tasks = 2;
        snap.points[3].task = 1;
        snap.points[3].cell = 7;
        let conn = Connectivity::build(&snap).unwrap();
        assert_eq!(conn.primary_of(3), Some(PrimaryRef::Remote { task: 1, cell: 7 }));
    }

    #[test]
    fn test_symmetry_holds() {
        let conn = Connectivity::build(&row()).unwrap();
        assert!(conn.verify_symmetry().is_ok());
        for p in 0..conn.num_points() {
            for e in conn.neighbors(p) {
                assert!(conn.neighbors(e.opposite).iter().any(|r| r.opposite == p));
            }
        }
    }

    #[test]
    fn test_duplicate_faces_collapse() {
        let mut snap = row();
        snap.faces.push(face(1, 0));
        let conn = Connectivity::build(&snap).unwrap();
        assert_eq!(conn.neighbors(0).len(), 1);
        assert_eq!(conn.num_edges(), 6);
    }

    #[test]
    fn test_ghost_without_primary_is_fatal() {
        let mut snap = row();
        snap.points[3].cell = 5;
        assert_eq!(
            Connectivity::build(&snap).unwrap_err(),
            MeshError::MissingPrimary { point: 3, cell: 5 }
        );
    }

    #[test]
    fn test_isolated_point_is_fatal() {
        let mut snap = row();
        snap.faces.pop();
        assert_eq!(
            Connectivity::build(&snap).unwrap_err(),
            MeshError::NoConnections(3)
        );
    }

    #[test]
    fn test_degenerate_face_is_fatal() {
        let mut snap = row();
        snap.faces.push(face(2, 2));
        assert_eq!(
            Connectivity::build(&snap).unwrap_err(),
            MeshError::DegenerateFace { face: 3, point: 2 }
        );
    }
}
