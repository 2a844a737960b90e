//! Voronoi face polygons reconstructed from the tetra rings around
//! Delaunay edges.
//!
//! Every Delaunay edge `(p, q)` is dual to the Voronoi face between `p`
//! and `q`. Walking the ring of tetrahedra that share the edge and
//! collecting their circumcenters yields the face's vertices in order.

use std::collections::HashMap;

use vort_math::{Point3, Segment3};

use crate::connectivity::EdgeRange;
use crate::error::{MeshError, Result};
use crate::snapshot::MeshSnapshot;

/// Local vertex pairs of the six tetra edges.
const EDGE_START: [usize; 6] = [0, 0, 0, 1, 1, 2];
const EDGE_END: [usize; 6] = [1, 2, 3, 2, 3, 3];
/// For each edge, one of the two vertices not on it...
const EDGE_OPPOSITE: [usize; 6] = [3, 1, 2, 3, 0, 1];
/// ...and the other one, whose opposite face is crossed first.
const EDGE_NEXT_TETRA: [usize; 6] = [2, 3, 1, 0, 2, 0];

/// Local edge number of the vertex pair `(a, b)`.
fn edge_index(a: usize, b: usize) -> usize {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    match (lo, hi) {
        (0, 1) => 0,
        (0, 2) => 1,
        (0, 3) => 2,
        (1, 2) => 3,
        (1, 3) => 4,
        _ => 5,
    }
}

/// Outcome of walking one edge ring.
enum Walk {
    /// Ring closed; tetra ids in order.
    Closed(Vec<usize>),
    /// Ring is unusable for export (open hull, deleted or infinite tetra).
    Skipped,
}

/// Ordered circumcenter rings, one per Voronoi face of the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacePolygons {
    rings: Vec<usize>,
    ranges: Vec<EdgeRange>,
}

impl FacePolygons {
    /// Walk every Delaunay edge ring of the snapshot.
    ///
    /// Faces touching the point at infinity, a deleted tetra or an open
    /// hull get an empty ring. A pivot that cannot find the shared
    /// vertices, an edge reached by two closed rings, or a ring that never
    /// closes is fatal.
    pub fn build(snapshot: &MeshSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let mut face_of: HashMap<(usize, usize), usize> = HashMap::new();
        for (i, f) in snapshot.faces.iter().enumerate() {
            face_of.entry(ordered(f.p1, f.p2)).or_insert(i);
        }

        let ndt = snapshot.num_tetras();
        let mut visited = vec![0u8; ndt];
        let mut per_face: Vec<Option<Vec<usize>>> = vec![None; snapshot.faces.len()];
        let mut skipped = 0usize;

        for start in 0..ndt {
            if snapshot.tetras[start].deleted {
                continue;
            }
            for en in 0..6 {
                if visited[start] & (1 << en) != 0 {
                    continue;
                }
                let tet = &snapshot.tetras[start];
                let (dp1, dp2) = match (tet.p[EDGE_START[en]], tet.p[EDGE_END[en]]) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        visited[start] |= 1 << en;
                        continue;
                    }
                };
                if !snapshot.is_primary(dp1) && !snapshot.is_primary(dp2) {
                    visited[start] |= 1 << en;
                    continue;
                }

                match walk_ring(snapshot, start, en, &mut visited)? {
                    Walk::Closed(ring) => match face_of.get(&ordered(dp1, dp2)) {
                        Some(&face) => per_face[face] = Some(ring),
                        None => log::debug!("edge ({dp1}, {dp2}) has no listed voronoi face"),
                    },
                    Walk::Skipped => skipped += 1,
                }
            }
        }

        let mut rings = Vec::new();
        let mut ranges = Vec::with_capacity(per_face.len());
        for ring in per_face {
            let offset = rings.len();
            if let Some(r) = ring {
                rings.extend(r);
            }
            ranges.push(EdgeRange {
                offset,
                count: rings.len() - offset,
            });
        }

        log::info!(
            "face polygons: {} faces, {} ring vertices, {} rings skipped",
            ranges.len(),
            rings.len(),
            skipped
        );

        Ok(Self { rings, ranges })
    }

    /// Number of faces covered (equals the snapshot's face count).
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True if there are no faces.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of ring vertices.
    pub fn num_vertices(&self) -> usize {
        self.rings.len()
    }

    /// Offset and count of a face's ring.
    pub fn range(&self, face: usize) -> Option<EdgeRange> {
        self.ranges.get(face).copied()
    }

    /// Tetra ids around `face`, in ring order. Empty when skipped.
    pub fn ring(&self, face: usize) -> &[usize] {
        match self.ranges.get(face) {
            Some(r) => &self.rings[r.offset..r.offset + r.count],
            None => &[],
        }
    }

    /// Circumcenters of `face` in ring order.
    pub fn polygon(&self, face: usize, snapshot: &MeshSnapshot) -> Vec<Point3> {
        self.ring(face)
            .iter()
            .filter_map(|&t| snapshot.circumcenters.get(t).copied())
            .collect()
    }

    /// Closed polygon outline of `face` as segments.
    ///
    /// Segments with an endpoint outside the domain extent are left out.
    /// Returns `None` for faces with fewer than three vertices.
    pub fn voronoi_edges(&self, face: usize, snapshot: &MeshSnapshot) -> Option<Vec<Segment3>> {
        let verts = self.polygon(face, snapshot);
        if verts.len() < 3 {
            return None;
        }
        let n = verts.len();
        Some(
            (0..n)
                .map(|i| Segment3::new(verts[i], verts[(i + 1) % n]))
                .filter(|s| snapshot.extent.contains(&s.a) && snapshot.extent.contains(&s.b))
                .collect(),
        )
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Walk the ring around edge `en` of tetra `start`, marking visited edges.
fn walk_ring(
    snapshot: &MeshSnapshot,
    start: usize,
    en: usize,
    visited: &mut [u8],
) -> Result<Walk> {
    let ndt = snapshot.num_tetras();
    let mut i = EDGE_START[en];
    let mut j = EDGE_END[en];
    let mut k = EDGE_OPPOSITE[en];
    let mut l = EDGE_NEXT_TETRA[en];

    let mut ring = Vec::new();
    let mut revisit = None;
    let mut usable = true;
    let mut q = start;

    loop {
        let tet = &snapshot.tetras[q];
        let edge = edge_index(i, j);
        if q != start && visited[q] & (1 << edge) != 0 {
            revisit.get_or_insert((q, edge));
        }
        visited[q] |= 1 << edge;
        if tet.deleted || !tet.is_finite() {
            usable = false;
        }
        ring.push(q);

        let Some(nb) = tet.t[l] else {
            return Ok(Walk::Skipped);
        };
        if nb == start {
            break;
        }
        if ring.len() > ndt {
            return Err(MeshError::RingTooLong(start));
        }

        let next = &snapshot.tetras[nb];
        let pivot = (
            next.position_of(tet.p[k]),
            next.position_of(tet.p[i]),
            next.position_of(tet.p[j]),
        );
        let (ll, ii, jj) = match pivot {
            (Some(ll), Some(ii), Some(jj)) if ll != ii && ll != jj && ii != jj => (ll, ii, jj),
            _ => return Err(MeshError::RingPivot { from: q, to: nb }),
        };
        let kk = 6 - (ll + ii + jj);

        i = ii;
        j = jj;
        k = kk;
        l = ll;
        q = nb;
    }

    if let Some((tetra, edge)) = revisit {
        return Err(MeshError::RingRevisit { tetra, edge });
    }
    if !usable {
        return Ok(Walk::Skipped);
    }
    Ok(Walk::Closed(ring))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_edge_index_matches_tables() {
        for en in 0..6 {
            assert_eq!(edge_index(EDGE_START[en], EDGE_END[en]), en);
            assert_eq!(edge_index(EDGE_END[en], EDGE_START[en]), en);
            let mut seen = [EDGE_START[en], EDGE_END[en], EDGE_OPPOSITE[en], EDGE_NEXT_TETRA[en]];
            seen.sort_unstable();
            assert_eq!(seen, [0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_ring_around_axis() {
        let snap = testkit::edge_ring(6);
        let polys = FacePolygons::build(&snap).unwrap();
        assert_eq!(polys.len(), snap.faces.len());

        // Face 0 is the axis face between the two apex points.
        let ring = polys.ring(0);
        assert_eq!(ring, &[0, 1, 2, 3, 4, 5]);

        let poly = polys.polygon(0, &snap);
        assert_eq!(poly.len(), 6);
        for v in &poly {
            assert!(v.z.abs() < 1e-12);
        }

        // Every other face touches the open hull.
        for f in 1..polys.len() {
            assert!(polys.ring(f).is_empty());
            assert!(polys.voronoi_edges(f, &snap).is_none());
        }
    }

    #[test]
    fn test_voronoi_edges_close_the_polygon() {
        let snap = testkit::edge_ring(5);
        let polys = FacePolygons::build(&snap).unwrap();
        let edges = polys.voronoi_edges(0, &snap).unwrap();
        assert_eq!(edges.len(), 5);
        for (a, b) in edges.iter().zip(edges.iter().cycle().skip(1)) {
            assert!((a.b - b.a).norm() < 1e-12);
        }
    }

    #[test]
    fn test_voronoi_edges_drop_outside_segments() {
        let mut snap = testkit::edge_ring(6);
        snap.circumcenters[2].x += 100.0;
        let polys = FacePolygons::build(&snap).unwrap();
        // Vertex 2 leaves the extent, removing its two adjacent segments.
        assert_eq!(polys.voronoi_edges(0, &snap).unwrap().len(), 4);
    }

    #[test]
    fn test_deleted_tetra_skips_face() {
        let mut snap = testkit::edge_ring(6);
        snap.tetras[3].deleted = true;
        let polys = FacePolygons::build(&snap).unwrap();
        assert!(polys.ring(0).is_empty());
    }

    #[test]
    fn test_broken_pivot_is_fatal() {
        let mut snap = testkit::edge_ring(6);
        // Tetra 1 no longer shares the axis edge with tetra 0.
        snap.tetras[1].p[1] = Some(snap.num_points() - 1);
        assert!(matches!(
            FacePolygons::build(&snap),
            Err(MeshError::RingPivot { from: 0, to: 1 })
        ));
    }
}
