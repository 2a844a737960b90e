//! Point-in-cell verification.
//!
//! A position belongs to the Voronoi cell of point `p` exactly when no other
//! generating point is closer. These checks are for tests and debug runs;
//! the traversal never needs them.

use vort_math::{Point3, Tolerance};

use crate::connectivity::Connectivity;
use crate::error::{MeshError, Result};
use crate::snapshot::MeshSnapshot;

/// Check `pos` against every point of the snapshot.
///
/// Fails if some other point is closer than `point` by more than the
/// relative tolerance. Positions within `tol.absolute` of the owning point
/// always pass.
pub fn verify_point_in_cell(
    snapshot: &MeshSnapshot,
    point: usize,
    pos: &Point3,
    tol: &Tolerance,
) -> Result<()> {
    let owner = snapshot.point(point)?;
    let d2p = (owner.position - pos).norm_squared();

    for (q, other) in snapshot.points.iter().enumerate() {
        if q == point {
            continue;
        }
        let d2 = (other.position - pos).norm_squared();
        if tol.strictly_closer(d2, d2p) {
            return Err(MeshError::PointNotInCell {
                point,
                closer: q,
                position: *pos,
            });
        }
    }
    Ok(())
}

/// Check `pos` against the direct neighbors of `point` only.
///
/// Sufficient for convex cells and far cheaper than the exhaustive check.
pub fn verify_point_in_cell_local(
    snapshot: &MeshSnapshot,
    conn: &Connectivity,
    point: usize,
    pos: &Point3,
    tol: &Tolerance,
) -> Result<()> {
    let d2p = (snapshot.point(point)?.position - pos).norm_squared();

    for e in conn.neighbors(point) {
        let d2 = (snapshot.position(e.opposite) - pos).norm_squared();
        if tol.strictly_closer(d2, d2p) {
            return Err(MeshError::PointNotInCell {
                point,
                closer: e.opposite,
                position: *pos,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_center_of_cell_passes() {
        let snap = testkit::lattice(3, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let tol = Tolerance::DEFAULT;
        for dp in 0..snap.num_points() {
            let pos = snap.position(dp);
            assert!(verify_point_in_cell(&snap, dp, &pos, &tol).is_ok());
            assert!(verify_point_in_cell_local(&snap, &conn, dp, &pos, &tol).is_ok());
        }
    }

    #[test]
    fn test_position_in_neighbor_fails() {
        let snap = testkit::lattice(3, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let tol = Tolerance::DEFAULT;
        // Center of the cube is owned by point 13; a spot at x = 2.2 lies in point 14.
        let pos = Point3::new(2.2, 1.5, 1.5);
        let err = verify_point_in_cell(&snap, 13, &pos, &tol).unwrap_err();
        assert!(matches!(err, MeshError::PointNotInCell { point: 13, closer: 14, .. }));
        assert!(verify_point_in_cell_local(&snap, &conn, 13, &pos, &tol).is_err());
        assert!(verify_point_in_cell(&snap, 14, &pos, &tol).is_ok());
    }

    #[test]
    fn test_face_position_passes_both_sides() {
        let snap = testkit::lattice(3, 1.0);
        let tol = Tolerance::DEFAULT;
        let pos = Point3::new(2.0, 1.5, 1.5);
        assert!(verify_point_in_cell(&snap, 13, &pos, &tol).is_ok());
        assert!(verify_point_in_cell(&snap, 14, &pos, &tol).is_ok());
    }

    #[test]
    fn test_unknown_point_is_rejected() {
        let snap = testkit::lattice(2, 1.0);
        let pos = Point3::origin();
        assert!(matches!(
            verify_point_in_cell(&snap, 99, &pos, &Tolerance::DEFAULT),
            Err(MeshError::PointOutOfRange { point: 99, .. })
        ));
    }
}
